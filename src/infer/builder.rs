//! Bounded-concurrency inference builds.
//!
//! A build waits for a permit from the global reasoning semaphore, then runs
//! the blocking pipeline on the tokio blocking pool:
//!
//! 1. extract the hierarchy module (optional)
//! 2. add root types to a copy of the model
//! 3. create a reasoner over the copy and classify
//! 4. package an [`InferenceResult`]
//!
//! Every intermediate is owned by a [`Scratch`] guard that disposes the
//! reasoner and drops the module and the copy when the pipeline returns,
//! fails or panics. The permit is released after the scratch is gone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::InferenceError;
use crate::hierarchy::{HierarchyModule, HierarchyOracle, ModuleExtractor};
use crate::iri::Iri;
use crate::model::GraphModel;

use super::augment::RootTypeAugmenter;
use super::{InferenceResult, ReasonerFactory, ReasonerInstance, ReasoningInput};

/// Tuning for [`InferenceBuilder`].
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Maximum simultaneous reasoning runs across all models.
    pub max_concurrent: usize,
    pub use_module_extraction: bool,
    /// Interval between "still waiting" warnings while queued for a permit.
    pub slow_permit_warning: Duration,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            use_module_extraction: true,
            slow_permit_warning: Duration::from_secs(60),
        }
    }
}

pub struct InferenceBuilder {
    permits: Arc<Semaphore>,
    options: BuilderOptions,
    hierarchy: Arc<dyn HierarchyOracle>,
    factory: Arc<dyn ReasonerFactory>,
    augmenter: RootTypeAugmenter,
    extractor: ModuleExtractor,
}

impl InferenceBuilder {
    pub fn new(
        hierarchy: Arc<dyn HierarchyOracle>,
        factory: Arc<dyn ReasonerFactory>,
        augmenter: RootTypeAugmenter,
        options: BuilderOptions,
    ) -> Self {
        let max = options.max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            options: BuilderOptions {
                max_concurrent: max,
                ..options
            },
            hierarchy,
            factory,
            augmenter,
            extractor: ModuleExtractor::new(),
        }
    }

    /// Reasoner name as reported in results: `structural` or `structural-module`.
    pub fn reasoner_name(&self) -> String {
        if self.options.use_module_extraction {
            format!("{}-module", self.factory.name())
        } else {
            self.factory.name().to_string()
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.options.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out permits. Queued and future builds fail with
    /// [`InferenceError::BuildInterrupted`]; running builds finish.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Build inference for one model snapshot.
    pub async fn build(&self, model: Arc<GraphModel>, version: u64) -> Result<InferenceResult, InferenceError> {
        let permit = self.acquire(model.id()).await?;
        tracing::info!(model = %model.id(), version, "acquired reasoning permit");

        let job = Job {
            hierarchy: self.hierarchy.clone(),
            factory: self.factory.clone(),
            augmenter: self.augmenter.clone(),
            extractor: self.options.use_module_extraction.then(|| self.extractor.clone()),
            reasoner_name: self.reasoner_name(),
        };
        let model_id = model.id().clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = job.run(&model, version);
            drop(permit);
            tracing::info!(model = %model.id(), "released reasoning permit");
            result
        });
        match task.await {
            Ok(result) => result,
            Err(err) => Err(InferenceError::Reasoning {
                model: model_id.to_string(),
                message: format!("build task failed: {err}"),
            }),
        }
    }

    async fn acquire(&self, model: &Iri) -> Result<OwnedSemaphorePermit, InferenceError> {
        let started = Instant::now();
        let acquire = self.permits.clone().acquire_owned();
        tokio::pin!(acquire);
        let period = self.options.slow_permit_warning.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                permit = &mut acquire => {
                    return permit.map_err(|_| InferenceError::BuildInterrupted {
                        model: model.to_string(),
                    });
                }
                _ = ticker.tick() => {
                    tracing::warn!(
                        model = %model,
                        waited_secs = started.elapsed().as_secs(),
                        "still waiting for a reasoning permit"
                    );
                }
            }
        }
    }
}

/// Owned inputs of one blocking pipeline run.
struct Job {
    hierarchy: Arc<dyn HierarchyOracle>,
    factory: Arc<dyn ReasonerFactory>,
    augmenter: RootTypeAugmenter,
    extractor: Option<ModuleExtractor>,
    reasoner_name: String,
}

impl Job {
    fn run(&self, model: &Arc<GraphModel>, version: u64) -> Result<InferenceResult, InferenceError> {
        let mut scratch = Scratch::new(model.id().clone());

        let hierarchy: Arc<dyn HierarchyOracle> = match &self.extractor {
            Some(extractor) => {
                tracing::info!(model = %model.id(), "creating hierarchy module");
                let module = Arc::new(extractor.extract(self.hierarchy.as_ref(), model));
                tracing::info!(model = %model.id(), classes = module.stats().classes, "done creating module");
                scratch.module = Some(module.clone());
                module
            }
            None => self.hierarchy.clone(),
        };

        tracing::info!(model = %model.id(), "adding root types");
        let augmentation = self.augmenter.augment(model);
        let commentary = augmentation.warnings;
        let augmented = Arc::new(augmentation.model);
        scratch.augmented = Some(augmented.clone());

        tracing::info!(model = %model.id(), reasoner = %self.reasoner_name, "building reasoner");
        let reasoner = self
            .factory
            .create(ReasoningInput {
                model: augmented,
                hierarchy,
            })
            .map_err(|e| attribute(e, model.id()))?;
        let reasoner = scratch.reasoner.insert(reasoner);
        let classification = reasoner.classify().map_err(|e| attribute(e, model.id()))?;

        tracing::info!(
            model = %model.id(),
            version,
            consistent = classification.consistent,
            "made inference result"
        );
        scratch.release();
        Ok(InferenceResult::new(
            model.id().clone(),
            version,
            classification,
            self.reasoner_name.clone(),
            commentary,
        ))
    }
}

fn attribute(err: InferenceError, model: &Iri) -> InferenceError {
    match err {
        InferenceError::Reasoning { model: m, message } if m.is_empty() => InferenceError::Reasoning {
            model: model.to_string(),
            message,
        },
        other => other,
    }
}

/// Intermediates of one build; released on every exit path.
struct Scratch {
    model: Iri,
    reasoner: Option<Box<dyn ReasonerInstance>>,
    module: Option<Arc<HierarchyModule>>,
    augmented: Option<Arc<GraphModel>>,
}

impl Scratch {
    fn new(model: Iri) -> Self {
        Self {
            model,
            reasoner: None,
            module: None,
            augmented: None,
        }
    }

    fn release(&mut self) {
        if let Some(reasoner) = self.reasoner.take() {
            match reasoner.dispose() {
                Ok(()) => tracing::info!(model = %self.model, "reasoner disposed"),
                Err(err) => tracing::warn!(model = %self.model, error = %err, "failed to dispose reasoner"),
            }
        }
        if self.module.take().is_some() {
            tracing::info!(model = %self.model, "removed hierarchy module");
        }
        if self.augmented.take().is_some() {
            tracing::info!(model = %self.model, "removed augmented copy");
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hierarchy::ClassHierarchy;
    use crate::infer::Classification;
    use crate::infer::classifier::StructuralReasonerFactory;
    use crate::model::{Individual, TypeExpr};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        disposed: AtomicUsize,
    }

    struct Failing(Arc<Counters>);

    struct FailingInstance(Arc<Counters>);

    impl ReasonerFactory for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn create(&self, _input: ReasoningInput) -> Result<Box<dyn ReasonerInstance>, InferenceError> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FailingInstance(self.0.clone())))
        }
    }

    impl ReasonerInstance for FailingInstance {
        fn classify(&mut self) -> Result<Classification, InferenceError> {
            Err(InferenceError::Reasoning {
                model: String::new(),
                message: "boom".into(),
            })
        }

        fn dispose(self: Box<Self>) -> Result<(), InferenceError> {
            self.0.disposed.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::Cleanup {
                resource: "failing reasoner".into(),
                message: "still busy".into(),
            })
        }
    }

    fn model() -> Arc<GraphModel> {
        let mut model = GraphModel::new(Iri::new("http://model.example.org/m"));
        model.insert_individual(
            Individual::new(Iri::new("http://model.example.org/m/i1"))
                .with_type(TypeExpr::class(Iri::new("http://purl.obolibrary.org/obo/GO_0003674"))),
        );
        Arc::new(model)
    }

    fn builder(factory: Arc<dyn ReasonerFactory>, options: BuilderOptions) -> InferenceBuilder {
        InferenceBuilder::new(
            Arc::new(ClassHierarchy::new()),
            factory,
            RootTypeAugmenter::new(None),
            options,
        )
    }

    #[tokio::test]
    async fn reasoning_failure_still_disposes_and_releases() {
        let counters = Arc::new(Counters::default());
        let builder = builder(Arc::new(Failing(counters.clone())), BuilderOptions::default());
        let err = builder.build(model(), 1).await.unwrap_err();
        match err {
            InferenceError::Reasoning { model, message } => {
                assert_eq!(model, "http://model.example.org/m");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(builder.available_permits(), 1);
    }

    #[tokio::test]
    async fn closed_pool_interrupts_build() {
        let builder = builder(Arc::new(StructuralReasonerFactory), BuilderOptions::default());
        builder.close();
        let err = builder.build(model(), 1).await.unwrap_err();
        assert!(matches!(err, InferenceError::BuildInterrupted { .. }));
    }

    #[tokio::test]
    async fn result_records_version_reasoner_and_warnings() {
        let builder = builder(Arc::new(StructuralReasonerFactory), BuilderOptions::default());
        let result = builder.build(model(), 7).await.unwrap();
        assert_eq!(result.model_version(), 7);
        assert_eq!(result.reasoner(), "structural-module");
        assert!(result.is_consistent());
        // no lookup configured
        assert_eq!(result.commentary().len(), 1);

        let plain = super::InferenceBuilder::new(
            Arc::new(ClassHierarchy::new()),
            Arc::new(StructuralReasonerFactory),
            RootTypeAugmenter::new(None),
            BuilderOptions {
                use_module_extraction: false,
                ..BuilderOptions::default()
            },
        );
        assert_eq!(plain.reasoner_name(), "structural");
    }
}
