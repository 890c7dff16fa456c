//! Model registry: live models, batch routing and inference publication.
//!
//! Each model lives in a [`ModelHandle`]:
//!
//! - `state` (std `Mutex`): the writer side, held for a whole batch.
//! - `published` (`RwLock<Arc<ModelSnapshot>>`): what readers see. Replaced
//!   at the end of every write, never mutated in place.
//! - `inference` (`RwLock<Option<Arc<InferenceResult>>>`): the latest
//!   published inference; older results live on while a reader holds them.
//! - `build_gate` (tokio `Mutex`): one inference build per model at a time.
//!
//! The registry itself is a `DashMap`, so batches on different models never
//! contend on a global lock.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::batch::processor::{BatchProcessor, ModelSnapshot, ModelState};
use crate::batch::response::{BatchResponse, MessageType, Renderer, ResponseData};
use crate::batch::{FailurePolicy, Operation, Request};
use crate::config::{InferenceMode, ServerConfig};
use crate::error::{CausewayError, CausewayResult, InferenceError, ModelError, ProtocolError, StoreError};
use crate::hierarchy::{ClassHierarchy, HierarchyOracle};
use crate::infer::{InferenceBuilder, InferenceResult, RootTypeAugmenter, StructuralReasonerFactory};
use crate::iri::Iri;
use crate::lookup::http::HttpLookupService;
use crate::lookup::{CachingLookupService, LookupService, StaticLookupService};
use crate::model::diff::AnnotationTarget;
use crate::model::export::{self, ModelFormat};
use crate::model::{Annotation, GraphModel};
use crate::store::FileModelStore;

/// Model annotation key recording the organism a model is about.
pub const IN_TAXON: &str = "in_taxon";

/// One live model.
pub struct ModelHandle {
    id: Iri,
    state: Mutex<ModelState>,
    published: RwLock<Arc<ModelSnapshot>>,
    inference: RwLock<Option<Arc<InferenceResult>>>,
    build_gate: tokio::sync::Mutex<()>,
}

impl ModelHandle {
    pub fn new(state: ModelState) -> Self {
        let snapshot = Arc::new(state.snapshot());
        Self {
            id: state.model.id().clone(),
            state: Mutex::new(state),
            published: RwLock::new(snapshot),
            inference: RwLock::new(None),
            build_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &Iri {
        &self.id
    }

    /// Run `f` with exclusive access to the model, then publish a fresh snapshot.
    pub fn write<R>(&self, f: impl FnOnce(&mut ModelState) -> R) -> R {
        let mut state = self.state.lock().expect("model state lock poisoned");
        let result = f(&mut state);
        *self.published.write().expect("snapshot lock poisoned") = Arc::new(state.snapshot());
        result
    }

    /// The latest published snapshot. Never blocks on writers.
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.published.read().expect("snapshot lock poisoned").clone()
    }

    pub fn inference(&self) -> Option<Arc<InferenceResult>> {
        self.inference.read().expect("inference lock poisoned").clone()
    }

    /// Whether the published inference lags behind the published snapshot.
    pub fn is_stale(&self) -> bool {
        let version = self.snapshot().version;
        self.inference().is_none_or(|inf| inf.model_version() < version)
    }

    /// Publish `result` unless a newer one is already in place.
    fn publish_inference(&self, result: Arc<InferenceResult>) -> bool {
        let mut slot = self.inference.write().expect("inference lock poisoned");
        if slot
            .as_ref()
            .is_some_and(|current| current.model_version() > result.model_version())
        {
            return false;
        }
        *slot = Some(result);
        true
    }
}

/// Build and publish inference for the handle's current snapshot.
///
/// Builds for one model are serialized by its build gate. A caller that
/// finds the current version already published reuses that result.
pub async fn rebuild_handle(
    builder: &InferenceBuilder,
    handle: &ModelHandle,
) -> Result<Arc<InferenceResult>, InferenceError> {
    let _gate = handle.build_gate.lock().await;
    let snapshot = handle.snapshot();
    if let Some(current) = handle.inference() {
        if current.model_version() == snapshot.version {
            tracing::debug!(model = %handle.id(), version = snapshot.version, "inference up to date");
            return Ok(current);
        }
    }
    let result = Arc::new(builder.build(snapshot.model.clone(), snapshot.version).await?);
    if handle.publish_inference(result.clone()) {
        tracing::info!(
            model = %handle.id(),
            version = snapshot.version,
            consistent = result.is_consistent(),
            "published inference"
        );
    }
    Ok(result)
}

/// All live models plus the machinery to change and classify them.
pub struct ModelRegistry {
    models: DashMap<Iri, Arc<ModelHandle>>,
    processor: BatchProcessor,
    builder: Arc<InferenceBuilder>,
    store: Option<FileModelStore>,
    inference_mode: InferenceMode,
    model_namespace: String,
    history_limit: usize,
    default_imports: BTreeSet<Iri>,
    sequence: AtomicU64,
}

impl ModelRegistry {
    pub fn new(processor: BatchProcessor, builder: Arc<InferenceBuilder>) -> Self {
        Self {
            models: DashMap::new(),
            processor,
            builder,
            store: None,
            inference_mode: InferenceMode::default(),
            model_namespace: "http://model.geneontology.org/".into(),
            history_limit: crate::model::history::DEFAULT_HISTORY_LIMIT,
            default_imports: BTreeSet::new(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn with_store(mut self, store: FileModelStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_inference_mode(mut self, mode: InferenceMode) -> Self {
        self.inference_mode = mode;
        self
    }

    pub fn with_model_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.model_namespace = namespace.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_default_imports(mut self, imports: BTreeSet<Iri>) -> Self {
        self.default_imports = imports;
        self
    }

    /// Assemble a registry from configuration, loading stored models.
    pub fn from_config(config: &ServerConfig) -> CausewayResult<Self> {
        config.validate()?;
        let curies = config.curies();
        let hierarchy: Arc<dyn HierarchyOracle> = match &config.hierarchy_file {
            Some(path) => Arc::new(ClassHierarchy::load(path, &curies)?),
            None => {
                tracing::warn!("no hierarchy_file configured; classes and predicates are unknown");
                Arc::new(ClassHierarchy::new())
            }
        };
        let lookup = Self::lookup_from_config(config)?;
        let augmenter =
            RootTypeAugmenter::new(lookup).with_evidence_namespace(config.evidence_namespace.clone());
        let builder = InferenceBuilder::new(
            hierarchy.clone(),
            Arc::new(StructuralReasonerFactory),
            augmenter,
            config.builder_options(),
        );
        let default_imports = config
            .default_imports
            .iter()
            .map(|i| curies.expand(i))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let processor = BatchProcessor::new(curies, hierarchy)
            .with_failure_policy(config.failure_policy)
            .with_removal_policy(config.removal_policy)
            .with_default_imports(default_imports.clone());

        let mut registry = Self::new(processor, Arc::new(builder))
            .with_inference_mode(config.inference_mode)
            .with_model_namespace(config.model_namespace.clone())
            .with_history_limit(config.history_limit)
            .with_default_imports(default_imports);
        if let Some(dir) = &config.data_dir {
            let store = FileModelStore::open(dir)?;
            for model in store.load_all()? {
                let id = model.id().clone();
                if registry.try_insert(model).is_none() {
                    tracing::warn!(model = %id, "skipping duplicate stored model");
                }
            }
            tracing::info!(dir = %dir.display(), models = registry.models.len(), "loaded stored models");
            registry.store = Some(store);
        }
        Ok(registry)
    }

    fn lookup_from_config(config: &ServerConfig) -> CausewayResult<Option<Arc<dyn LookupService>>> {
        let curies = config.curies();
        let base: Option<Arc<dyn LookupService>> = match (&config.lookup.url, &config.lookup.static_entries_file) {
            (Some(url), _) => Some(Arc::new(HttpLookupService::new(
                url.clone(),
                std::time::Duration::from_secs(config.lookup.timeout_secs),
                curies.clone(),
            ))),
            (None, Some(path)) => Some(Arc::new(StaticLookupService::from_file(path, &curies)?)),
            (None, None) => None,
        };
        Ok(match base {
            Some(service) if config.lookup.url.is_some() && config.lookup.cache_capacity > 0 => Some(Arc::new(
                CachingLookupService::new(service, config.lookup.cache_capacity),
            )),
            other => other,
        })
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    pub fn builder(&self) -> &Arc<InferenceBuilder> {
        &self.builder
    }

    pub fn get(&self, id: &Iri) -> Option<Arc<ModelHandle>> {
        self.models.get(id).map(|r| r.value().clone())
    }

    /// Live model ids, sorted.
    pub fn list(&self) -> Vec<Iri> {
        let mut ids: Vec<Iri> = self.models.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Register a model unless its id is already live.
    fn try_insert(&self, model: GraphModel) -> Option<Arc<ModelHandle>> {
        match self.models.entry(model.id().clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = Arc::new(ModelHandle::new(ModelState::with_history_limit(model, self.history_limit)));
                slot.insert(handle.clone());
                Some(handle)
            }
        }
    }

    fn fresh_model_id(&self) -> Iri {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let id = Iri::new(format!("{}{:08x}{:08x}", self.model_namespace, secs as u32, seq as u32));
            if !self.models.contains_key(&id) {
                return id;
            }
        }
    }

    /// Create an empty model with the default imports.
    pub fn create_empty(&self, id: Option<Iri>) -> CausewayResult<Arc<ModelHandle>> {
        let id = id.unwrap_or_else(|| self.fresh_model_id());
        let mut model = GraphModel::new(id.clone());
        model.replace_imports(self.default_imports.clone());
        let handle = self.try_insert(model).ok_or_else(|| ModelError::InvalidIdentifier {
            value: id.to_string(),
            reason: "a model with this id already exists".into(),
        })?;
        tracing::info!(model = %id, "created model");
        Ok(handle)
    }

    /// Drop a live model. Stored copies are left alone.
    pub fn remove(&self, id: &Iri) -> Option<Arc<ModelHandle>> {
        let removed = self.models.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::info!(model = %id, "removed model");
        }
        removed
    }

    pub fn inference(&self, id: &Iri) -> Option<Arc<InferenceResult>> {
        self.get(id)?.inference()
    }

    /// Build (or reuse) inference for the model's current version.
    pub async fn rebuild(&self, id: &Iri) -> CausewayResult<Arc<InferenceResult>> {
        let handle = self
            .get(id)
            .ok_or_else(|| ModelError::UnknownModel { id: id.to_string() })?;
        Ok(rebuild_handle(&self.builder, &handle).await?)
    }

    /// Stop accepting inference builds.
    pub fn shutdown(&self) {
        self.builder.close();
        tracing::info!(models = self.models.len(), "registry shut down");
    }

    fn snapshots(&self) -> Vec<ModelSnapshot> {
        self.list()
            .iter()
            .filter_map(|id| self.get(id))
            .map(|handle| (*handle.snapshot()).clone())
            .collect()
    }

    fn packet_id(&self) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!("{:x}{:04x}", nanos as u64, self.sequence.fetch_add(1, Ordering::Relaxed) as u16)
    }

    /// Response envelope echoing `packet_id`, or carrying a fresh one.
    pub fn envelope(&self, uid: Option<String>, intention: Option<String>, packet_id: Option<String>) -> BatchResponse {
        let packet_id = packet_id.filter(|p| !p.is_empty()).unwrap_or_else(|| self.packet_id());
        BatchResponse::new(uid, intention, packet_id)
    }

    /// Process one batch and build the response envelope. Never fails:
    /// errors become error envelopes.
    pub async fn handle_batch(
        &self,
        uid: Option<String>,
        intention: Option<String>,
        packet_id: Option<String>,
        requests: Vec<Request>,
        privileged: bool,
    ) -> BatchResponse {
        let uid = uid.filter(|u| !u.trim().is_empty());
        let response = self.envelope(uid.clone(), intention, packet_id);
        match self.run_batch(uid.as_deref(), &requests, privileged, response.clone()).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "batch rejected");
                response.fail(&err)
            }
        }
    }

    async fn run_batch(
        &self,
        uid: Option<&str>,
        requests: &[Request],
        privileged: bool,
        mut response: BatchResponse,
    ) -> CausewayResult<BatchResponse> {
        if requests.is_empty() {
            return Err(ProtocolError::EmptyBatch.into());
        }
        if privileged && uid.is_none() {
            return Err(ProtocolError::MissingUid.into());
        }
        if let Some(mutating) = requests.iter().find(|r| r.is_mutating()) {
            if !privileged {
                return Err(ProtocolError::InsufficientPermissions {
                    operation: mutating.label(),
                }
                .into());
            }
        }
        let renderer = Renderer::new(self.processor.curies(), self.processor.hierarchy().as_ref());

        if requests.iter().all(Request::is_meta) {
            let outcome = self.processor.meta(requests);
            response.signal = Some(outcome.signal);
            response.data = Some(ResponseData {
                meta: Some(renderer.meta(&self.snapshots())),
                outcomes: outcome.outcomes,
                ..Default::default()
            });
            return Ok(response);
        }

        let (handle, created) = self.target(requests, uid)?;
        let mutating = requests.iter().any(Request::is_mutating);
        let outcome = if mutating {
            handle.write(|state| self.processor.apply(state, requests, uid))
        } else {
            self.processor.query(&handle.snapshot(), requests)
        };
        if created {
            if let Some(failure) = outcome.first_failure() {
                if self.processor.failure_policy() == FailurePolicy::AllOrNothing {
                    // nothing of the batch survives, not even the new model
                    self.remove(handle.id());
                    response.signal = Some(outcome.signal);
                    let message = failure.message.clone().unwrap_or_default();
                    response.data = Some(ResponseData {
                        outcomes: outcome.outcomes,
                        ..Default::default()
                    });
                    response.message_type = MessageType::Error;
                    response.message = message;
                    return Ok(response);
                }
            }
        }

        if outcome.remove_requested {
            self.remove(handle.id());
            if let Some(store) = &self.store {
                store.delete(handle.id())?;
            }
            response.signal = Some(outcome.signal);
            response.data = Some(ResponseData {
                id: Some(handle.id().to_string()),
                outcomes: outcome.outcomes,
                ..Default::default()
            });
            return Ok(response);
        }

        if outcome.store_requested {
            self.store_model(&handle)?;
        }

        if outcome.changed || created || handle.is_stale() {
            self.trigger_inference(&handle, &mut response).await;
        }

        let snapshot = handle.snapshot();
        let inference = handle.inference();
        let mut data = renderer.model_data(&snapshot, inference.as_deref(), &outcome);
        if requests.iter().any(Request::is_meta) {
            data.meta = Some(renderer.meta(&self.snapshots()));
        }
        if let Some(failure) = outcome.first_failure() {
            response.message_type = MessageType::Error;
            response.message = failure.message.clone().unwrap_or_else(|| "operation failed".into());
            if let Some(code) = &failure.code {
                response.add_commentary(code);
            }
        }
        response.signal = Some(outcome.signal);
        response.data = Some(data);
        Ok(response)
    }

    /// Find (or create, for `model add` / `model import`) the batch's model.
    fn target(&self, requests: &[Request], uid: Option<&str>) -> CausewayResult<(Arc<ModelHandle>, bool)> {
        let curies = self.processor.curies();
        let mut ids = Vec::new();
        for request in requests.iter().filter(|r| !r.is_meta()) {
            if let Some(raw) = &request.arguments.model_id {
                let id = curies.expand(raw)?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if ids.len() > 1 {
            return Err(ProtocolError::MixedModels {
                first: ids[0].to_string(),
                second: ids[1].to_string(),
            }
            .into());
        }

        let first = &requests[0];
        if first.creates_model() {
            let handle = self.create_from_request(first, uid)?;
            if let Some(other) = ids.first() {
                if other != handle.id() {
                    self.remove(handle.id());
                    return Err(ProtocolError::MixedModels {
                        first: handle.id().to_string(),
                        second: other.to_string(),
                    }
                    .into());
                }
            }
            return Ok((handle, true));
        }

        let id = ids.into_iter().next().ok_or(ProtocolError::MissingModelId)?;
        let handle = self
            .get(&id)
            .ok_or_else(|| ModelError::UnknownModel { id: id.to_string() })?;
        Ok((handle, false))
    }

    fn create_from_request(&self, request: &Request, uid: Option<&str>) -> CausewayResult<Arc<ModelHandle>> {
        let args = &request.arguments;
        match request.operation {
            Operation::Import => {
                let text = args.import_model.as_deref().ok_or_else(|| ModelError::MissingArgument {
                    argument: "import-model".into(),
                    operation: request.label(),
                })?;
                let format = ModelFormat::parse(args.format.as_deref())?;
                // text without an ontology declaration gets a fresh id
                let model = match export::import_model(text, format, None) {
                    Ok(model) => model,
                    Err(_) if format == ModelFormat::NTriples => {
                        export::import_model(text, format, Some(self.fresh_model_id()))?
                    }
                    Err(err) => return Err(err.into()),
                };
                let id = model.id().clone();
                let individuals = model.individual_count();
                let handle = self.try_insert(model).ok_or_else(|| ModelError::Import {
                    message: format!("model {id} is already loaded"),
                })?;
                tracing::info!(model = %id, individuals, "imported model");
                // imported content counts as unsaved
                handle.write(|state| state.modified = true);
                Ok(handle)
            }
            _ => {
                let handle = self.create_empty(None)?;
                let curies = self.processor.curies();
                let mut annotations: Vec<Annotation> = args
                    .values
                    .iter()
                    .map(|v| v.to_annotation(uid))
                    .collect();
                if let Some(taxon) = &args.taxon_id {
                    let taxon = curies
                        .expand(taxon)
                        .or_else(|_| curies.expand(&format!("NCBITaxon:{taxon}")))?;
                    annotations.push(Annotation::new(IN_TAXON, taxon.to_string()));
                }
                handle.write(|state| {
                    for annotation in annotations {
                        let index = state.model.annotations().len();
                        state.model.insert_annotation(&AnnotationTarget::Model, annotation, index);
                    }
                    state.modified = true;
                });
                Ok(handle)
            }
        }
    }

    fn store_model(&self, handle: &ModelHandle) -> CausewayResult<()> {
        let store = self.store.as_ref().ok_or(StoreError::NotConfigured)?;
        let snapshot = handle.snapshot();
        store.save(&snapshot.model)?;
        handle.write(|state| {
            if state.version == snapshot.version {
                state.modified = false;
            }
        });
        Ok(())
    }

    async fn trigger_inference(&self, handle: &Arc<ModelHandle>, response: &mut BatchResponse) {
        match self.inference_mode {
            InferenceMode::Disabled => {}
            InferenceMode::Synchronous => match rebuild_handle(&self.builder, handle).await {
                Ok(result) => {
                    for line in result.commentary() {
                        response.add_commentary(line);
                    }
                }
                Err(err) => {
                    tracing::error!(model = %handle.id(), error = %err, "inference build failed");
                    response.add_commentary(CausewayError::from(err).to_string());
                }
            },
            InferenceMode::Background => {
                let builder = self.builder.clone();
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(err) = rebuild_handle(&builder, &handle).await {
                        tracing::error!(model = %handle.id(), error = %err, "background inference build failed");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::batch::{Arguments, Entity, WireAnnotation};
    use crate::hierarchy::PropertyInfo;
    use crate::iri::CurieMap;

    fn registry() -> ModelRegistry {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_property(PropertyInfo::new(Iri::new("http://purl.obolibrary.org/obo/RO_0002333")));
        let hierarchy: Arc<dyn HierarchyOracle> = Arc::new(hierarchy);
        let builder = InferenceBuilder::new(
            hierarchy.clone(),
            Arc::new(StructuralReasonerFactory),
            RootTypeAugmenter::new(None),
            Default::default(),
        );
        ModelRegistry::new(BatchProcessor::new(CurieMap::default(), hierarchy), Arc::new(builder))
    }

    fn model_add(taxon: Option<&str>) -> Request {
        Request::new(
            Entity::Model,
            Operation::Add,
            Arguments {
                taxon_id: taxon.map(str::to_string),
                values: vec![WireAnnotation::new("title", "new model")],
                ..Arguments::default()
            },
        )
    }

    #[tokio::test]
    async fn model_add_creates_annotated_model() {
        let registry = registry();
        let response = registry
            .handle_batch(Some("alice".into()), None, None, vec![model_add(Some("9606"))], true)
            .await;
        assert!(!response.is_error(), "{response:?}");
        let id = Iri::new(response.data.unwrap().id.unwrap());
        let snapshot = registry.get(&id).unwrap().snapshot();
        let keys: Vec<_> = snapshot.model.annotations().iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["title", IN_TAXON]);
        assert_eq!(
            snapshot.model.annotations()[1].value,
            "http://purl.obolibrary.org/obo/NCBITaxon_9606"
        );
        // creation is not an undoable change
        assert!(snapshot.undo.is_empty());
        assert!(registry.inference(&id).is_some());
    }

    #[test]
    fn concurrent_creation_of_one_id_keeps_first_model() {
        let registry = Arc::new(registry());
        let id = Iri::new("http://model.example.org/shared");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || registry.create_empty(Some(id)).ok())
            })
            .collect();
        let created: Vec<_> = threads
            .into_iter()
            .filter_map(|t| t.join().unwrap())
            .collect();
        assert_eq!(created.len(), 1);
        assert!(Arc::ptr_eq(&created[0], &registry.get(&id).unwrap()));

        let err = registry.create_empty(Some(id)).err().unwrap();
        assert!(matches!(err, CausewayError::Model(ModelError::InvalidIdentifier { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unprivileged_mutation_is_rejected() {
        let registry = registry();
        let response = registry.handle_batch(None, None, None, vec![model_add(None)], false).await;
        assert!(response.is_error());
        assert_eq!(
            response.commentary.as_deref(),
            Some("causeway::protocol::insufficient_permissions")
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn privileged_batch_requires_uid() {
        let registry = registry();
        let response = registry.handle_batch(Some("  ".into()), None, None, vec![model_add(None)], true).await;
        assert_eq!(response.commentary.as_deref(), Some("causeway::protocol::missing_uid"));
    }

    #[tokio::test]
    async fn packet_id_is_echoed_or_generated() {
        let registry = registry();
        let meta = Request::new(Entity::Meta, Operation::Get, Arguments::default());
        let echoed = registry
            .handle_batch(None, Some("query".into()), Some("abc".into()), vec![meta.clone()], false)
            .await;
        assert_eq!(echoed.packet_id, "abc");
        assert_eq!(echoed.intention.as_deref(), Some("query"));
        let generated = registry.handle_batch(None, None, None, vec![meta], false).await;
        assert!(!generated.packet_id.is_empty());

        // envelopes for batches that never parsed get an id too
        let rejected = registry
            .envelope(None, None, Some(String::new()))
            .fail(&CausewayError::from(ProtocolError::EmptyBatch));
        assert!(rejected.is_error());
        assert!(!rejected.packet_id.is_empty());
        assert_ne!(rejected.packet_id, generated.packet_id);
    }

    #[tokio::test]
    async fn unknown_model_is_an_error_envelope() {
        let registry = registry();
        let get = Request::new(
            Entity::Model,
            Operation::Get,
            Arguments {
                model_id: Some("gomodel:missing".into()),
                ..Arguments::default()
            },
        );
        let response = registry.handle_batch(None, None, None, vec![get], false).await;
        assert_eq!(response.commentary.as_deref(), Some("causeway::model::unknown_model"));
    }

    #[test]
    fn writes_publish_snapshots() {
        let registry = registry();
        let handle = registry.create_empty(None).unwrap();
        let before = handle.snapshot();
        handle.write(|state| {
            state.version += 1;
        });
        assert_eq!(before.version, 0);
        assert_eq!(handle.snapshot().version, 1);
        assert!(handle.is_stale());
        let calls = AtomicUsize::new(0);
        handle.write(|_| calls.fetch_add(1, Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn create_empty_rejects_duplicates() {
        let registry = registry();
        let id = Iri::new("http://model.geneontology.org/fixed");
        registry.create_empty(Some(id.clone())).unwrap();
        assert!(registry.create_empty(Some(id)).is_err());
        assert_eq!(registry.len(), 1);
    }
}
