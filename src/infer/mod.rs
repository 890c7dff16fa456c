//! Inference: derived classification state for a model version.
//!
//! The pipeline lives in [`builder::InferenceBuilder`]. It extracts a
//! hierarchy module, augments a copy of the model with root types resolved
//! through the lookup service ([`augment`]), runs a reasoner created by a
//! [`ReasonerFactory`] and packages the answer as an immutable
//! [`InferenceResult`].

pub mod augment;
pub mod builder;
pub mod classifier;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::InferenceError;
use crate::hierarchy::HierarchyOracle;
use crate::iri::Iri;
use crate::model::{EdgeKey, GraphModel};

pub use augment::{Augmentation, RootTypeAugmenter};
pub use builder::{BuilderOptions, InferenceBuilder};
pub use classifier::StructuralReasonerFactory;

/// What a reasoner derived for one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Per individual, the full set of classes it is an instance of.
    pub inferred_types: BTreeMap<Iri, BTreeSet<Iri>>,
    pub consistent: bool,
    /// Individuals whose inferred types clash.
    pub unsatisfiable: BTreeSet<Iri>,
    /// Relations entailed but not asserted.
    pub inferred_relations: Vec<EdgeKey>,
}

/// Input handed to a reasoner instance.
#[derive(Clone)]
pub struct ReasoningInput {
    pub model: Arc<GraphModel>,
    pub hierarchy: Arc<dyn HierarchyOracle>,
}

/// Creates one reasoner instance per build.
pub trait ReasonerFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, input: ReasoningInput) -> Result<Box<dyn ReasonerInstance>, InferenceError>;
}

/// A reasoner bound to one model. Owned exclusively by the build that
/// created it and disposed exactly once.
pub trait ReasonerInstance: Send {
    fn classify(&mut self) -> Result<Classification, InferenceError>;

    fn dispose(self: Box<Self>) -> Result<(), InferenceError>;
}

/// Published inference for one model version. Never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    model: Iri,
    model_version: u64,
    inferred_types: BTreeMap<Iri, BTreeSet<Iri>>,
    consistent: bool,
    unsatisfiable: BTreeSet<Iri>,
    inferred_relations: Vec<EdgeKey>,
    reasoner: String,
    commentary: Vec<String>,
}

impl InferenceResult {
    pub fn new(
        model: Iri,
        model_version: u64,
        classification: Classification,
        reasoner: impl Into<String>,
        commentary: Vec<String>,
    ) -> Self {
        Self {
            model,
            model_version,
            inferred_types: classification.inferred_types,
            consistent: classification.consistent,
            unsatisfiable: classification.unsatisfiable,
            inferred_relations: classification.inferred_relations,
            reasoner: reasoner.into(),
            commentary,
        }
    }

    pub fn model(&self) -> &Iri {
        &self.model
    }

    pub fn model_version(&self) -> u64 {
        self.model_version
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    pub fn inferred_types(&self, individual: &Iri) -> Option<&BTreeSet<Iri>> {
        self.inferred_types.get(individual)
    }

    pub fn all_inferred_types(&self) -> &BTreeMap<Iri, BTreeSet<Iri>> {
        &self.inferred_types
    }

    pub fn unsatisfiable(&self) -> &BTreeSet<Iri> {
        &self.unsatisfiable
    }

    pub fn inferred_relations(&self) -> &[EdgeKey] {
        &self.inferred_relations
    }

    pub fn reasoner(&self) -> &str {
        &self.reasoner
    }

    pub fn commentary(&self) -> &[String] {
        &self.commentary
    }
}
