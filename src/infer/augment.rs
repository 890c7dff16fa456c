//! Root-type augmentation.
//!
//! Gene-product classes (`UniProtKB:...`) are unknown to the hierarchy. Before
//! reasoning, each asserted named class is resolved through the lookup service
//! and the coarse parent of its first entry (protein or information
//! biomacromolecule) is asserted on the individual. The work is done on a copy
//! and type sets deduplicate, so running it twice changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::iri::Iri;
use crate::lookup::LookupService;
use crate::model::{GraphModel, TypeExpr};

/// Default evidence namespace: evidence classes are never looked up.
pub const DEFAULT_EVIDENCE_NAMESPACE: &str = "http://purl.obolibrary.org/obo/ECO_";

/// Augmented copy plus what happened on the way.
#[derive(Debug, Clone)]
pub struct Augmentation {
    pub model: GraphModel,
    /// Number of type assertions added.
    pub added: usize,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct RootTypeAugmenter {
    lookup: Option<Arc<dyn LookupService>>,
    evidence_namespace: String,
}

impl RootTypeAugmenter {
    pub fn new(lookup: Option<Arc<dyn LookupService>>) -> Self {
        Self {
            lookup,
            evidence_namespace: DEFAULT_EVIDENCE_NAMESPACE.to_string(),
        }
    }

    pub fn with_evidence_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.evidence_namespace = namespace.into();
        self
    }

    pub fn augment(&self, model: &GraphModel) -> Augmentation {
        let mut copy = model.clone();
        let Some(lookup) = &self.lookup else {
            return Augmentation {
                model: copy,
                added: 0,
                warnings: vec!["no lookup service configured; root types not added".into()],
            };
        };

        let mut per_individual: BTreeMap<Iri, Vec<Iri>> = BTreeMap::new();
        let mut ids = BTreeSet::new();
        for individual in model.individuals() {
            let classes: Vec<Iri> = individual
                .named_types()
                .filter(|class| !class.in_namespace(&self.evidence_namespace))
                .cloned()
                .collect();
            ids.extend(classes.iter().cloned());
            if !classes.is_empty() {
                per_individual.insert(individual.id.clone(), classes);
            }
        }
        if ids.is_empty() {
            return Augmentation {
                model: copy,
                added: 0,
                warnings: Vec::new(),
            };
        }

        let entries = match lookup.lookup_batch(&ids) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(model = %model.id(), service = lookup.name(), error = %err, "root type lookup failed");
                return Augmentation {
                    model: copy,
                    added: 0,
                    warnings: vec![format!("root types not added: {err}")],
                };
            }
        };

        let mut added = 0;
        for (individual, classes) in per_individual {
            for class in classes {
                let parent = entries
                    .get(&class)
                    .and_then(|found| found.first())
                    .and_then(|entry| entry.direct_parent());
                if let Some(parent) = parent {
                    if copy.insert_type(&individual, TypeExpr::class(parent.clone())) {
                        added += 1;
                    }
                }
            }
        }
        tracing::debug!(model = %model.id(), looked_up = ids.len(), added, "added root types");
        Augmentation {
            model: copy,
            added,
            warnings: Vec::new(),
        }
    }
}
