//! Module extraction: the slice of the hierarchy a model actually needs.
//!
//! Seeds are the named classes mentioned in the model's type expressions, the
//! properties used by its edges and restrictions, and the lookup anchor
//! classes that root-type augmentation may add later. The module holds the
//! upward closure of those seeds (domain and range classes of the seed
//! properties included) together with every disjointness axiom whose two
//! sides are both inside the module. Ancestor queries for any seed answer the
//! same as on the full hierarchy.

use std::collections::BTreeSet;

use crate::iri::Iri;
use crate::lookup::{INFORMATION_BIOMACROMOLECULE, PROTEIN};
use crate::model::GraphModel;

use super::{ClassHierarchy, HierarchyOracle, HierarchyStats, PropertyInfo};

/// A sub-hierarchy produced by [`ModuleExtractor`].
#[derive(Debug, Clone)]
pub struct HierarchyModule {
    hierarchy: ClassHierarchy,
    seeds: BTreeSet<Iri>,
}

impl HierarchyModule {
    pub fn seeds(&self) -> &BTreeSet<Iri> {
        &self.seeds
    }

    pub fn stats(&self) -> HierarchyStats {
        self.hierarchy.stats()
    }

    pub fn into_hierarchy(self) -> ClassHierarchy {
        self.hierarchy
    }
}

/// Extracts [`HierarchyModule`]s from a full hierarchy.
#[derive(Debug, Clone)]
pub struct ModuleExtractor {
    anchors: Vec<Iri>,
}

impl Default for ModuleExtractor {
    fn default() -> Self {
        Self {
            anchors: vec![Iri::new(PROTEIN), Iri::new(INFORMATION_BIOMACROMOLECULE)],
        }
    }
}

impl ModuleExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the anchor classes that are always seeded.
    pub fn with_anchors(anchors: Vec<Iri>) -> Self {
        Self { anchors }
    }

    pub fn extract(&self, hierarchy: &dyn HierarchyOracle, model: &GraphModel) -> HierarchyModule {
        let mut seed_classes = BTreeSet::new();
        let mut seed_properties = BTreeSet::new();
        for individual in model.individuals() {
            for expr in &individual.types {
                expr.signature(&mut seed_classes, &mut seed_properties);
            }
        }
        for edge in model.edges() {
            seed_properties.insert(edge.key.predicate);
        }
        seed_classes.extend(self.anchors.iter().cloned());

        let mut module = ClassHierarchy::new();

        let mut properties = BTreeSet::new();
        for property in &seed_properties {
            properties.extend(hierarchy.property_ancestors(property));
        }
        let mut class_roots = seed_classes.clone();
        for property in &properties {
            if let Some(info) = hierarchy.property(property) {
                class_roots.extend(info.domain.iter().cloned());
                class_roots.extend(info.range.iter().cloned());
                module.add_property(PropertyInfo {
                    parents: info
                        .parents
                        .iter()
                        .filter(|p| properties.contains(*p))
                        .cloned()
                        .collect(),
                    ..info
                });
            }
        }

        let mut classes = BTreeSet::new();
        for class in &class_roots {
            classes.extend(hierarchy.ancestors(class));
        }
        for class in &classes {
            module.add_class(class, hierarchy.label(class).as_deref());
            for parent in hierarchy.direct_parents(class) {
                if classes.contains(&parent) {
                    module.add_subclass(class, &parent);
                }
            }
            for other in hierarchy.disjoint_with(class) {
                if classes.contains(&other) {
                    module.add_disjoint(class, &other);
                }
            }
        }

        let mut seeds = seed_classes;
        seeds.extend(seed_properties);
        tracing::debug!(
            model = %model.id(),
            seeds = seeds.len(),
            classes = classes.len(),
            properties = properties.len(),
            "extracted hierarchy module"
        );
        HierarchyModule {
            hierarchy: module,
            seeds,
        }
    }
}

impl HierarchyOracle for HierarchyModule {
    fn contains_class(&self, class: &Iri) -> bool {
        self.hierarchy.contains_class(class)
    }

    fn ancestors(&self, class: &Iri) -> BTreeSet<Iri> {
        self.hierarchy.ancestors(class)
    }

    fn descendants(&self, class: &Iri) -> BTreeSet<Iri> {
        self.hierarchy.descendants(class)
    }

    fn direct_parents(&self, class: &Iri) -> Vec<Iri> {
        self.hierarchy.direct_parents(class)
    }

    fn disjoint_with(&self, class: &Iri) -> Vec<Iri> {
        self.hierarchy.disjoint_with(class)
    }

    fn label(&self, id: &Iri) -> Option<String> {
        self.hierarchy.label(id)
    }

    fn property(&self, id: &Iri) -> Option<PropertyInfo> {
        self.hierarchy.property(id)
    }

    fn property_ancestors(&self, id: &Iri) -> BTreeSet<Iri> {
        self.hierarchy.property_ancestors(id)
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        self.hierarchy.properties()
    }
}
