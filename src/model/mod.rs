//! Graph model: typed individuals connected by labeled edges.
//!
//! A [`GraphModel`] is the canonical, mutable state of one causal-activity model.
//! It is only ever mutated through [`Diff`]s (see [`diff`]) so that every change
//! is reversible and can be recorded in the model's [`CommandLog`](history::CommandLog).
//!
//! The graph is a multigraph: an edge is identified by its
//! `(subject, predicate, object)` triple, so parallel edges with distinct
//! predicates coexist. Cycles are legal data.

pub mod diff;
pub mod export;
pub mod history;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::iri::Iri;

pub use diff::{AnnotationTarget, Diff};
pub use history::{ChangeSetSummary, CommandLog};

/// A key/value annotation with optional provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

impl Annotation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    /// Two annotations denote the same fact when key and value agree.
    fn same_fact(&self, other: &Annotation) -> bool {
        self.key == other.key && self.value == other.value
    }
}

/// A class expression asserted as the type of an individual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TypeExpr {
    /// A named class.
    Class { id: Iri },
    /// Existential restriction: `property some filler`.
    SomeValuesFrom { property: Iri, filler: Box<TypeExpr> },
    /// Conjunction of expressions.
    Intersection { expressions: Vec<TypeExpr> },
    /// Disjunction of expressions.
    Union { expressions: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn class(id: Iri) -> Self {
        TypeExpr::Class { id }
    }

    /// The IRI of a named class, `None` for anonymous expressions.
    pub fn named_class(&self) -> Option<&Iri> {
        match self {
            TypeExpr::Class { id } => Some(id),
            _ => None,
        }
    }

    /// Collect every named class and property mentioned in the expression.
    pub fn signature(&self, classes: &mut BTreeSet<Iri>, properties: &mut BTreeSet<Iri>) {
        match self {
            TypeExpr::Class { id } => {
                classes.insert(id.clone());
            }
            TypeExpr::SomeValuesFrom { property, filler } => {
                properties.insert(property.clone());
                filler.signature(classes, properties);
            }
            TypeExpr::Intersection { expressions } | TypeExpr::Union { expressions } => {
                for expr in expressions {
                    expr.signature(classes, properties);
                }
            }
        }
    }
}

/// A node in the model graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub id: Iri,
    #[serde(default)]
    pub types: BTreeSet<TypeExpr>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Individual {
    pub fn new(id: Iri) -> Self {
        Self {
            id,
            types: BTreeSet::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_type(mut self, expr: TypeExpr) -> Self {
        self.types.insert(expr);
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        if !self.annotations.iter().any(|a| a.same_fact(&annotation)) {
            self.annotations.push(annotation);
        }
        self
    }

    /// Named classes among the asserted types.
    pub fn named_types(&self) -> impl Iterator<Item = &Iri> {
        self.types.iter().filter_map(TypeExpr::named_class)
    }
}

/// Identity of an edge: the `(subject, predicate, object)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: Iri,
}

impl EdgeKey {
    pub fn new(subject: Iri, predicate: Iri, object: Iri) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn touches(&self, individual: &Iri) -> bool {
        &self.subject == individual || &self.object == individual
    }
}

/// A directed labeled relation between two individuals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(flatten)]
    pub key: EdgeKey,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Edge {
    pub fn new(subject: Iri, predicate: Iri, object: Iri) -> Self {
        Self {
            key: EdgeKey::new(subject, predicate, object),
            annotations: Vec::new(),
        }
    }
}

/// The mutable graph of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphModel {
    id: Iri,
    individuals: BTreeMap<Iri, Individual>,
    edges: BTreeMap<EdgeKey, Vec<Annotation>>,
    annotations: Vec<Annotation>,
    imports: BTreeSet<Iri>,
}

impl GraphModel {
    /// Create an empty model.
    pub fn new(id: Iri) -> Self {
        Self {
            id,
            individuals: BTreeMap::new(),
            edges: BTreeMap::new(),
            annotations: Vec::new(),
            imports: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &Iri {
        &self.id
    }

    pub fn individual(&self, id: &Iri) -> Option<&Individual> {
        self.individuals.get(id)
    }

    pub fn contains_individual(&self, id: &Iri) -> bool {
        self.individuals.contains_key(id)
    }

    pub fn individuals(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.values()
    }

    pub fn individual_count(&self) -> usize {
        self.individuals.len()
    }

    pub fn contains_edge(&self, key: &EdgeKey) -> bool {
        self.edges.contains_key(key)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<Edge> {
        self.edges.get(key).map(|annotations| Edge {
            key: key.clone(),
            annotations: annotations.clone(),
        })
    }

    /// All edges, ordered by `(subject, predicate, object)`.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|(key, annotations)| Edge {
            key: key.clone(),
            annotations: annotations.clone(),
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges where the individual is subject or object.
    pub fn incident_edges(&self, individual: &Iri) -> Vec<Edge> {
        self.edges()
            .filter(|edge| edge.key.touches(individual))
            .collect()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn imports(&self) -> &BTreeSet<Iri> {
        &self.imports
    }

    /// Index of an annotation fact (key + value) on the given target.
    pub fn annotation_position(&self, target: &AnnotationTarget, annotation: &Annotation) -> Option<usize> {
        self.annotation_slot(target)?
            .iter()
            .position(|a| a.same_fact(annotation))
    }

    /// Whether the annotation target exists in this model.
    pub fn has_target(&self, target: &AnnotationTarget) -> bool {
        self.annotation_slot(target).is_some()
    }

    fn annotation_slot(&self, target: &AnnotationTarget) -> Option<&Vec<Annotation>> {
        match target {
            AnnotationTarget::Model => Some(&self.annotations),
            AnnotationTarget::Individual(id) => self.individuals.get(id).map(|i| &i.annotations),
            AnnotationTarget::Edge(key) => self.edges.get(key),
        }
    }

    fn annotation_slot_mut(&mut self, target: &AnnotationTarget) -> Option<&mut Vec<Annotation>> {
        match target {
            AnnotationTarget::Model => Some(&mut self.annotations),
            AnnotationTarget::Individual(id) => {
                self.individuals.get_mut(id).map(|i| &mut i.annotations)
            }
            AnnotationTarget::Edge(key) => self.edges.get_mut(key),
        }
    }

    // -----------------------------------------------------------------------
    // Primitives used by `Diff::apply`. Each returns whether it changed state.
    // -----------------------------------------------------------------------

    pub(crate) fn insert_individual(&mut self, individual: Individual) -> bool {
        if self.individuals.contains_key(&individual.id) {
            return false;
        }
        self.individuals.insert(individual.id.clone(), individual);
        true
    }

    pub(crate) fn take_individual(&mut self, id: &Iri) -> Option<Individual> {
        self.individuals.remove(id)
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) -> bool {
        if self.edges.contains_key(&edge.key)
            || !self.individuals.contains_key(&edge.key.subject)
            || !self.individuals.contains_key(&edge.key.object)
        {
            return false;
        }
        self.edges.insert(edge.key, edge.annotations);
        true
    }

    pub(crate) fn take_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        self.edges.remove(key).map(|annotations| Edge {
            key: key.clone(),
            annotations,
        })
    }

    pub(crate) fn insert_type(&mut self, id: &Iri, expr: TypeExpr) -> bool {
        self.individuals
            .get_mut(id)
            .is_some_and(|individual| individual.types.insert(expr))
    }

    pub(crate) fn delete_type(&mut self, id: &Iri, expr: &TypeExpr) -> bool {
        self.individuals
            .get_mut(id)
            .is_some_and(|individual| individual.types.remove(expr))
    }

    pub(crate) fn insert_annotation(
        &mut self,
        target: &AnnotationTarget,
        annotation: Annotation,
        index: usize,
    ) -> bool {
        match self.annotation_slot_mut(target) {
            Some(slot) if !slot.iter().any(|a| a.same_fact(&annotation)) => {
                let index = index.min(slot.len());
                slot.insert(index, annotation);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn delete_annotation(&mut self, target: &AnnotationTarget, index: usize) -> Option<Annotation> {
        let slot = self.annotation_slot_mut(target)?;
        (index < slot.len()).then(|| slot.remove(index))
    }

    pub(crate) fn replace_imports(&mut self, imports: BTreeSet<Iri>) {
        self.imports = imports;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Iri {
        Iri::new(format!("http://example.org/{s}"))
    }

    #[test]
    fn edges_require_both_endpoints() {
        let mut model = GraphModel::new(iri("m"));
        model.insert_individual(Individual::new(iri("a")));
        assert!(!model.insert_edge(Edge::new(iri("a"), iri("p"), iri("b"))));
        model.insert_individual(Individual::new(iri("b")));
        assert!(model.insert_edge(Edge::new(iri("a"), iri("p"), iri("b"))));
    }

    #[test]
    fn parallel_edges_with_distinct_predicates() {
        let mut model = GraphModel::new(iri("m"));
        model.insert_individual(Individual::new(iri("a")));
        model.insert_individual(Individual::new(iri("b")));
        assert!(model.insert_edge(Edge::new(iri("a"), iri("p"), iri("b"))));
        assert!(model.insert_edge(Edge::new(iri("a"), iri("q"), iri("b"))));
        assert!(!model.insert_edge(Edge::new(iri("a"), iri("p"), iri("b"))));
        assert!(model.insert_edge(Edge::new(iri("b"), iri("p"), iri("a"))));
        assert_eq!(model.edge_count(), 3);
        assert_eq!(model.incident_edges(&iri("a")).len(), 3);
    }

    #[test]
    fn annotations_keep_position_on_reinsert() {
        let mut model = GraphModel::new(iri("m"));
        let target = AnnotationTarget::Model;
        model.insert_annotation(&target, Annotation::new("title", "x"), 0);
        model.insert_annotation(&target, Annotation::new("state", "dev"), 1);
        let removed = model.delete_annotation(&target, 0).unwrap();
        model.insert_annotation(&target, removed, 0);
        assert_eq!(model.annotations()[0].key, "title");
        assert!(!model.insert_annotation(&target, Annotation::new("title", "x"), 2));
    }

    #[test]
    fn signature_walks_nested_expressions() {
        let expr = TypeExpr::Intersection {
            expressions: vec![
                TypeExpr::class(iri("A")),
                TypeExpr::SomeValuesFrom {
                    property: iri("p"),
                    filler: Box::new(TypeExpr::class(iri("B"))),
                },
            ],
        };
        let mut classes = BTreeSet::new();
        let mut properties = BTreeSet::new();
        expr.signature(&mut classes, &mut properties);
        assert_eq!(classes.len(), 2);
        assert!(properties.contains(&iri("p")));
    }
}
