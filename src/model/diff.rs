//! Reversible changes to a [`GraphModel`].
//!
//! Every mutation of a model is expressed as a [`Diff`]. A diff carries enough
//! information to undo itself: removing an individual records its types,
//! annotations and incident edges, removing an annotation records its position.
//! Applying `d` and then `d.invert()` yields a model equal to the original.

use std::collections::BTreeSet;

use crate::error::ModelError;
use crate::iri::Iri;

use super::{Annotation, Edge, EdgeKey, GraphModel, Individual, TypeExpr};

/// Where an annotation is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationTarget {
    Model,
    Individual(Iri),
    Edge(EdgeKey),
}

/// A single reversible change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    /// Insert an individual, then the listed edges (non-empty only when
    /// restoring a cascaded removal).
    AddIndividual { individual: Individual, edges: Vec<Edge> },
    /// Remove the listed edges, then the individual.
    RemoveIndividual { individual: Individual, edges: Vec<Edge> },
    AddEdge(Edge),
    RemoveEdge(Edge),
    AddType { individual: Iri, expr: TypeExpr },
    RemoveType { individual: Iri, expr: TypeExpr },
    AddAnnotation { target: AnnotationTarget, annotation: Annotation, index: usize },
    RemoveAnnotation { target: AnnotationTarget, annotation: Annotation, index: usize },
    SetImports { before: BTreeSet<Iri>, after: BTreeSet<Iri> },
}

impl Diff {
    /// The change that reverses this one.
    pub fn invert(&self) -> Diff {
        match self.clone() {
            Diff::AddIndividual { individual, edges } => Diff::RemoveIndividual { individual, edges },
            Diff::RemoveIndividual { individual, edges } => Diff::AddIndividual { individual, edges },
            Diff::AddEdge(edge) => Diff::RemoveEdge(edge),
            Diff::RemoveEdge(edge) => Diff::AddEdge(edge),
            Diff::AddType { individual, expr } => Diff::RemoveType { individual, expr },
            Diff::RemoveType { individual, expr } => Diff::AddType { individual, expr },
            Diff::AddAnnotation {
                target,
                annotation,
                index,
            } => Diff::RemoveAnnotation {
                target,
                annotation,
                index,
            },
            Diff::RemoveAnnotation {
                target,
                annotation,
                index,
            } => Diff::AddAnnotation {
                target,
                annotation,
                index,
            },
            Diff::SetImports { before, after } => Diff::SetImports {
                before: after,
                after: before,
            },
        }
    }

    /// Whether this change only adds independently mergeable facts.
    pub fn is_additive(&self) -> bool {
        matches!(
            self,
            Diff::AddIndividual { .. } | Diff::AddEdge(_) | Diff::AddType { .. } | Diff::AddAnnotation { .. }
        )
    }

    /// Individuals whose rendering changes when this diff is applied.
    pub fn touched(&self) -> Vec<Iri> {
        match self {
            Diff::AddIndividual { individual, edges } | Diff::RemoveIndividual { individual, edges } => {
                let mut ids = vec![individual.id.clone()];
                for edge in edges {
                    ids.push(edge.key.subject.clone());
                    ids.push(edge.key.object.clone());
                }
                ids
            }
            Diff::AddEdge(edge) | Diff::RemoveEdge(edge) => {
                vec![edge.key.subject.clone(), edge.key.object.clone()]
            }
            Diff::AddType { individual, .. } | Diff::RemoveType { individual, .. } => {
                vec![individual.clone()]
            }
            Diff::AddAnnotation { target, .. } | Diff::RemoveAnnotation { target, .. } => match target {
                AnnotationTarget::Model => Vec::new(),
                AnnotationTarget::Individual(id) => vec![id.clone()],
                AnnotationTarget::Edge(key) => vec![key.subject.clone(), key.object.clone()],
            },
            Diff::SetImports { .. } => Vec::new(),
        }
    }

    /// Apply this change. Fails without modifying the model when the change
    /// does not match the current state.
    pub fn apply(&self, model: &mut GraphModel) -> Result<(), ModelError> {
        match self {
            Diff::AddIndividual { individual, edges } => {
                if model.contains_individual(&individual.id) {
                    return Err(mismatch(format!("individual {} already present", individual.id)));
                }
                model.insert_individual(individual.clone());
                for (applied, edge) in edges.iter().enumerate() {
                    if !model.insert_edge(edge.clone()) {
                        for undo in &edges[..applied] {
                            model.take_edge(&undo.key);
                        }
                        model.take_individual(&individual.id);
                        return Err(mismatch(format!("cannot restore edge {:?}", edge.key)));
                    }
                }
                Ok(())
            }
            Diff::RemoveIndividual { individual, edges } => {
                match model.individual(&individual.id) {
                    Some(current) if current == individual => {}
                    _ => return Err(mismatch(format!("individual {} differs", individual.id))),
                }
                let incident = model.incident_edges(&individual.id);
                if incident.len() != edges.len() || incident.iter().any(|e| !edges.contains(e)) {
                    return Err(mismatch(format!(
                        "incident edges of {} changed",
                        individual.id
                    )));
                }
                for edge in edges {
                    model.take_edge(&edge.key);
                }
                model.take_individual(&individual.id);
                Ok(())
            }
            Diff::AddEdge(edge) => {
                if model.insert_edge(edge.clone()) {
                    Ok(())
                } else {
                    Err(mismatch(format!("cannot add edge {:?}", edge.key)))
                }
            }
            Diff::RemoveEdge(edge) => match model.edge(&edge.key) {
                Some(current) if &current == edge => {
                    model.take_edge(&edge.key);
                    Ok(())
                }
                _ => Err(mismatch(format!("edge {:?} differs", edge.key))),
            },
            Diff::AddType { individual, expr } => {
                if model.insert_type(individual, expr.clone()) {
                    Ok(())
                } else {
                    Err(mismatch(format!("cannot add type to {individual}")))
                }
            }
            Diff::RemoveType { individual, expr } => {
                if model.delete_type(individual, expr) {
                    Ok(())
                } else {
                    Err(mismatch(format!("type not asserted on {individual}")))
                }
            }
            Diff::AddAnnotation {
                target,
                annotation,
                index,
            } => {
                if model.insert_annotation(target, annotation.clone(), *index) {
                    Ok(())
                } else {
                    Err(mismatch(format!("cannot add annotation {}", annotation.key)))
                }
            }
            Diff::RemoveAnnotation {
                target,
                annotation,
                index,
            } => {
                if model.annotation_position(target, annotation) != Some(*index) {
                    return Err(mismatch(format!(
                        "annotation {} not at position {index}",
                        annotation.key
                    )));
                }
                model.delete_annotation(target, *index);
                Ok(())
            }
            Diff::SetImports { before, after } => {
                if model.imports() != before {
                    return Err(mismatch("imports changed concurrently".into()));
                }
                model.replace_imports(after.clone());
                Ok(())
            }
        }
    }
}

/// Apply diffs in order; on failure, revert the ones already applied and
/// return the error, leaving the model as it was.
pub fn apply_all(model: &mut GraphModel, diffs: &[Diff]) -> Result<(), ModelError> {
    for (applied, diff) in diffs.iter().enumerate() {
        if let Err(err) = diff.apply(model) {
            revert_all(model, &diffs[..applied]);
            return Err(err);
        }
    }
    Ok(())
}

/// Revert already-applied diffs, most recent first.
pub fn revert_all(model: &mut GraphModel, diffs: &[Diff]) {
    for diff in diffs.iter().rev() {
        if let Err(err) = diff.invert().apply(model) {
            tracing::error!(model = %model.id(), error = %err, "failed to revert change");
        }
    }
}

fn mismatch(message: String) -> ModelError {
    ModelError::InconsistentChange { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Iri {
        Iri::new(format!("http://example.org/{s}"))
    }

    fn seeded() -> GraphModel {
        let mut model = GraphModel::new(iri("m"));
        let a = Individual::new(iri("a"))
            .with_type(TypeExpr::class(iri("GO_1")))
            .with_annotation(Annotation::new("comment", "first"));
        model.insert_individual(a);
        model.insert_individual(Individual::new(iri("b")));
        model.insert_edge(Edge::new(iri("a"), iri("part_of"), iri("b")));
        model.insert_annotation(&AnnotationTarget::Model, Annotation::new("title", "t"), 0);
        model
    }

    fn roundtrip(diff: Diff) {
        let mut model = seeded();
        let before = model.clone();
        diff.apply(&mut model).unwrap();
        assert_ne!(model, before, "diff should change the model");
        diff.invert().apply(&mut model).unwrap();
        assert_eq!(model, before);
    }

    #[test]
    fn every_diff_kind_inverts() {
        let model = seeded();
        let a = model.individual(&iri("a")).unwrap().clone();
        let edges = model.incident_edges(&iri("a"));

        roundtrip(Diff::AddIndividual {
            individual: Individual::new(iri("c")),
            edges: vec![],
        });
        roundtrip(Diff::RemoveIndividual { individual: a, edges });
        roundtrip(Diff::AddEdge(Edge::new(iri("b"), iri("part_of"), iri("a"))));
        roundtrip(Diff::RemoveEdge(Edge::new(iri("a"), iri("part_of"), iri("b"))));
        roundtrip(Diff::AddType {
            individual: iri("b"),
            expr: TypeExpr::class(iri("GO_2")),
        });
        roundtrip(Diff::RemoveType {
            individual: iri("a"),
            expr: TypeExpr::class(iri("GO_1")),
        });
        roundtrip(Diff::AddAnnotation {
            target: AnnotationTarget::Individual(iri("b")),
            annotation: Annotation::new("comment", "x"),
            index: 0,
        });
        roundtrip(Diff::RemoveAnnotation {
            target: AnnotationTarget::Model,
            annotation: Annotation::new("title", "t"),
            index: 0,
        });
        roundtrip(Diff::SetImports {
            before: BTreeSet::new(),
            after: [iri("go-lego")].into_iter().collect(),
        });
    }

    #[test]
    fn stale_remove_is_rejected_without_change() {
        let mut model = seeded();
        let before = model.clone();
        let stale = Diff::RemoveIndividual {
            individual: Individual::new(iri("a")),
            edges: vec![],
        };
        assert!(stale.apply(&mut model).is_err());
        assert_eq!(model, before);
    }

    #[test]
    fn apply_all_reverts_on_failure() {
        let mut model = seeded();
        let before = model.clone();
        let diffs = vec![
            Diff::AddIndividual {
                individual: Individual::new(iri("c")),
                edges: vec![],
            },
            Diff::AddEdge(Edge::new(iri("c"), iri("p"), iri("missing"))),
        ];
        assert!(apply_all(&mut model, &diffs).is_err());
        assert_eq!(model, before);
    }
}
