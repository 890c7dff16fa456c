//! Structural classifier.
//!
//! Not a description-logic reasoner: it computes type closures from the
//! asserted expressions and the hierarchy, applies property domain/range,
//! propagates edges to super-properties and flags disjointness clashes.
//!
//! | expression            | contributes                                  |
//! |-----------------------|----------------------------------------------|
//! | class `C`             | ancestors of `C`                             |
//! | `A and B`             | union of the operand contributions           |
//! | `A or B`              | classes common to every operand              |
//! | `p some F`            | ancestors of the domain of `p` and its supers|

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InferenceError;
use crate::hierarchy::{HierarchyOracle, OWL_NOTHING};
use crate::iri::Iri;
use crate::model::{EdgeKey, TypeExpr};

use super::{Classification, ReasonerFactory, ReasonerInstance, ReasoningInput};

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralReasonerFactory;

impl ReasonerFactory for StructuralReasonerFactory {
    fn name(&self) -> &str {
        "structural"
    }

    fn create(&self, input: ReasoningInput) -> Result<Box<dyn ReasonerInstance>, InferenceError> {
        Ok(Box::new(StructuralReasoner {
            input: Some(input),
        }))
    }
}

pub struct StructuralReasoner {
    input: Option<ReasoningInput>,
}

impl StructuralReasoner {
    fn expression_closure(hierarchy: &dyn HierarchyOracle, expr: &TypeExpr) -> BTreeSet<Iri> {
        match expr {
            TypeExpr::Class { id } => hierarchy.ancestors(id),
            TypeExpr::Intersection { expressions } => expressions
                .iter()
                .flat_map(|e| Self::expression_closure(hierarchy, e))
                .collect(),
            TypeExpr::Union { expressions } => {
                let mut operands = expressions.iter().map(|e| Self::expression_closure(hierarchy, e));
                match operands.next() {
                    // an empty disjunction is unsatisfiable
                    None => BTreeSet::from([Iri::new(OWL_NOTHING)]),
                    Some(first) => operands.fold(first, |acc, next| acc.intersection(&next).cloned().collect()),
                }
            }
            TypeExpr::SomeValuesFrom { property, .. } => Self::domain_closure(hierarchy, property),
        }
    }

    fn domain_closure(hierarchy: &dyn HierarchyOracle, property: &Iri) -> BTreeSet<Iri> {
        hierarchy
            .property_ancestors(property)
            .iter()
            .filter_map(|p| hierarchy.property(p)?.domain)
            .flat_map(|d| hierarchy.ancestors(&d))
            .collect()
    }

    fn range_closure(hierarchy: &dyn HierarchyOracle, property: &Iri) -> BTreeSet<Iri> {
        hierarchy
            .property_ancestors(property)
            .iter()
            .filter_map(|p| hierarchy.property(p)?.range)
            .flat_map(|r| hierarchy.ancestors(&r))
            .collect()
    }

    fn clashes(hierarchy: &dyn HierarchyOracle, types: &BTreeSet<Iri>) -> bool {
        types.contains(&Iri::new(OWL_NOTHING))
            || types
                .iter()
                .any(|class| hierarchy.disjoint_with(class).iter().any(|other| types.contains(other)))
    }
}

impl ReasonerInstance for StructuralReasoner {
    fn classify(&mut self) -> Result<Classification, InferenceError> {
        let Some(input) = self.input.as_ref() else {
            return Err(InferenceError::Reasoning {
                model: String::new(),
                message: "reasoner already disposed".into(),
            });
        };
        let model = input.model.as_ref();
        let hierarchy = input.hierarchy.as_ref();

        let mut inferred: BTreeMap<Iri, BTreeSet<Iri>> = BTreeMap::new();
        for individual in model.individuals() {
            let types = inferred.entry(individual.id.clone()).or_default();
            for expr in &individual.types {
                types.extend(Self::expression_closure(hierarchy, expr));
            }
        }

        let mut relations = BTreeSet::new();
        for edge in model.edges() {
            let EdgeKey {
                subject,
                predicate,
                object,
            } = edge.key;
            let domain = Self::domain_closure(hierarchy, &predicate);
            let range = Self::range_closure(hierarchy, &predicate);
            inferred.entry(subject.clone()).or_default().extend(domain);
            inferred.entry(object.clone()).or_default().extend(range);
            for super_property in hierarchy.property_ancestors(&predicate) {
                let key = EdgeKey::new(subject.clone(), super_property, object.clone());
                if !model.contains_edge(&key) {
                    relations.insert(key);
                }
            }
        }

        let unsatisfiable: BTreeSet<Iri> = inferred
            .iter()
            .filter(|(_, types)| Self::clashes(hierarchy, types))
            .map(|(id, _)| id.clone())
            .collect();

        Ok(Classification {
            consistent: unsatisfiable.is_empty(),
            inferred_types: inferred,
            unsatisfiable,
            inferred_relations: relations.into_iter().collect(),
        })
    }

    fn dispose(mut self: Box<Self>) -> Result<(), InferenceError> {
        match self.input.take() {
            Some(_) => Ok(()),
            None => Err(InferenceError::Cleanup {
                resource: "structural reasoner".into(),
                message: "disposed twice".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hierarchy::{ClassHierarchy, PropertyInfo};
    use crate::model::{Edge, GraphModel, Individual};

    fn obo(local: &str) -> Iri {
        Iri::new(format!("http://purl.obolibrary.org/obo/{local}"))
    }

    fn hierarchy() -> ClassHierarchy {
        let mut h = ClassHierarchy::new();
        h.add_subclass(&obo("GO_0004672"), &obo("GO_0003674"));
        h.add_subclass(&obo("GO_0005634"), &obo("GO_0005575"));
        h.add_subclass(&obo("CHEBI_36080"), &obo("CHEBI_33695"));
        h.add_disjoint(&obo("GO_0003674"), &obo("GO_0005575"));
        let mut has_participant = PropertyInfo::new(obo("RO_0000057"));
        has_participant.domain = Some(obo("BFO_0000015"));
        h.add_property(has_participant);
        let mut enabled_by = PropertyInfo::new(obo("RO_0002333"));
        enabled_by.domain = Some(obo("GO_0003674"));
        enabled_by.range = Some(obo("CHEBI_33695"));
        enabled_by.parents = vec![obo("RO_0000057")];
        h.add_property(enabled_by);
        h
    }

    fn classify(model: GraphModel) -> Classification {
        let input = ReasoningInput {
            model: Arc::new(model),
            hierarchy: Arc::new(hierarchy()),
        };
        let mut reasoner = StructuralReasonerFactory.create(input).unwrap();
        let result = reasoner.classify().unwrap();
        reasoner.dispose().unwrap();
        result
    }

    #[test]
    fn edges_apply_domain_range_and_super_properties() {
        let mut model = GraphModel::new(obo("m"));
        model.insert_individual(Individual::new(obo("mf")));
        model.insert_individual(Individual::new(obo("gp")));
        model.insert_edge(Edge::new(obo("mf"), obo("RO_0002333"), obo("gp")));
        let result = classify(model);
        assert!(result.inferred_types[&obo("mf")].contains(&obo("GO_0003674")));
        assert!(result.inferred_types[&obo("mf")].contains(&obo("BFO_0000015")));
        assert!(result.inferred_types[&obo("gp")].contains(&obo("CHEBI_33695")));
        assert_eq!(
            result.inferred_relations,
            vec![EdgeKey::new(obo("mf"), obo("RO_0000057"), obo("gp"))]
        );
        assert!(result.consistent);
    }

    #[test]
    fn disjoint_types_make_model_inconsistent() {
        let mut model = GraphModel::new(obo("m"));
        model.insert_individual(
            Individual::new(obo("x"))
                .with_type(TypeExpr::class(obo("GO_0004672")))
                .with_type(TypeExpr::class(obo("GO_0005634"))),
        );
        let result = classify(model);
        assert!(!result.consistent);
        assert!(result.unsatisfiable.contains(&obo("x")));
    }

    #[test]
    fn union_keeps_only_common_ancestors() {
        let mut model = GraphModel::new(obo("m"));
        model.insert_individual(Individual::new(obo("x")).with_type(TypeExpr::Union {
            expressions: vec![
                TypeExpr::class(obo("CHEBI_36080")),
                TypeExpr::class(obo("CHEBI_33695")),
            ],
        }));
        let result = classify(model);
        assert_eq!(result.inferred_types[&obo("x")], BTreeSet::from([obo("CHEBI_33695")]));
    }

    #[test]
    fn dispose_twice_is_a_cleanup_error() {
        let mut reasoner = StructuralReasoner { input: None };
        assert!(reasoner.classify().is_err());
        assert!(matches!(
            Box::new(reasoner).dispose(),
            Err(InferenceError::Cleanup { .. })
        ));
    }
}
