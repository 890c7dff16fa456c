//! Batch protocol: requests, arguments and wire type expressions.
//!
//! A batch is a JSON array of `{entity, operation, arguments}` objects, all
//! addressed to one model. [`processor::BatchProcessor`] applies them and
//! [`response`] renders the envelope sent back.

pub mod processor;
pub mod response;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ProtocolError};
use crate::hierarchy::HierarchyOracle;
use crate::iri::CurieMap;
use crate::model::{Annotation, TypeExpr};

pub use processor::{BatchOutcome, BatchProcessor, ModelSnapshot, ModelState, OpStatus, OperationOutcome};
pub use response::{BatchResponse, MessageType, ResponseData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Individual,
    Edge,
    Model,
    Meta,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Individual => "individual",
            Entity::Edge => "edge",
            Entity::Model => "model",
            Entity::Meta => "meta",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Get,
    AddType,
    RemoveType,
    Add,
    Remove,
    AddAnnotation,
    RemoveAnnotation,
    Export,
    Import,
    Store,
    UpdateImports,
    Undo,
    Redo,
    GetUndoRedo,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Get => "get",
            Operation::AddType => "add-type",
            Operation::RemoveType => "remove-type",
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::AddAnnotation => "add-annotation",
            Operation::RemoveAnnotation => "remove-annotation",
            Operation::Export => "export",
            Operation::Import => "import",
            Operation::Store => "store",
            Operation::UpdateImports => "update-imports",
            Operation::Undo => "undo",
            Operation::Redo => "redo",
            Operation::GetUndoRedo => "get-undo-redo",
        })
    }
}

/// Argument bundle. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_iri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_to_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<WireExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<WireAnnotation>,
}

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub entity: Entity,
    pub operation: Operation,
    #[serde(default)]
    pub arguments: Arguments,
}

impl Request {
    pub fn new(entity: Entity, operation: Operation, arguments: Arguments) -> Self {
        Self {
            entity,
            operation,
            arguments,
        }
    }

    /// Whether the operation changes server state and so needs privileges.
    pub fn is_mutating(&self) -> bool {
        use Operation::*;
        match self.entity {
            Entity::Meta => false,
            Entity::Individual | Entity::Edge => !matches!(self.operation, Get),
            Entity::Model => !matches!(self.operation, Get | Export | GetUndoRedo),
        }
    }

    pub fn is_meta(&self) -> bool {
        self.entity == Entity::Meta
    }

    /// `model add` and `model import` create a fresh model.
    pub fn creates_model(&self) -> bool {
        self.entity == Entity::Model && matches!(self.operation, Operation::Add | Operation::Import)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.entity, self.operation)
    }
}

/// Parse the `requests` parameter.
pub fn parse_requests(json: &str) -> Result<Vec<Request>, ProtocolError> {
    let requests: Vec<Request> = serde_json::from_str(json).map_err(|e| ProtocolError::InvalidRequests {
        message: e.to_string(),
    })?;
    if requests.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    Ok(requests)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProperty {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Class expression as exchanged with clients. Ids are CURIEs or IRIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireExpr {
    Class {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Svf {
        property: WireProperty,
        filler: Box<WireExpr>,
    },
    Intersection {
        expressions: Vec<WireExpr>,
    },
    Union {
        expressions: Vec<WireExpr>,
    },
}

impl WireExpr {
    pub fn class(id: impl Into<String>) -> Self {
        WireExpr::Class {
            id: id.into(),
            label: None,
        }
    }

    pub fn to_type_expr(&self, curies: &CurieMap) -> Result<TypeExpr, ModelError> {
        Ok(match self {
            WireExpr::Class { id, .. } => TypeExpr::class(curies.expand(id)?),
            WireExpr::Svf { property, filler } => TypeExpr::SomeValuesFrom {
                property: curies.expand(&property.id)?,
                filler: Box::new(filler.to_type_expr(curies)?),
            },
            WireExpr::Intersection { expressions } => TypeExpr::Intersection {
                expressions: expressions
                    .iter()
                    .map(|e| e.to_type_expr(curies))
                    .collect::<Result<_, _>>()?,
            },
            WireExpr::Union { expressions } => TypeExpr::Union {
                expressions: expressions
                    .iter()
                    .map(|e| e.to_type_expr(curies))
                    .collect::<Result<_, _>>()?,
            },
        })
    }

    /// Render for output with compacted ids and hierarchy labels.
    pub fn from_type_expr(expr: &TypeExpr, curies: &CurieMap, hierarchy: &dyn HierarchyOracle) -> Self {
        match expr {
            TypeExpr::Class { id } => WireExpr::Class {
                id: curies.compact(id),
                label: hierarchy.label(id),
            },
            TypeExpr::SomeValuesFrom { property, filler } => WireExpr::Svf {
                property: WireProperty {
                    id: curies.compact(property),
                    label: hierarchy.label(property),
                },
                filler: Box::new(Self::from_type_expr(filler, curies, hierarchy)),
            },
            TypeExpr::Intersection { expressions } => WireExpr::Intersection {
                expressions: expressions
                    .iter()
                    .map(|e| Self::from_type_expr(e, curies, hierarchy))
                    .collect(),
            },
            TypeExpr::Union { expressions } => WireExpr::Union {
                expressions: expressions
                    .iter()
                    .map(|e| Self::from_type_expr(e, curies, hierarchy))
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAnnotation {
    pub key: String,
    pub value: String,
}

impl WireAnnotation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn to_annotation(&self, user: Option<&str>) -> Annotation {
        let annotation = Annotation::new(self.key.clone(), self.value.clone());
        match user {
            Some(user) => annotation.with_provenance(user),
            None => annotation,
        }
    }

    pub fn from_annotation(annotation: &Annotation) -> Self {
        Self::new(annotation.key.clone(), annotation.value.clone())
    }
}

/// How a batch reacts to a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report each outcome; keep what succeeded.
    #[default]
    BestEffort,
    /// Roll the whole batch back on the first failure.
    AllOrNothing,
}

/// What removing an individual does to its incident edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    #[default]
    Cascade,
    Reject,
}

/// How the client should refresh its view after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Merge,
    Rebuild,
    Meta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_kebab_case_wire_format() {
        let requests = parse_requests(
            r#"[
                {"entity": "individual", "operation": "add",
                 "arguments": {"model-id": "gomodel:1", "assign-to-variable": "mf",
                               "expressions": [{"type": "class", "id": "GO:0003674"}]}},
                {"entity": "edge", "operation": "add",
                 "arguments": {"subject": "mf", "object": "gp", "predicate": "RO:0002333"}},
                {"entity": "model", "operation": "get-undo-redo", "arguments": {}},
                {"entity": "meta", "operation": "get"}
            ]"#,
        )
        .unwrap();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].arguments.assign_to_variable.as_deref(), Some("mf"));
        assert_eq!(requests[0].arguments.expressions, vec![WireExpr::class("GO:0003674")]);
        assert!(requests[1].is_mutating());
        assert!(!requests[2].is_mutating());
        assert!(requests[3].is_meta());
    }

    #[test]
    fn empty_and_malformed_batches_are_rejected() {
        assert!(matches!(parse_requests("[]"), Err(ProtocolError::EmptyBatch)));
        assert!(matches!(
            parse_requests(r#"[{"entity": "widget", "operation": "get"}]"#),
            Err(ProtocolError::InvalidRequests { .. })
        ));
    }

    #[test]
    fn svf_expression_expands_ids() {
        let wire: WireExpr = serde_json::from_str(
            r#"{"type": "svf", "property": {"id": "RO:0002333"}, "filler": {"type": "class", "id": "UniProtKB:P1"}}"#,
        )
        .unwrap();
        let expr = wire.to_type_expr(&CurieMap::default()).unwrap();
        match expr {
            TypeExpr::SomeValuesFrom { property, filler } => {
                assert_eq!(property.as_str(), "http://purl.obolibrary.org/obo/RO_0002333");
                assert_eq!(
                    filler.named_class().map(|i| i.as_str()),
                    Some("http://identifiers.org/uniprot/P1")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
