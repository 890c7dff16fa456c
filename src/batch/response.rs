//! Response envelope and rendering of model data.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CausewayError;
use crate::hierarchy::{HierarchyOracle, OWL_THING, PropertyKind};
use crate::infer::InferenceResult;
use crate::iri::{CurieMap, Iri};
use crate::model::{ChangeSetSummary, Edge};

use super::processor::{BatchOutcome, ModelSnapshot, OperationOutcome};
use super::{Signal, WireAnnotation, WireExpr};

/// Root of the evidence hierarchy listed in meta responses.
pub const EVIDENCE_ROOT: &str = "ECO:0000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Success,
    Error,
}

/// The envelope returned for every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchResponse {
    pub packet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intention: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    pub message_type: MessageType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl BatchResponse {
    pub fn new(uid: Option<String>, intention: Option<String>, packet_id: String) -> Self {
        Self {
            packet_id,
            uid,
            intention,
            signal: None,
            message_type: MessageType::Success,
            message: "success".into(),
            commentary: None,
            data: None,
        }
    }

    /// Turn this envelope into an error report.
    pub fn fail(mut self, err: &CausewayError) -> Self {
        self.message_type = MessageType::Error;
        self.message = err.to_string();
        self.commentary = err.code_string();
        self
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }

    pub fn add_commentary(&mut self, line: impl AsRef<str>) {
        match &mut self.commentary {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(line.as_ref());
            }
            None => self.commentary = Some(line.as_ref().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inconsistent_p: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_p: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<WireAnnotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<WireFact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub individuals: Vec<WireIndividual>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<WireRelation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<Vec<ChangeSetSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redo: Option<Vec<ChangeSetSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<OperationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WireFact {
    pub subject: String,
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_label: Option<String>,
    pub object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WireIndividual {
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<WireExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inferred_type: Vec<WireExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WireRelation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvidence {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelReadOnly {
    pub modified_p: bool,
    pub version: u64,
    pub individuals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetaResponse {
    pub relations: Vec<WireRelation>,
    pub data_properties: Vec<WireRelation>,
    pub evidence: Vec<WireEvidence>,
    pub models_meta: BTreeMap<String, Vec<WireAnnotation>>,
    pub models_meta_read_only: BTreeMap<String, ModelReadOnly>,
}

/// Renders snapshots with compact ids and hierarchy labels.
pub struct Renderer<'a> {
    curies: &'a CurieMap,
    hierarchy: &'a dyn HierarchyOracle,
}

impl<'a> Renderer<'a> {
    pub fn new(curies: &'a CurieMap, hierarchy: &'a dyn HierarchyOracle) -> Self {
        Self { curies, hierarchy }
    }

    /// Model data for a batch response. A `merge` renders only the touched
    /// individuals and their edges; anything else renders the whole model.
    pub fn model_data(
        &self,
        snapshot: &ModelSnapshot,
        inference: Option<&InferenceResult>,
        outcome: &BatchOutcome,
    ) -> ResponseData {
        let model = snapshot.model.as_ref();
        let partial = outcome.signal == Signal::Merge;
        let wanted = |id: &Iri| !partial || outcome.touched.contains(id);

        let individuals = model
            .individuals()
            .filter(|i| wanted(&i.id))
            .map(|individual| WireIndividual {
                id: self.curies.compact(&individual.id),
                types: individual
                    .types
                    .iter()
                    .map(|t| WireExpr::from_type_expr(t, self.curies, self.hierarchy))
                    .collect(),
                inferred_type: inference
                    .and_then(|inf| inf.inferred_types(&individual.id))
                    .map(|types| self.classes(types))
                    .unwrap_or_default(),
                annotations: individual.annotations.iter().map(WireAnnotation::from_annotation).collect(),
            })
            .collect();

        let facts: Vec<WireFact> = model
            .edges()
            .filter(|e| wanted(&e.key.subject) || wanted(&e.key.object))
            .map(|e| self.fact(&e))
            .collect();

        let used: BTreeSet<Iri> = model.edges().map(|e| e.key.predicate).collect();
        let properties = used.iter().map(|p| self.relation(p)).collect();

        ResponseData {
            id: Some(model.id().to_string()),
            inconsistent_p: inference.map(|inf| !inf.is_consistent()),
            modified_p: Some(snapshot.modified),
            annotations: model.annotations().iter().map(WireAnnotation::from_annotation).collect(),
            facts,
            individuals,
            properties,
            undo: Some(snapshot.undo.clone()),
            redo: Some(snapshot.redo.clone()),
            export_model: outcome.export.clone(),
            meta: None,
            outcomes: outcome.outcomes.clone(),
        }
    }

    /// Hierarchy-wide and per-model metadata.
    pub fn meta(&self, models: &[ModelSnapshot]) -> MetaResponse {
        let mut relations = Vec::new();
        let mut data_properties = Vec::new();
        for property in self.hierarchy.properties() {
            let rendered = self.relation(&property.id);
            match property.kind {
                PropertyKind::Object => relations.push(rendered),
                PropertyKind::Data => data_properties.push(rendered),
            }
        }
        let evidence = match self.curies.expand(EVIDENCE_ROOT) {
            Ok(root) if self.hierarchy.contains_class(&root) => self
                .hierarchy
                .descendants(&root)
                .iter()
                .map(|id| WireEvidence {
                    id: self.curies.compact(id),
                    label: self.hierarchy.label(id),
                })
                .collect(),
            _ => Vec::new(),
        };
        let mut models_meta = BTreeMap::new();
        let mut models_meta_read_only = BTreeMap::new();
        for snapshot in models {
            let id = snapshot.model.id().to_string();
            models_meta.insert(
                id.clone(),
                snapshot
                    .model
                    .annotations()
                    .iter()
                    .map(WireAnnotation::from_annotation)
                    .collect(),
            );
            models_meta_read_only.insert(
                id,
                ModelReadOnly {
                    modified_p: snapshot.modified,
                    version: snapshot.version,
                    individuals: snapshot.model.individual_count(),
                },
            );
        }
        MetaResponse {
            relations,
            data_properties,
            evidence,
            models_meta,
            models_meta_read_only,
        }
    }

    fn classes(&self, types: &BTreeSet<Iri>) -> Vec<WireExpr> {
        types
            .iter()
            .filter(|c| c.as_str() != OWL_THING)
            .map(|c| WireExpr::Class {
                id: self.curies.compact(c),
                label: self.hierarchy.label(c),
            })
            .collect()
    }

    fn fact(&self, edge: &Edge) -> WireFact {
        WireFact {
            subject: self.curies.compact(&edge.key.subject),
            property: self.curies.compact(&edge.key.predicate),
            property_label: self.hierarchy.label(&edge.key.predicate),
            object: self.curies.compact(&edge.key.object),
            annotations: edge.annotations.iter().map(WireAnnotation::from_annotation).collect(),
        }
    }

    fn relation(&self, id: &Iri) -> WireRelation {
        let info = self.hierarchy.property(id);
        WireRelation {
            id: self.curies.compact(id),
            label: self.hierarchy.label(id),
            domain: info.as_ref().and_then(|i| i.domain.as_ref()).map(|d| self.curies.compact(d)),
            range: info.as_ref().and_then(|i| i.range.as_ref()).map(|r| self.curies.compact(r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn envelope_uses_kebab_case_keys() {
        let mut response = BatchResponse::new(Some("alice".into()), Some("action".into()), "p1".into());
        response.signal = Some(Signal::Merge);
        response.data = Some(ResponseData {
            inconsistent_p: Some(false),
            ..ResponseData::default()
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["packet-id"], "p1");
        assert_eq!(json["message-type"], "success");
        assert_eq!(json["signal"], "merge");
        assert_eq!(json["data"]["inconsistent-p"], false);
        assert!(json["data"].get("facts").is_none());
    }

    #[test]
    fn failure_carries_message_and_code() {
        let err: CausewayError = ProtocolError::MissingUid.into();
        let response = BatchResponse::new(None, None, "p2".into()).fail(&err);
        assert!(response.is_error());
        assert_eq!(response.commentary.as_deref(), Some("causeway::protocol::missing_uid"));
    }
}
