//! Undo/redo history of a model.
//!
//! The [`CommandLog`] keeps two stacks of [`ChangeSet`]s. A change set groups
//! the diffs that one batch applied, so a single `undo` reverts a whole batch.
//! History lives in process memory for the lifetime of the model.

use serde::{Deserialize, Serialize};

use crate::error::{CausewayResult, HistoryError};

use super::diff::{self, Diff};
use super::GraphModel;

/// Default number of change sets kept on the undo stack.
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// The diffs applied by one batch.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub id: u64,
    pub diffs: Vec<Diff>,
    /// Seconds since UNIX epoch.
    pub timestamp: u64,
    pub user: Option<String>,
}

impl ChangeSet {
    fn summary(&self) -> ChangeSetSummary {
        ChangeSetSummary {
            id: self.id,
            changes: self.diffs.len(),
            timestamp: self.timestamp,
            user: self.user.clone(),
        }
    }

    /// Inverse diffs in application order (last change reverted first).
    fn inverse(&self) -> Vec<Diff> {
        self.diffs.iter().rev().map(Diff::invert).collect()
    }
}

/// Client-facing description of a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetSummary {
    pub id: u64,
    pub changes: usize,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Undo and redo stacks for one model.
#[derive(Debug, Clone)]
pub struct CommandLog {
    undo: Vec<ChangeSet>,
    redo: Vec<ChangeSet>,
    next_id: u64,
    limit: usize,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Keep at most `limit` change sets on the undo stack; older ones are dropped.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            next_id: 1,
            limit: limit.max(1),
        }
    }

    /// Record already-applied diffs. Empty change sets are ignored.
    ///
    /// Clears the redo stack. Returns the id of the new entry.
    pub fn record(&mut self, diffs: Vec<Diff>, user: Option<String>) -> Option<u64> {
        if diffs.is_empty() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.undo.push(ChangeSet {
            id,
            diffs,
            timestamp: now_secs(),
            user,
        });
        if self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
        self.redo.clear();
        Some(id)
    }

    /// Revert the most recent change set.
    pub fn undo(&mut self, model: &mut GraphModel) -> CausewayResult<ChangeSetSummary> {
        let Some(entry) = self.undo.pop() else {
            return Err(HistoryError::EmptyHistory {
                action: "undo".into(),
            }
            .into());
        };
        if let Err(err) = diff::apply_all(model, &entry.inverse()) {
            self.undo.push(entry);
            return Err(err.into());
        }
        let summary = entry.summary();
        self.redo.push(entry);
        Ok(summary)
    }

    /// Reapply the most recently undone change set.
    pub fn redo(&mut self, model: &mut GraphModel) -> CausewayResult<ChangeSetSummary> {
        let Some(entry) = self.redo.pop() else {
            return Err(HistoryError::EmptyHistory {
                action: "redo".into(),
            }
            .into());
        };
        if let Err(err) = diff::apply_all(model, &entry.diffs) {
            self.redo.push(entry);
            return Err(err.into());
        }
        let summary = entry.summary();
        self.undo.push(entry);
        Ok(summary)
    }

    /// Available undo entries, most recent first.
    pub fn undo_summaries(&self) -> Vec<ChangeSetSummary> {
        self.undo.iter().rev().map(ChangeSet::summary).collect()
    }

    /// Available redo entries, most recent first.
    pub fn redo_summaries(&self) -> Vec<ChangeSetSummary> {
        self.redo.iter().rev().map(ChangeSet::summary).collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CausewayError;
    use crate::iri::Iri;
    use crate::model::{Edge, Individual, TypeExpr};

    fn iri(s: &str) -> Iri {
        Iri::new(format!("http://example.org/{s}"))
    }

    fn apply(model: &mut GraphModel, log: &mut CommandLog, diffs: Vec<Diff>) {
        diff::apply_all(model, &diffs).unwrap();
        log.record(diffs, None);
    }

    #[test]
    fn undo_on_fresh_log_is_empty_history() {
        let mut model = GraphModel::new(iri("m"));
        let before = model.clone();
        let mut log = CommandLog::new();
        let err = log.undo(&mut model).unwrap_err();
        assert!(matches!(err, CausewayError::History(HistoryError::EmptyHistory { .. })));
        assert!(log.redo(&mut model).is_err());
        assert_eq!(model, before);
    }

    #[test]
    fn undo_then_redo_restores_state() {
        let mut model = GraphModel::new(iri("m"));
        let mut log = CommandLog::new();
        apply(
            &mut model,
            &mut log,
            vec![
                Diff::AddIndividual {
                    individual: Individual::new(iri("a")),
                    edges: vec![],
                },
                Diff::AddIndividual {
                    individual: Individual::new(iri("b")),
                    edges: vec![],
                },
                Diff::AddEdge(Edge::new(iri("a"), iri("p"), iri("b"))),
            ],
        );
        let empty = GraphModel::new(iri("m"));
        let full = model.clone();

        log.undo(&mut model).unwrap();
        assert_eq!(model, empty);
        log.redo(&mut model).unwrap();
        assert_eq!(model, full);
        assert!(log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn new_change_clears_redo() {
        let mut model = GraphModel::new(iri("m"));
        let mut log = CommandLog::new();
        apply(
            &mut model,
            &mut log,
            vec![Diff::AddIndividual {
                individual: Individual::new(iri("a")),
                edges: vec![],
            }],
        );
        log.undo(&mut model).unwrap();
        assert!(log.can_redo());
        apply(
            &mut model,
            &mut log,
            vec![Diff::AddIndividual {
                individual: Individual::new(iri("b")),
                edges: vec![],
            }],
        );
        assert!(!log.can_redo());
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let mut model = GraphModel::new(iri("m"));
        model.insert_individual(Individual::new(iri("a")));
        let mut log = CommandLog::with_limit(2);
        for n in 0..3 {
            apply(
                &mut model,
                &mut log,
                vec![Diff::AddType {
                    individual: iri("a"),
                    expr: TypeExpr::class(iri(&format!("C{n}"))),
                }],
            );
        }
        let undo = log.undo_summaries();
        assert_eq!(undo.len(), 2);
        assert_eq!(undo[0].id, 3);
        assert!(log.record(Vec::new(), None).is_none());
    }
}
