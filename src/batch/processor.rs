//! Applies a batch of requests to one model.
//!
//! The caller holds the model's write lock for the whole of
//! [`BatchProcessor::apply`]. Every change is expressed as a [`Diff`], applied
//! immediately and collected into the batch's pending change set, which is
//! recorded in the [`CommandLog`] as one undo step when the batch ends (or
//! earlier, right before an `undo`/`redo` in the same batch).
//!
//! Read-only batches go through [`BatchProcessor::query`] against a published
//! [`ModelSnapshot`] and never touch the write lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CausewayError, CausewayResult, ModelError};
use crate::hierarchy::HierarchyOracle;
use crate::iri::{CurieMap, Iri};
use crate::model::diff::{self, AnnotationTarget};
use crate::model::export::{self, ModelFormat};
use crate::model::history::{ChangeSetSummary, DEFAULT_HISTORY_LIMIT};
use crate::model::{CommandLog, Diff, Edge, EdgeKey, GraphModel, Individual, TypeExpr};

use super::{Entity, FailurePolicy, Operation, RemovalPolicy, Request, Signal, WireAnnotation};

/// Writer-side state of a model: the graph and its history.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub model: GraphModel,
    pub history: CommandLog,
    /// Bumped by every committed change set, undo and redo.
    pub version: u64,
    /// Changed since the last `store`.
    pub modified: bool,
    next_individual: u64,
}

impl ModelState {
    pub fn new(model: GraphModel) -> Self {
        Self::with_history_limit(model, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(model: GraphModel, limit: usize) -> Self {
        Self {
            model,
            history: CommandLog::with_limit(limit),
            version: 0,
            modified: false,
            next_individual: 1,
        }
    }

    /// Immutable copy for readers.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            version: self.version,
            model: Arc::new(self.model.clone()),
            undo: self.history.undo_summaries(),
            redo: self.history.redo_summaries(),
            modified: self.modified,
        }
    }

    fn fresh_individual_id(&mut self) -> Iri {
        loop {
            let candidate = Iri::new(format!("{}/i{}", self.model.id(), self.next_individual));
            self.next_individual += 1;
            if !self.model.contains_individual(&candidate) {
                return candidate;
            }
        }
    }
}

/// Published, read-only view of a model version.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub version: u64,
    pub model: Arc<GraphModel>,
    pub undo: Vec<ChangeSetSummary>,
    pub redo: Vec<ChangeSetSummary>,
    pub modified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpStatus {
    Ok,
    Failed,
    /// Not attempted because an earlier operation failed under all-or-nothing.
    Skipped,
    /// Succeeded, then undone because a later operation failed under all-or-nothing.
    RolledBack,
}

/// Result of one request of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub index: usize,
    pub request: String,
    pub status: OpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationOutcome {
    fn new(index: usize, request: &Request, status: OpStatus) -> Self {
        Self {
            index,
            request: request.label(),
            status,
            code: None,
            message: None,
        }
    }

    fn failed(index: usize, request: &Request, err: &CausewayError) -> Self {
        Self {
            code: err.code_string(),
            message: Some(err.to_string()),
            ..Self::new(index, request, OpStatus::Failed)
        }
    }
}

/// Everything the registry needs after a batch ran.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub outcomes: Vec<OperationOutcome>,
    pub signal: Signal,
    /// Individuals whose rendering may have changed or that were asked for.
    pub touched: BTreeSet<Iri>,
    pub export: Option<String>,
    pub store_requested: bool,
    pub remove_requested: bool,
    /// Whether model state changed (a change set was committed, or undo/redo ran).
    pub changed: bool,
    pub variables: BTreeMap<String, Iri>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == OpStatus::Ok)
    }

    pub fn first_failure(&self) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.status == OpStatus::Failed)
    }
}

#[derive(Default)]
struct Context {
    variables: BTreeMap<String, Iri>,
    pending: Vec<Diff>,
    structural: bool,
    changed: bool,
    touched: BTreeSet<Iri>,
    export: Option<String>,
    store: bool,
    remove: bool,
}

/// Applies batches. Shared by all models; holds no per-model state.
pub struct BatchProcessor {
    curies: CurieMap,
    hierarchy: Arc<dyn HierarchyOracle>,
    failure_policy: FailurePolicy,
    removal_policy: RemovalPolicy,
    default_imports: BTreeSet<Iri>,
}

impl BatchProcessor {
    pub fn new(curies: CurieMap, hierarchy: Arc<dyn HierarchyOracle>) -> Self {
        Self {
            curies,
            hierarchy,
            failure_policy: FailurePolicy::default(),
            removal_policy: RemovalPolicy::default(),
            default_imports: BTreeSet::new(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_default_imports(mut self, imports: BTreeSet<Iri>) -> Self {
        self.default_imports = imports;
        self
    }

    pub fn curies(&self) -> &CurieMap {
        &self.curies
    }

    pub fn hierarchy(&self) -> &Arc<dyn HierarchyOracle> {
        &self.hierarchy
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Apply a batch under the model's write lock.
    ///
    /// `model add` / `model import` are only accepted as the first request:
    /// the registry has already created the model by the time this runs.
    pub fn apply(&self, state: &mut ModelState, requests: &[Request], user: Option<&str>) -> BatchOutcome {
        let checkpoint = (self.failure_policy == FailurePolicy::AllOrNothing).then(|| state.clone());
        let mut ctx = Context::default();
        let mut outcomes = Vec::with_capacity(requests.len());
        let mut aborted = false;

        for (index, request) in requests.iter().enumerate() {
            if aborted {
                outcomes.push(OperationOutcome::new(index, request, OpStatus::Skipped));
                continue;
            }
            let start = ctx.pending.len();
            match self.apply_one(state, &mut ctx, index, request, user) {
                Ok(()) => outcomes.push(OperationOutcome::new(index, request, OpStatus::Ok)),
                Err(err) => {
                    // a failed request leaves none of its own diffs behind
                    discard_since(state, &mut ctx, start);
                    tracing::debug!(
                        model = %state.model.id(),
                        index,
                        request = %request.label(),
                        error = %err,
                        "operation failed"
                    );
                    outcomes.push(OperationOutcome::failed(index, request, &err));
                    if let Some(checkpoint) = &checkpoint {
                        *state = checkpoint.clone();
                        for earlier in outcomes.iter_mut().filter(|o| o.status == OpStatus::Ok) {
                            earlier.status = OpStatus::RolledBack;
                        }
                        ctx = Context::default();
                        aborted = true;
                    }
                }
            }
        }

        self.commit(state, &mut ctx, user);

        let signal = if requests.iter().all(|r| r.is_meta() || r.operation == Operation::GetUndoRedo) {
            Signal::Meta
        } else if ctx.structural {
            Signal::Rebuild
        } else {
            Signal::Merge
        };
        tracing::debug!(
            model = %state.model.id(),
            version = state.version,
            requests = requests.len(),
            ?signal,
            "applied batch"
        );
        BatchOutcome {
            outcomes,
            signal,
            touched: ctx.touched,
            export: ctx.export,
            store_requested: ctx.store,
            remove_requested: ctx.remove,
            changed: ctx.changed,
            variables: ctx.variables,
        }
    }

    /// Answer a read-only batch from a snapshot.
    pub fn query(&self, snapshot: &ModelSnapshot, requests: &[Request]) -> BatchOutcome {
        let model = snapshot.model.as_ref();
        let mut ctx = Context::default();
        let mut outcomes = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let result: CausewayResult<()> = match (request.entity, request.operation) {
                (Entity::Meta, Operation::Get) => Ok(()),
                (Entity::Model, Operation::GetUndoRedo) => Ok(()),
                (Entity::Model, Operation::Get) => {
                    ctx.structural = true;
                    Ok(())
                }
                (Entity::Model, Operation::Export) => self.export(model, request, &mut ctx),
                (Entity::Individual, Operation::Get) => self
                    .existing_individual(model, &ctx, request, "individual")
                    .map(|id| {
                        ctx.touched.insert(id);
                    })
                    .map_err(Into::into),
                _ => Err(unsupported(request).into()),
            };
            outcomes.push(match result {
                Ok(()) => OperationOutcome::new(index, request, OpStatus::Ok),
                Err(err) => OperationOutcome::failed(index, request, &err),
            });
        }
        let signal = if requests.iter().all(|r| r.is_meta() || r.operation == Operation::GetUndoRedo) {
            Signal::Meta
        } else if ctx.structural {
            Signal::Rebuild
        } else {
            Signal::Merge
        };
        BatchOutcome {
            outcomes,
            signal,
            touched: ctx.touched,
            export: ctx.export,
            store_requested: false,
            remove_requested: false,
            changed: false,
            variables: BTreeMap::new(),
        }
    }

    /// Outcome of a batch made only of `meta` requests; no model involved.
    pub fn meta(&self, requests: &[Request]) -> BatchOutcome {
        let outcomes = requests
            .iter()
            .enumerate()
            .map(|(index, request)| match request.operation {
                Operation::Get if request.is_meta() => OperationOutcome::new(index, request, OpStatus::Ok),
                _ => OperationOutcome::failed(index, request, &unsupported(request).into()),
            })
            .collect();
        BatchOutcome {
            outcomes,
            signal: Signal::Meta,
            touched: BTreeSet::new(),
            export: None,
            store_requested: false,
            remove_requested: false,
            changed: false,
            variables: BTreeMap::new(),
        }
    }

    /// Record the pending change set as one history entry.
    fn commit(&self, state: &mut ModelState, ctx: &mut Context, user: Option<&str>) {
        if ctx.pending.is_empty() {
            return;
        }
        let diffs = std::mem::take(&mut ctx.pending);
        if let Some(id) = state.history.record(diffs, user.map(str::to_string)) {
            state.version += 1;
            state.modified = true;
            ctx.changed = true;
            tracing::debug!(model = %state.model.id(), change_set = id, version = state.version, "committed change set");
        }
    }

    fn apply_diff(&self, state: &mut ModelState, ctx: &mut Context, diff: Diff) -> CausewayResult<()> {
        diff.apply(&mut state.model)?;
        if !diff.is_additive() {
            ctx.structural = true;
        }
        ctx.touched.extend(diff.touched());
        ctx.pending.push(diff);
        Ok(())
    }

    fn apply_one(
        &self,
        state: &mut ModelState,
        ctx: &mut Context,
        index: usize,
        request: &Request,
        user: Option<&str>,
    ) -> CausewayResult<()> {
        match request.entity {
            Entity::Individual => self.individual_op(state, ctx, request, user),
            Entity::Edge => self.edge_op(state, ctx, request, user),
            Entity::Model => self.model_op(state, ctx, index, request, user),
            Entity::Meta => match request.operation {
                Operation::Get => Ok(()),
                _ => Err(unsupported(request).into()),
            },
        }
    }

    // -----------------------------------------------------------------------
    // individual
    // -----------------------------------------------------------------------

    fn individual_op(
        &self,
        state: &mut ModelState,
        ctx: &mut Context,
        request: &Request,
        user: Option<&str>,
    ) -> CausewayResult<()> {
        let args = &request.arguments;
        match request.operation {
            Operation::Get => {
                let id = self.existing_individual(&state.model, ctx, request, "individual")?;
                ctx.touched.insert(id);
                Ok(())
            }
            Operation::Add => {
                let id = match &args.individual_iri {
                    Some(raw) => {
                        let id = self.curies.expand(raw)?;
                        if state.model.contains_individual(&id) {
                            return Err(ModelError::DuplicateIndividual { id: id.to_string() }.into());
                        }
                        id
                    }
                    None => state.fresh_individual_id(),
                };
                let mut individual = Individual::new(id.clone());
                for expr in &args.expressions {
                    individual.types.insert(expr.to_type_expr(&self.curies)?);
                }
                for value in &args.values {
                    individual = individual.with_annotation(value.to_annotation(user));
                }
                self.apply_diff(
                    state,
                    ctx,
                    Diff::AddIndividual {
                        individual,
                        edges: Vec::new(),
                    },
                )?;
                if let Some(name) = &args.assign_to_variable {
                    ctx.variables.insert(name.clone(), id);
                }
                Ok(())
            }
            Operation::Remove => {
                let id = self.existing_individual(&state.model, ctx, request, "individual")?;
                let edges = state.model.incident_edges(&id);
                if self.removal_policy == RemovalPolicy::Reject && !edges.is_empty() {
                    return Err(ModelError::ReferentialIntegrity {
                        id: id.to_string(),
                        edges: edges.len(),
                    }
                    .into());
                }
                let individual = state
                    .model
                    .individual(&id)
                    .cloned()
                    .ok_or_else(|| unknown("individual", &id))?;
                self.apply_diff(state, ctx, Diff::RemoveIndividual { individual, edges })
            }
            Operation::AddType | Operation::RemoveType => {
                let id = self.existing_individual(&state.model, ctx, request, "individual")?;
                let exprs = self.expressions(request)?;
                for expr in exprs {
                    let present = state
                        .model
                        .individual(&id)
                        .is_some_and(|i| i.types.contains(&expr));
                    let diff = match (request.operation, present) {
                        (Operation::AddType, true) => continue,
                        (Operation::AddType, false) => Diff::AddType {
                            individual: id.clone(),
                            expr,
                        },
                        (_, true) => Diff::RemoveType {
                            individual: id.clone(),
                            expr,
                        },
                        (_, false) => {
                            return Err(ModelError::UnknownIdentifier {
                                role: "type".into(),
                                id: describe(&expr),
                            }
                            .into());
                        }
                    };
                    self.apply_diff(state, ctx, diff)?;
                }
                Ok(())
            }
            Operation::AddAnnotation | Operation::RemoveAnnotation => {
                let id = self.existing_individual(&state.model, ctx, request, "individual")?;
                self.annotation_op(state, ctx, request, AnnotationTarget::Individual(id), user)
            }
            _ => Err(unsupported(request).into()),
        }
    }

    // -----------------------------------------------------------------------
    // edge
    // -----------------------------------------------------------------------

    fn edge_op(&self, state: &mut ModelState, ctx: &mut Context, request: &Request, user: Option<&str>) -> CausewayResult<()> {
        let key = self.edge_key(&state.model, ctx, request)?;
        match request.operation {
            Operation::Add => {
                if state.model.contains_edge(&key) {
                    return Ok(());
                }
                let mut edge = Edge::new(key.subject, key.predicate, key.object);
                for value in &request.arguments.values {
                    let annotation = value.to_annotation(user);
                    if !edge.annotations.iter().any(|a| a.key == annotation.key && a.value == annotation.value) {
                        edge.annotations.push(annotation);
                    }
                }
                self.apply_diff(state, ctx, Diff::AddEdge(edge))
            }
            Operation::Remove => {
                let edge = state
                    .model
                    .edge(&key)
                    .ok_or_else(|| unknown_edge(&key))?;
                self.apply_diff(state, ctx, Diff::RemoveEdge(edge))
            }
            Operation::AddAnnotation | Operation::RemoveAnnotation => {
                if !state.model.contains_edge(&key) {
                    return Err(unknown_edge(&key).into());
                }
                self.annotation_op(state, ctx, request, AnnotationTarget::Edge(key), user)
            }
            _ => Err(unsupported(request).into()),
        }
    }

    fn edge_key(&self, model: &GraphModel, ctx: &Context, request: &Request) -> CausewayResult<EdgeKey> {
        let args = &request.arguments;
        let subject = self.existing_node(model, ctx, args.subject.as_deref(), "subject", request)?;
        let object = self.existing_node(model, ctx, args.object.as_deref(), "object", request)?;
        let raw = args.predicate.as_deref().ok_or_else(|| missing("predicate", request))?;
        let predicate = self.curies.expand(raw)?;
        if self.hierarchy.property(&predicate).is_none() {
            return Err(unknown("predicate", &predicate).into());
        }
        Ok(EdgeKey::new(subject, predicate, object))
    }

    // -----------------------------------------------------------------------
    // model
    // -----------------------------------------------------------------------

    fn model_op(
        &self,
        state: &mut ModelState,
        ctx: &mut Context,
        index: usize,
        request: &Request,
        user: Option<&str>,
    ) -> CausewayResult<()> {
        match request.operation {
            Operation::Add | Operation::Import if index == 0 => {
                if request.operation == Operation::Import {
                    ctx.structural = true;
                }
                ctx.changed = true;
                Ok(())
            }
            Operation::Get => {
                ctx.structural = true;
                Ok(())
            }
            Operation::Export => self.export(&state.model, request, ctx),
            Operation::AddAnnotation | Operation::RemoveAnnotation => {
                self.annotation_op(state, ctx, request, AnnotationTarget::Model, user)
            }
            Operation::UpdateImports => {
                ctx.structural = true;
                if state.model.imports() == &self.default_imports {
                    return Ok(());
                }
                let diff = Diff::SetImports {
                    before: state.model.imports().clone(),
                    after: self.default_imports.clone(),
                };
                self.apply_diff(state, ctx, diff)
            }
            Operation::Undo | Operation::Redo => {
                self.commit(state, ctx, user);
                let summary = if request.operation == Operation::Undo {
                    state.history.undo(&mut state.model)?
                } else {
                    state.history.redo(&mut state.model)?
                };
                state.version += 1;
                state.modified = true;
                ctx.structural = true;
                ctx.changed = true;
                tracing::info!(
                    model = %state.model.id(),
                    change_set = summary.id,
                    operation = %request.operation,
                    version = state.version,
                    "history step"
                );
                Ok(())
            }
            Operation::GetUndoRedo => Ok(()),
            Operation::Store => {
                ctx.store = true;
                Ok(())
            }
            Operation::Remove => {
                ctx.remove = true;
                Ok(())
            }
            _ => Err(unsupported(request).into()),
        }
    }

    fn export(&self, model: &GraphModel, request: &Request, ctx: &mut Context) -> CausewayResult<()> {
        let format = ModelFormat::parse(request.arguments.format.as_deref())?;
        ctx.export = Some(export::export_model(model, format)?);
        ctx.structural = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // shared helpers
    // -----------------------------------------------------------------------

    fn annotation_op(
        &self,
        state: &mut ModelState,
        ctx: &mut Context,
        request: &Request,
        target: AnnotationTarget,
        user: Option<&str>,
    ) -> CausewayResult<()> {
        let values: &[WireAnnotation] = &request.arguments.values;
        if values.is_empty() {
            return Err(missing("values", request).into());
        }
        for value in values {
            let annotation = value.to_annotation(user);
            let position = state.model.annotation_position(&target, &annotation);
            let diff = match (request.operation, position) {
                (Operation::AddAnnotation, Some(_)) => continue,
                (Operation::AddAnnotation, None) => {
                    let index = annotation_count(&state.model, &target);
                    Diff::AddAnnotation {
                        target: target.clone(),
                        annotation,
                        index,
                    }
                }
                (_, Some(index)) => {
                    // remove what is stored, provenance included
                    let stored = stored_annotation(&state.model, &target, index).unwrap_or(annotation);
                    Diff::RemoveAnnotation {
                        target: target.clone(),
                        annotation: stored,
                        index,
                    }
                }
                (_, None) => {
                    return Err(ModelError::UnknownIdentifier {
                        role: "annotation".into(),
                        id: format!("{}={}", value.key, value.value),
                    }
                    .into());
                }
            };
            self.apply_diff(state, ctx, diff)?;
        }
        Ok(())
    }

    fn expressions(&self, request: &Request) -> CausewayResult<Vec<TypeExpr>> {
        if request.arguments.expressions.is_empty() {
            return Err(missing("expressions", request).into());
        }
        request
            .arguments
            .expressions
            .iter()
            .map(|e| e.to_type_expr(&self.curies).map_err(Into::into))
            .collect()
    }

    /// Resolve a variable name or identifier to an IRI.
    fn resolve(&self, ctx: &Context, raw: &str) -> Result<Iri, ModelError> {
        if let Some(bound) = ctx.variables.get(raw) {
            return Ok(bound.clone());
        }
        if !raw.contains(':') {
            return Err(ModelError::UnknownVariable { name: raw.to_string() });
        }
        self.curies.expand(raw)
    }

    fn existing_node(
        &self,
        model: &GraphModel,
        ctx: &Context,
        raw: Option<&str>,
        role: &str,
        request: &Request,
    ) -> Result<Iri, ModelError> {
        let raw = raw.ok_or_else(|| missing(role, request))?;
        let id = self.resolve(ctx, raw)?;
        if !model.contains_individual(&id) {
            return Err(unknown(role, &id));
        }
        Ok(id)
    }

    fn existing_individual(
        &self,
        model: &GraphModel,
        ctx: &Context,
        request: &Request,
        role: &str,
    ) -> Result<Iri, ModelError> {
        self.existing_node(model, ctx, request.arguments.individual.as_deref(), role, request)
    }
}

fn annotation_count(model: &GraphModel, target: &AnnotationTarget) -> usize {
    match target {
        AnnotationTarget::Model => model.annotations().len(),
        AnnotationTarget::Individual(id) => model.individual(id).map_or(0, |i| i.annotations.len()),
        AnnotationTarget::Edge(key) => model.edge(key).map_or(0, |e| e.annotations.len()),
    }
}

fn stored_annotation(
    model: &GraphModel,
    target: &AnnotationTarget,
    index: usize,
) -> Option<crate::model::Annotation> {
    match target {
        AnnotationTarget::Model => model.annotations().get(index).cloned(),
        AnnotationTarget::Individual(id) => model.individual(id)?.annotations.get(index).cloned(),
        AnnotationTarget::Edge(key) => model.edge(key)?.annotations.get(index).cloned(),
    }
}

fn describe(expr: &TypeExpr) -> String {
    match expr.named_class() {
        Some(id) => id.to_string(),
        None => format!("{expr:?}"),
    }
}

fn unknown(role: &str, id: &Iri) -> ModelError {
    ModelError::UnknownIdentifier {
        role: role.to_string(),
        id: id.to_string(),
    }
}

fn unknown_edge(key: &EdgeKey) -> ModelError {
    ModelError::UnknownIdentifier {
        role: "edge".into(),
        id: format!("{} {} {}", key.subject, key.predicate, key.object),
    }
}

fn missing(argument: &str, request: &Request) -> ModelError {
    ModelError::MissingArgument {
        argument: argument.to_string(),
        operation: request.label(),
    }
}

fn unsupported(request: &Request) -> ModelError {
    ModelError::UnsupportedOperation {
        entity: request.entity.to_string(),
        operation: request.operation.to_string(),
    }
}

/// Revert and drop the diffs pending since `start`.
fn discard_since(state: &mut ModelState, ctx: &mut Context, start: usize) {
    let start = start.min(ctx.pending.len());
    diff::revert_all(&mut state.model, &ctx.pending[start..]);
    ctx.pending.truncate(start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Arguments, WireExpr};
    use crate::hierarchy::{ClassHierarchy, PropertyInfo};

    const MODEL: &str = "http://model.example.org/m1";

    fn processor() -> BatchProcessor {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_property(PropertyInfo::new(Iri::new("http://purl.obolibrary.org/obo/RO_0002333")));
        hierarchy.add_property(PropertyInfo::new(Iri::new("http://purl.obolibrary.org/obo/BFO_0000066")));
        BatchProcessor::new(CurieMap::default(), Arc::new(hierarchy))
    }

    fn state() -> ModelState {
        ModelState::new(GraphModel::new(Iri::new(MODEL)))
    }

    fn add_individual(var: &str, class: &str) -> Request {
        Request::new(
            Entity::Individual,
            Operation::Add,
            Arguments {
                assign_to_variable: Some(var.into()),
                expressions: vec![WireExpr::class(class)],
                ..Arguments::default()
            },
        )
    }

    fn add_edge(subject: &str, predicate: &str, object: &str) -> Request {
        Request::new(
            Entity::Edge,
            Operation::Add,
            Arguments {
                subject: Some(subject.into()),
                predicate: Some(predicate.into()),
                object: Some(object.into()),
                ..Arguments::default()
            },
        )
    }

    fn model_op(operation: Operation) -> Request {
        Request::new(Entity::Model, operation, Arguments::default())
    }

    fn remove_individual(id: &str) -> Request {
        Request::new(
            Entity::Individual,
            Operation::Remove,
            Arguments {
                individual: Some(id.into()),
                ..Arguments::default()
            },
        )
    }

    #[test]
    fn variables_link_operations_within_a_batch() {
        let p = processor();
        let mut s = state();
        let outcome = p.apply(
            &mut s,
            &[
                add_individual("mf", "GO:0003674"),
                add_individual("gp", "UniProtKB:P1"),
                add_edge("mf", "RO:0002333", "gp"),
            ],
            Some("alice"),
        );
        assert!(outcome.succeeded(), "{:?}", outcome.outcomes);
        assert_eq!(outcome.signal, Signal::Merge);
        assert_eq!(s.model.individual_count(), 2);
        assert_eq!(s.model.edge_count(), 1);
        assert_eq!(s.version, 1);
        assert_eq!(s.history.undo_summaries().len(), 1);
        assert_eq!(outcome.variables["mf"].as_str(), format!("{MODEL}/i1"));
    }

    #[test]
    fn whole_batch_is_one_undo_step() {
        let p = processor();
        let mut s = state();
        let empty = s.model.clone();
        p.apply(
            &mut s,
            &[add_individual("a", "GO:0003674"), add_individual("b", "GO:0005575")],
            None,
        );
        let outcome = p.apply(&mut s, &[model_op(Operation::Undo)], None);
        assert!(outcome.succeeded());
        assert_eq!(outcome.signal, Signal::Rebuild);
        assert_eq!(s.model, empty);
        assert_eq!(s.version, 2);
    }

    #[test]
    fn undo_on_empty_history_fails_without_change() {
        let p = processor();
        let mut s = state();
        let outcome = p.apply(&mut s, &[model_op(Operation::Undo)], None);
        let failure = outcome.first_failure().unwrap();
        assert_eq!(failure.code.as_deref(), Some("causeway::history::empty"));
        assert_eq!(s.version, 0);
        assert!(!outcome.changed);
    }

    #[test]
    fn pending_changes_commit_before_undo() {
        let p = processor();
        let mut s = state();
        p.apply(&mut s, &[add_individual("a", "GO:0003674")], None);
        // the add below is committed on its own, then undone
        let outcome = p.apply(
            &mut s,
            &[add_individual("b", "GO:0005575"), model_op(Operation::Undo)],
            None,
        );
        assert!(outcome.succeeded());
        assert_eq!(s.model.individual_count(), 1);
        assert_eq!(s.history.redo_summaries().len(), 1);
    }

    #[test]
    fn cascade_removal_restores_edges_on_undo() {
        let p = processor();
        let mut s = state();
        let created = p.apply(
            &mut s,
            &[
                add_individual("mf", "GO:0003674"),
                add_individual("gp", "UniProtKB:P1"),
                add_edge("mf", "RO:0002333", "gp"),
            ],
            None,
        );
        let before = s.model.clone();
        let gp = created.variables["gp"].to_string();
        let outcome = p.apply(&mut s, &[remove_individual(&gp)], None);
        assert!(outcome.succeeded());
        assert_eq!(outcome.signal, Signal::Rebuild);
        assert_eq!(s.model.edge_count(), 0);
        p.apply(&mut s, &[model_op(Operation::Undo)], None);
        assert_eq!(s.model, before);
    }

    #[test]
    fn reject_removal_keeps_model() {
        let p = processor().with_removal_policy(RemovalPolicy::Reject);
        let mut s = state();
        let created = p.apply(
            &mut s,
            &[
                add_individual("mf", "GO:0003674"),
                add_individual("gp", "UniProtKB:P1"),
                add_edge("mf", "RO:0002333", "gp"),
            ],
            None,
        );
        let before = s.model.clone();
        let outcome = p.apply(&mut s, &[remove_individual(created.variables["gp"].as_str())], None);
        assert_eq!(
            outcome.first_failure().unwrap().code.as_deref(),
            Some("causeway::model::referential_integrity")
        );
        assert_eq!(s.model, before);
    }

    #[test]
    fn failed_request_leaves_none_of_its_changes() {
        let p = processor();
        let mut s = state();
        let created = p.apply(&mut s, &[add_individual("mf", "GO:0003674")], None);
        let before = s.model.clone();
        let remove_types = Request::new(
            Entity::Individual,
            Operation::RemoveType,
            Arguments {
                individual: Some(created.variables["mf"].to_string()),
                expressions: vec![WireExpr::class("GO:0003674"), WireExpr::class("GO:0005575")],
                ..Arguments::default()
            },
        );
        let outcome = p.apply(&mut s, &[remove_types], None);
        assert_eq!(outcome.outcomes[0].status, OpStatus::Failed);
        assert!(!outcome.changed);
        assert_eq!(s.model, before);
        assert_eq!(s.version, 1);

        let add_title = Request::new(
            Entity::Model,
            Operation::AddAnnotation,
            Arguments {
                values: vec![WireAnnotation::new("title", "t")],
                ..Arguments::default()
            },
        );
        p.apply(&mut s, &[add_title], None);
        let before = s.model.clone();
        let remove_annotations = Request::new(
            Entity::Model,
            Operation::RemoveAnnotation,
            Arguments {
                values: vec![WireAnnotation::new("title", "t"), WireAnnotation::new("state", "nope")],
                ..Arguments::default()
            },
        );
        let outcome = p.apply(&mut s, &[remove_annotations], None);
        assert_eq!(outcome.outcomes[0].status, OpStatus::Failed);
        assert_eq!(s.model.annotations().len(), 1);
        assert_eq!(s.model, before);
        assert_eq!(s.version, 2);
        assert_eq!(s.history.undo_summaries().len(), 2);
    }

    #[test]
    fn best_effort_keeps_successes_and_fails_dependents() {
        let p = processor();
        let mut s = state();
        let outcome = p.apply(
            &mut s,
            &[
                add_individual("a", "GO:0003674"),
                add_edge("a", "RO:0002333", "never-bound"),
                add_individual("b", "NOPE:1"),
            ],
            None,
        );
        let statuses: Vec<_> = outcome.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OpStatus::Ok, OpStatus::Failed, OpStatus::Failed]);
        assert_eq!(
            outcome.outcomes[1].code.as_deref(),
            Some("causeway::model::unknown_variable")
        );
        assert_eq!(s.model.individual_count(), 1);
    }

    #[test]
    fn all_or_nothing_rolls_back_and_skips() {
        let p = processor().with_failure_policy(FailurePolicy::AllOrNothing);
        let mut s = state();
        let before = s.model.clone();
        let outcome = p.apply(
            &mut s,
            &[
                add_individual("a", "GO:0003674"),
                add_edge("a", "RO:0009999", "a"),
                add_individual("b", "GO:0005575"),
            ],
            None,
        );
        let statuses: Vec<_> = outcome.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OpStatus::RolledBack, OpStatus::Failed, OpStatus::Skipped]);
        assert_eq!(s.model, before);
        assert_eq!(s.version, 0);
        assert!(!s.history.can_undo());
    }

    #[test]
    fn unknown_subject_is_reported() {
        let p = processor();
        let mut s = state();
        let outcome = p.apply(
            &mut s,
            &[add_edge("http://model.example.org/m1/nope", "RO:0002333", "http://model.example.org/m1/nope")],
            None,
        );
        let failure = outcome.first_failure().unwrap();
        assert_eq!(failure.code.as_deref(), Some("causeway::model::unknown_identifier"));
        assert!(failure.message.as_deref().unwrap().contains("subject"));
    }

    #[test]
    fn re_adding_existing_facts_records_nothing() {
        let p = processor();
        let mut s = state();
        let created = p.apply(&mut s, &[add_individual("a", "GO:0003674")], None);
        let a = created.variables["a"].to_string();
        let outcome = p.apply(
            &mut s,
            &[Request::new(
                Entity::Individual,
                Operation::AddType,
                Arguments {
                    individual: Some(a),
                    expressions: vec![WireExpr::class("GO:0003674")],
                    ..Arguments::default()
                },
            )],
            None,
        );
        assert!(outcome.succeeded());
        assert!(!outcome.changed);
        assert_eq!(s.version, 1);
    }

    #[test]
    fn annotations_round_trip_through_history() {
        let p = processor();
        let mut s = state();
        let annotate = |operation| {
            Request::new(
                Entity::Model,
                operation,
                Arguments {
                    values: vec![WireAnnotation::new("title", "kinase pathway")],
                    ..Arguments::default()
                },
            )
        };
        p.apply(&mut s, &[annotate(Operation::AddAnnotation)], Some("alice"));
        assert_eq!(s.model.annotations()[0].provenance.as_deref(), Some("alice"));
        let removed = p.apply(&mut s, &[annotate(Operation::RemoveAnnotation)], Some("bob"));
        assert!(removed.succeeded());
        assert!(s.model.annotations().is_empty());
        p.apply(&mut s, &[model_op(Operation::Undo)], None);
        assert_eq!(s.model.annotations()[0].provenance.as_deref(), Some("alice"));
    }

    #[test]
    fn meta_and_history_queries_signal_meta() {
        let p = processor();
        let s = state();
        let outcome = p.query(
            &s.snapshot(),
            &[
                Request::new(Entity::Meta, Operation::Get, Arguments::default()),
                model_op(Operation::GetUndoRedo),
            ],
        );
        assert!(outcome.succeeded());
        assert_eq!(outcome.signal, Signal::Meta);
    }

    #[test]
    fn export_is_a_rebuild_query() {
        let p = processor();
        let mut s = state();
        p.apply(&mut s, &[add_individual("a", "GO:0003674")], None);
        let outcome = p.query(&s.snapshot(), &[model_op(Operation::Export)]);
        assert_eq!(outcome.signal, Signal::Rebuild);
        assert!(outcome.export.unwrap().contains("GO_0003674"));
    }

    #[test]
    fn fresh_ids_skip_taken_ones() {
        let p = processor();
        let mut s = state();
        let explicit = Request::new(
            Entity::Individual,
            Operation::Add,
            Arguments {
                individual_iri: Some(format!("{MODEL}/i1")),
                ..Arguments::default()
            },
        );
        p.apply(&mut s, &[explicit.clone()], None);
        let outcome = p.apply(&mut s, &[add_individual("x", "GO:0003674")], None);
        assert_eq!(outcome.variables["x"].as_str(), format!("{MODEL}/i2"));
        let duplicate = p.apply(&mut s, &[explicit], None);
        assert_eq!(
            duplicate.first_failure().unwrap().code.as_deref(),
            Some("causeway::model::duplicate_individual")
        );
    }
}
