//! Rich diagnostic error types for the causeway server.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Per-operation failures inside a batch are
//! reported back to the client using the same codes, so a client sees
//! `causeway::model::unknown_identifier` both in logs and in the response.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for causeway.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum CausewayError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl CausewayError {
    /// Diagnostic code as a plain string, used in per-operation outcomes.
    pub fn code_string(&self) -> Option<String> {
        self.code().map(|c| c.to_string())
    }
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("unknown {role}: {id}")]
    #[diagnostic(
        code(causeway::model::unknown_identifier),
        help(
            "The operation references an identifier that is not present in the model. \
             Create the individual first, or check the identifier for typos."
        )
    )]
    UnknownIdentifier { role: String, id: String },

    #[error("model not found: {id}")]
    #[diagnostic(
        code(causeway::model::unknown_model),
        help("No live model has this id. Create it with a `model add` request or import it first.")
    )]
    UnknownModel { id: String },

    #[error("individual already exists: {id}")]
    #[diagnostic(
        code(causeway::model::duplicate_individual),
        help("Individual identifiers are unique within a model. Omit `individual-iri` to get a fresh one.")
    )]
    DuplicateIndividual { id: String },

    #[error("individual {id} still has {edges} incident edge(s)")]
    #[diagnostic(
        code(causeway::model::referential_integrity),
        help(
            "The server runs with removal policy \"reject\". Remove the incident edges first, \
             or switch `removal_policy` to \"cascade\"."
        )
    )]
    ReferentialIntegrity { id: String, edges: usize },

    #[error("unbound variable: {name}")]
    #[diagnostic(
        code(causeway::model::unknown_variable),
        help(
            "Variables are bound with `assign-to-variable` by an earlier `add` in the same batch. \
             If that operation failed, later operations using the variable fail too."
        )
    )]
    UnknownVariable { name: String },

    #[error("invalid identifier \"{value}\": {reason}")]
    #[diagnostic(
        code(causeway::model::invalid_identifier),
        help("Use an absolute IRI (http://...) or a CURIE with a known prefix (GO:0003674).")
    )]
    InvalidIdentifier { value: String, reason: String },

    #[error("missing argument `{argument}` for {operation}")]
    #[diagnostic(
        code(causeway::model::missing_argument),
        help("Check the request arguments for this operation.")
    )]
    MissingArgument { argument: String, operation: String },

    #[error("unsupported operation: {entity} {operation}")]
    #[diagnostic(
        code(causeway::model::unsupported_operation),
        help("Not every operation is defined for every entity; see the batch protocol documentation.")
    )]
    UnsupportedOperation { entity: String, operation: String },

    #[error("inconsistent change: {message}")]
    #[diagnostic(
        code(causeway::model::inconsistent_change),
        help("A recorded change no longer matches the model. This indicates a bug; please report it.")
    )]
    InconsistentChange { message: String },

    #[error("cannot import model: {message}")]
    #[diagnostic(
        code(causeway::model::import),
        help("Supported formats are \"ntriples\" (default) and \"json\".")
    )]
    Import { message: String },
}

// ---------------------------------------------------------------------------
// History errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum HistoryError {
    #[error("nothing to {action}")]
    #[diagnostic(
        code(causeway::history::empty),
        help("The model history has no entry to {action}. Use `get-undo-redo` to inspect it.")
    )]
    EmptyHistory { action: String },
}

// ---------------------------------------------------------------------------
// Lookup errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LookupError {
    #[error("lookup service unavailable: {message}")]
    #[diagnostic(
        code(causeway::lookup::unavailable),
        help(
            "The external lookup service could not be reached. Inference continues \
             without root-type augmentation; check `lookup.url` in the server config."
        )
    )]
    Unavailable { message: String },

    #[error("invalid lookup response: {message}")]
    #[diagnostic(
        code(causeway::lookup::invalid_response),
        help("The lookup service answered with an unexpected payload. Check the service version.")
    )]
    InvalidResponse { message: String },
}

// ---------------------------------------------------------------------------
// Inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InferenceError {
    #[error("reasoning failed for {model}: {message}")]
    #[diagnostic(
        code(causeway::inference::reasoning),
        help(
            "The reasoner raised an error. No new inference was published; \
             the previous result for this model is still served."
        )
    )]
    Reasoning { model: String, message: String },

    #[error("inference build for {model} interrupted while waiting for a reasoning permit")]
    #[diagnostic(
        code(causeway::inference::interrupted),
        help("The server is shutting down or the reasoning pool was closed.")
    )]
    BuildInterrupted { model: String },

    #[error("failed to release {resource}: {message}")]
    #[diagnostic(
        code(causeway::inference::cleanup),
        severity(Warning),
        help("A temporary resource could not be released. This is logged and never escalated.")
    )]
    Cleanup { resource: String, message: String },
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("invalid batch requests: {message}")]
    #[diagnostic(
        code(causeway::protocol::invalid_requests),
        help("`requests` must be a JSON array of {{entity, operation, arguments}} objects.")
    )]
    InvalidRequests { message: String },

    #[error("empty batch")]
    #[diagnostic(
        code(causeway::protocol::empty_batch),
        help("Send at least one request.")
    )]
    EmptyBatch,

    #[error("insufficient permissions for {operation}")]
    #[diagnostic(
        code(causeway::protocol::insufficient_permissions),
        help("Mutating operations require the privileged endpoint and a user id (`uid`).")
    )]
    InsufficientPermissions { operation: String },

    #[error("privileged request without a user id")]
    #[diagnostic(
        code(causeway::protocol::missing_uid),
        help("Pass a non-empty `uid` to the privileged endpoint.")
    )]
    MissingUid,

    #[error("batch targets more than one model: {first} and {second}")]
    #[diagnostic(
        code(causeway::protocol::mixed_models),
        help("All requests of a batch must share one `model-id`. Split the batch.")
    )]
    MixedModels { first: String, second: String },

    #[error("batch has no target model")]
    #[diagnostic(
        code(causeway::protocol::missing_model_id),
        help("Set `model-id` on the requests, or start the batch with `model add` or `model import`.")
    )]
    MissingModelId,
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error at {path}")]
    #[diagnostic(
        code(causeway::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(causeway::store::serde),
        help("A stored model could not be read or written. The file may be from an incompatible version.")
    )]
    Serialization { message: String },

    #[error("no model store configured")]
    #[diagnostic(
        code(causeway::store::not_configured),
        help("Set `data_dir` in the server config to enable `store`.")
    )]
    NotConfigured,
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(causeway::config::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(causeway::config::parse),
        help("Check the file syntax.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write {path}")]
    #[diagnostic(
        code(causeway::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(causeway::config::invalid),
        help("Check the server config fields. {message}")
    )]
    Invalid { message: String },
}

/// Convenience alias for functions returning causeway results.
pub type CausewayResult<T> = std::result::Result<T, CausewayError>;
