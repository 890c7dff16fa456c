// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # causeway
//!
//! Collaborative editing server for causal-activity models: small graphs of
//! typed individuals connected by relation edges, edited in batches by many
//! clients and classified by a reasoner after each change.
//!
//! ## Architecture
//!
//! - **Models** (`model`): the graph, reversible diffs, undo/redo history and
//!   N-Triples / JSON import and export
//! - **Batches** (`batch`): the wire protocol, the processor that applies a
//!   batch under a model's write lock, and response rendering
//! - **Hierarchy** (`hierarchy`): class and property hierarchy (petgraph)
//!   plus module extraction for a model's signature
//! - **Lookup** (`lookup`): external identifier lookup used to add root
//!   types before reasoning
//! - **Inference** (`infer`): bounded-concurrency build pipeline producing
//!   immutable [`infer::InferenceResult`]s
//! - **Registry** (`registry`): live models, per-model serialization and
//!   inference publication
//!
//! ## Library usage
//!
//! ```no_run
//! use causeway::batch::parse_requests;
//! use causeway::config::ServerConfig;
//! use causeway::registry::ModelRegistry;
//!
//! # async fn run() -> causeway::error::CausewayResult<()> {
//! let registry = ModelRegistry::from_config(&ServerConfig::default())?;
//! let requests = parse_requests(r#"[{"entity": "model", "operation": "add", "arguments": {}}]"#)?;
//! let response = registry
//!     .handle_batch(Some("alice".into()), None, None, requests, true)
//!     .await;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod infer;
pub mod iri;
pub mod lookup;
pub mod model;
pub mod registry;
pub mod store;
