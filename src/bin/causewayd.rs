//! causewayd: the model-editing server.
//!
//! - `GET|POST /m3Batch`: read-only batches
//! - `GET|POST /m3BatchPrivileged`: batches that may change models (`uid` required)
//! - `GET /health`: server status
//!
//! Batch parameters (`requests`, `uid`, `intention`, `packet-id`) arrive as a
//! query string on GET and form-encoded on POST. Every well-formed call gets
//! HTTP 200; success or failure is carried by the envelope's `message-type`.
//!
//! Build and run: `cargo run --features server --bin causewayd -- --config causeway.toml`

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use causeway::batch::{BatchResponse, parse_requests};
use causeway::config::ServerConfig;
use causeway::error::CausewayError;
use causeway::registry::ModelRegistry;

#[derive(Parser)]
#[command(name = "causewayd", version, about = "Causal-activity model editing server")]
struct Args {
    /// Server config (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ── Server state ──────────────────────────────────────────────────────────

struct ServerState {
    registry: ModelRegistry,
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BatchParams {
    #[serde(default)]
    requests: Option<String>,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    intention: Option<String>,
    #[serde(default)]
    packet_id: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    models_loaded: usize,
    reasoner: String,
    reasoning_permits: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let builder = state.registry.builder();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models_loaded: state.registry.len(),
        reasoner: builder.reasoner_name(),
        reasoning_permits: builder.available_permits(),
    })
}

async fn run_batch(state: &ServerState, params: BatchParams, privileged: bool) -> Json<BatchResponse> {
    let requests = params.requests.as_deref().unwrap_or("[]");
    match parse_requests(requests) {
        Ok(requests) => Json(
            state
                .registry
                .handle_batch(params.uid, params.intention, params.packet_id, requests, privileged)
                .await,
        ),
        Err(err) => {
            let response = state.registry.envelope(params.uid, params.intention, params.packet_id);
            Json(response.fail(&CausewayError::from(err)))
        }
    }
}

async fn batch_get(State(state): State<Arc<ServerState>>, Query(params): Query<BatchParams>) -> Json<BatchResponse> {
    run_batch(&state, params, false).await
}

async fn batch_post(State(state): State<Arc<ServerState>>, Form(params): Form<BatchParams>) -> Json<BatchResponse> {
    run_batch(&state, params, false).await
}

async fn privileged_get(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<BatchParams>,
) -> Json<BatchResponse> {
    run_batch(&state, params, true).await
}

async fn privileged_post(
    State(state): State<Arc<ServerState>>,
    Form(params): Form<BatchParams>,
) -> Json<BatchResponse> {
    run_batch(&state, params, true).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Ok(bind) = std::env::var("CAUSEWAY_BIND") {
        config.bind = bind;
    }
    if let Ok(port) = std::env::var("CAUSEWAY_PORT") {
        config.port = port.parse().into_diagnostic()?;
    }
    let addr = format!("{}:{}", config.bind, config.port);

    let registry = ModelRegistry::from_config(&config)?;
    tracing::info!(
        models = registry.len(),
        reasoner = %registry.builder().reasoner_name(),
        permits = registry.builder().max_concurrent(),
        "causewayd initialized"
    );
    let state = Arc::new(ServerState { registry });

    let app = Router::new()
        .route("/health", get(health))
        .route("/m3Batch", get(batch_get).post(batch_post))
        .route("/m3BatchPrivileged", get(privileged_get).post(privileged_post))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    tracing::info!("causewayd listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic()?;

    // Serve with graceful shutdown on SIGTERM/SIGINT.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {},
                            _ = sigterm.recv() => {},
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to register SIGTERM handler: {e}");
                        ctrl_c.await.ok();
                    }
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.ok();
            }
            tracing::info!("causewayd shutting down");
        })
        .await
        .into_diagnostic()?;

    state.registry.shutdown();
    Ok(())
}
