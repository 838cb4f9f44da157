//! HTTP relay server
//!
//! Inbound side of the remote path: accepts messages posted by an
//! [`HttpTransport`](super::HttpTransport) in another process and dispatches
//! them into the local registry. The relay never forwards; a message for an
//! address that is not registered here is refused.
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `POST /api/messages` - Deliver a message to a local agent
//! - `GET /api/agents` - List registered agent addresses
//! - `GET /metrics` - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use agentbus::mail::{Registry, RelayServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(Registry::new());
//!     RelayServer::new(registry)
//!         .run("127.0.0.1:7400")
//!         .await
//!         .expect("Relay failed");
//! }
//! ```

use super::{Delivery, DispatchError, Message, Registry};
use crate::config::RelayConfig;
use crate::metrics;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Default request body size limit in bytes (1MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Shared server state
struct AppState {
    registry: Arc<Registry>,
}

/// HTTP relay in front of a local registry
pub struct RelayServer {
    state: Arc<AppState>,
    max_body_size: usize,
}

impl RelayServer {
    /// Create a relay for the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            state: Arc::new(AppState { registry }),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Create a relay using the configured body limit
    pub fn from_config(registry: Arc<Registry>, config: &RelayConfig) -> Self {
        Self::new(registry).with_max_body_size(config.max_body_size)
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    fn router(state: Arc<AppState>, max_body_size: usize) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/messages", post(post_message))
            .route("/api/agents", get(list_agents))
            .route("/metrics", get(get_metrics))
            .layer(axum::extract::DefaultBodyLimit::max(max_body_size))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        tracing::info!(
            addr = ?listener.local_addr().ok(),
            max_body_size = self.max_body_size,
            "Relay server listening"
        );

        axum::serve(listener, Self::router(self.state, self.max_body_size))
            .await
            .map_err(ServerError::Io)
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    accepted: bool,
    message_id: String,
}

#[derive(Debug, Serialize)]
struct AgentsResponse {
    agents: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Message>, JsonRejection>,
) -> Result<impl IntoResponse, HandlerError> {
    let Json(message) = payload.map_err(|rejection| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid message: {}", rejection.body_text()),
        )
    })?;

    let Some(handle) = state.registry.lookup(&message.to) else {
        tracing::debug!(to = %message.to, "Relay has no local agent for recipient");
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("No local agent for {}", message.to.canonical()),
        ));
    };

    let message_id = message.id.as_str().to_string();
    let to = message.to.to_string();

    handle.dispatch(message).map_err(|e| {
        metrics::record_route_failure(Delivery::Local);
        tracing::warn!(to = %to, error = %e, "Relay dispatch failed");
        let status = match e {
            DispatchError::MailboxFull { .. } | DispatchError::Closed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DispatchError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        error_response(status, e.to_string())
    })?;

    metrics::record_routed(Delivery::Local);
    tracing::debug!(to = %to, id = %message_id, "Relay delivered message");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            message_id,
        }),
    ))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(AgentsResponse {
        agents: state.registry.addresses(),
    })
}

async fn get_metrics() -> Result<impl IntoResponse, HandlerError> {
    metrics::encode_metrics()
        .map(|text| ([("Content-Type", "text/plain; version=0.0.4")], text))
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
