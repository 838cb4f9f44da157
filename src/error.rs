//! Error types for agentbus
//!
//! Crate-level error enum wrapping the module errors, used by configuration
//! loading and the CLI. Uses thiserror for ergonomic error handling.

use crate::agent::{AgentError, BehaviourError};
use crate::mail::{
    AddressError, DispatchError, RegistryError, RouteError, ServerError, TransportError,
};
use thiserror::Error;

/// Result type alias for agentbus operations
pub type Result<T> = std::result::Result<T, AgentBusError>;

/// Top-level error type for agentbus operations
#[derive(Error, Debug)]
pub enum AgentBusError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Address parsing errors
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Registry lookup errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Local dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Remote transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Routing errors
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// Agent lifecycle errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Behaviour errors
    #[error("Behaviour error: {0}")]
    Behaviour(#[from] BehaviourError),

    /// Relay server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}
