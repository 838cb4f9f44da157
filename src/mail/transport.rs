//! Remote transport abstraction
//!
//! The router hands every message whose recipient is not registered locally
//! to a [`RemoteTransport`]. Implementations only confirm submission, not
//! delivery.

use super::Message;
use async_trait::async_trait;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no remote transport configured for {0}")]
    NotConfigured(String),

    #[error("remote endpoint rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Create a generic transport error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Outbound hand-off for non-local recipients
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Submit a message for remote delivery
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Transport for agents with no remote path; every send fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnroutableTransport;

#[async_trait]
impl RemoteTransport for UnroutableTransport {
    async fn send(&self, message: &Message) -> Result<()> {
        Err(TransportError::NotConfigured(message.to.to_string()))
    }
}
