//! HTTP remote transport
//!
//! Posts messages to a relay server's `/api/messages` endpoint. Success means
//! the relay accepted the message, not that the recipient has seen it.

use super::transport::{RemoteTransport, Result, TransportError};
use super::Message;
use crate::config::RemoteConfig;
use async_trait::async_trait;
use serde::Deserialize;

/// Remote transport backed by a relay's HTTP API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Base URL of the relay server
    endpoint: String,
    /// Optional bearer token
    token: Option<String>,
    client: reqwest::Client,
}

/// Error response from the relay
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpTransport {
    /// Create a transport for the given relay endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Create from remote config
    pub fn from_config(config: &RemoteConfig) -> Self {
        let transport = Self::new(&config.endpoint);
        match &config.token {
            Some(token) => transport.with_token(token),
            None => transport,
        }
    }

    /// Authenticate with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn messages_url(&self) -> String {
        format!("{}/api/messages", self.endpoint)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, message: &Message) -> Result<()> {
        let mut request = self
            .client
            .post(self.messages_url())
            .header("Content-Type", "application/json")
            .json(message);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
                error: "Unknown error".to_string(),
            });
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: error.error,
            });
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            id = message.id.as_str(),
            "Relay accepted message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new("http://relay.local:7400/");
        assert_eq!(transport.endpoint(), "http://relay.local:7400");
        assert_eq!(
            transport.messages_url(),
            "http://relay.local:7400/api/messages"
        );
        assert!(transport.token.is_none());
    }

    #[test]
    fn test_from_config_carries_token() {
        let config = RemoteConfig {
            endpoint: "https://relay.example".to_string(),
            token: Some("secret".to_string()),
        };
        let transport = HttpTransport::from_config(&config);
        assert_eq!(transport.token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_http_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9");
        let message = Message::parse_to("x@outside").unwrap();
        let result = transport.send(&message).await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
