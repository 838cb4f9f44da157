//! Configuration validation
//!
//! Validates agentbus configuration for correctness:
//! - Relay bind address parses as a socket address
//! - Remote endpoint is an http(s) URL
//! - Sizes and capacities are non-zero

use super::agentbus_config::AgentBusConfig;
use crate::AgentBusError;
use std::net::SocketAddr;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "[{}] {}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate an agentbus configuration, collecting every problem found
pub fn validate_config(config: &AgentBusConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.relay.bind.parse::<SocketAddr>().is_err() {
        errors.push(
            ValidationError::new(
                "bind",
                format!("Invalid socket address '{}'", config.relay.bind),
            )
            .in_section("relay"),
        );
    }

    if config.relay.max_body_size == 0 {
        errors.push(
            ValidationError::new("max_body_size", "Must be greater than 0").in_section("relay"),
        );
    }

    if let Some(remote) = &config.remote {
        if !(remote.endpoint.starts_with("http://") || remote.endpoint.starts_with("https://")) {
            errors.push(
                ValidationError::new(
                    "endpoint",
                    format!(
                        "Endpoint must start with http:// or https://, got '{}'",
                        remote.endpoint
                    ),
                )
                .in_section("remote"),
            );
        }

        if remote.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push(
                ValidationError::new("token", "Token must not be empty when set")
                    .in_section("remote"),
            );
        }
    }

    if config.agents.mailbox_capacity == 0 {
        errors.push(
            ValidationError::new("mailbox_capacity", "Must be greater than 0")
                .in_section("agents"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert errors to AgentBusError
pub fn validate_config_result(config: &AgentBusConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        AgentBusError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
