//! Configuration system
//!
//! Loads ~/.config/agentbus/config.yaml with support for:
//! - Relay server bind address and request limits
//! - An optional remote relay used for non-local recipients
//! - Defaults applied to every agent (mailbox size, registry participation)

mod agentbus_config;
pub mod validation;

pub use agentbus_config::{AgentBusConfig, AgentDefaults, RelayConfig, RemoteConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
