//! agentbus - in-process agent container with remote fallback
//!
//! Agents living in the same process exchange messages through a shared
//! registry without touching the network; messages for anyone else are handed
//! to a remote transport.
//!
//! # Architecture
//!
//! - **mail**: Addresses, messages, mailboxes, the registry and the router,
//!   plus the HTTP transport and relay server for the remote path
//! - **agent**: Agent lifecycle and the behaviour runtime (send, receive, kill)
//! - **config**: YAML configuration
//! - **metrics**: Prometheus counters for routing and behaviour exits

// Core modules
pub mod agent;
pub mod config;
pub mod error;
pub mod mail;

// Ambient
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{AgentBusError, Result};
