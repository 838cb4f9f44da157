//! Log output for the agentbus binary
//!
//! Every component logs through `tracing` under its module path, so
//! `RUST_LOG` can raise one part of the container without the rest:
//!
//! - `agentbus::mail::router` - local vs remote routing decisions (debug)
//! - `agentbus::mail::registry` - register, replace, unregister (debug, warn)
//! - `agentbus::mail::server` - relay deliveries and refusals
//! - `agentbus::agent` - agent start/stop and behaviour failures
//!
//! With `RUST_LOG` unset only warnings and errors are printed.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "warn";

/// Build the filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber, writing to stderr
///
/// Stdout stays free for command output such as `agentbus ping` results.
///
/// # Example RUST_LOG values
/// - `RUST_LOG=agentbus::mail::router=debug` - trace every routing decision
/// - `RUST_LOG=agentbus::agent=info,agentbus::mail=warn` - lifecycle only
/// - `RUST_LOG=agentbus=debug,axum=info` - container detail plus relay requests
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init() -> crate::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| crate::AgentBusError::Other(format!("Failed to initialize tracing: {}", e)))
}
