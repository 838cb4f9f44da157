//! Prometheus metrics for the agent container
//!
//! Counters for routed messages and behaviour exits, plus a gauge tracking the
//! number of registered local agents. Exposed by the relay server at `/metrics`.

use crate::agent::BehaviourState;
use crate::mail::Delivery;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, CounterVec, Encoder, Gauge, TextEncoder,
};

lazy_static! {
    /// Counter: messages routed, by path (local/remote)
    pub static ref ROUTED_MESSAGES: CounterVec = register_counter_vec!(
        "agentbus_routed_messages_total",
        "Total messages routed by delivery path",
        &["path"]
    )
    .expect("Failed to create routed_messages metric");

    /// Counter: routing failures, by path
    pub static ref ROUTE_FAILURES: CounterVec = register_counter_vec!(
        "agentbus_route_failures_total",
        "Total routing failures by delivery path",
        &["path"]
    )
    .expect("Failed to create route_failures metric");

    /// Counter: behaviour exits by final state
    pub static ref BEHAVIOUR_EXITS: CounterVec = register_counter_vec!(
        "agentbus_behaviour_exits_total",
        "Total behaviour exits by final state",
        &["state"]
    )
    .expect("Failed to create behaviour_exits metric");

    /// Gauge: registered local agents
    pub static ref REGISTERED_AGENTS: Gauge = register_gauge!(
        "agentbus_registered_agents",
        "Live agents in the most recently updated registry"
    )
    .expect("Failed to create registered_agents metric");
}

/// Record a successfully routed message
pub fn record_routed(path: Delivery) {
    ROUTED_MESSAGES.with_label_values(&[path.as_str()]).inc();
}

/// Record a routing failure
pub fn record_route_failure(path: Delivery) {
    ROUTE_FAILURES.with_label_values(&[path.as_str()]).inc();
}

/// Record a behaviour reaching a terminal state
pub fn record_behaviour_exit(state: BehaviourState) {
    BEHAVIOUR_EXITS.with_label_values(&[state.as_str()]).inc();
}

/// Set the registered agent count
pub fn set_registered_agents(count: usize) {
    REGISTERED_AGENTS.set(count as f64);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
