//! Agent registry
//!
//! Maps canonical agent addresses to the handles of agents running in this
//! process. The registry only holds weak references: agents own themselves,
//! and an agent that was dropped without unregistering simply reads as absent.
//!
//! All reads and writes go through one `RwLock` around the whole map, so a
//! lookup never observes a half-applied register or unregister.
//!
//! # Example
//!
//! ```
//! use agentbus::mail::{Address, Dispatch, DispatchError, Message, Registry};
//! use std::sync::Arc;
//!
//! struct Sink(Address);
//!
//! impl Dispatch for Sink {
//!     fn address(&self) -> &Address { &self.0 }
//!     fn dispatch(&self, _message: Message) -> Result<(), DispatchError> { Ok(()) }
//! }
//!
//! let registry = Registry::new();
//! let sink = Arc::new(Sink("sink@local".parse().unwrap()));
//! registry.register(sink.clone());
//!
//! assert!(registry.has_agent(&"sink@local/any".parse().unwrap()));
//! ```

use super::{Address, DispatchError, Message};
use crate::metrics;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no local agent registered for {0}")]
    NotFound(String),
}

/// Capability the router needs from a local agent
///
/// `dispatch` must not suspend: it is called synchronously on the sender's
/// task for every local delivery.
pub trait Dispatch: Send + Sync {
    /// The agent's own address; its canonical form is the registry key
    fn address(&self) -> &Address;

    /// Enqueue a message into the agent's mailbox
    fn dispatch(&self, message: Message) -> Result<(), DispatchError>;
}

/// Process-local agent registry
#[derive(Default)]
pub struct Registry {
    agents: RwLock<HashMap<String, Weak<dyn Dispatch>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("agents", &self.addresses())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Weak<dyn Dispatch>>> {
        self.agents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Weak<dyn Dispatch>>> {
        self.agents.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an agent under its canonical address
    ///
    /// An existing entry for the same address is replaced (last writer wins).
    /// Entries whose agents were dropped without unregistering are pruned.
    pub fn register(&self, agent: Arc<dyn Dispatch>) {
        let key = agent.address().canonical();
        let replaced = {
            let mut agents = self.write();
            agents.retain(|_, entry| entry.strong_count() > 0);
            let replaced = agents.insert(key.clone(), Arc::downgrade(&agent));
            metrics::set_registered_agents(agents.len());
            replaced
        };

        if replaced.is_some() {
            tracing::warn!(address = %key, "Replacing live registration");
        } else {
            tracing::debug!(address = %key, "Registered local agent");
        }
    }

    /// Remove an agent's registration; absent addresses are ignored
    pub fn unregister(&self, address: &Address) {
        let key = address.canonical();
        let mut agents = self.write();
        if agents.remove(&key).is_some() {
            tracing::debug!(address = %key, "Unregistered local agent");
        }
        metrics::set_registered_agents(live_count(&agents));
    }

    /// Remove the registration only if it still points at `agent`
    ///
    /// Lets a replaced agent leave without evicting its replacement.
    pub fn unregister_handle(&self, agent: &Arc<dyn Dispatch>) {
        let key = agent.address().canonical();
        let mut agents = self.write();
        let owned = agents
            .get(&key)
            .is_some_and(|current| std::ptr::addr_eq(current.as_ptr(), Arc::as_ptr(agent)));
        if owned {
            agents.remove(&key);
            tracing::debug!(address = %key, "Unregistered local agent");
        }
        metrics::set_registered_agents(live_count(&agents));
    }

    /// Fetch a live handle in a single read
    pub fn lookup(&self, address: &Address) -> Option<Arc<dyn Dispatch>> {
        self.read()
            .get(&address.canonical())
            .and_then(Weak::upgrade)
    }

    /// Check whether a live agent is registered for the address
    pub fn has_agent(&self, address: &Address) -> bool {
        self.lookup(address).is_some()
    }

    /// Get the handle registered for the address
    pub fn get_agent(&self, address: &Address) -> Result<Arc<dyn Dispatch>, RegistryError> {
        self.lookup(address)
            .ok_or_else(|| RegistryError::NotFound(address.canonical()))
    }

    /// Remove every registration
    ///
    /// Meant for process or test initialisation; callers must not reset while
    /// agents are actively routing.
    pub fn reset(&self) {
        let mut agents = self.write();
        let count = agents.len();
        agents.clear();
        metrics::set_registered_agents(0);
        tracing::debug!(cleared = count, "Registry reset");
    }

    /// Canonical addresses of all live registrations, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, agent)| agent.strong_count() > 0)
            .map(|(key, _)| key.clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        live_count(&self.read())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn live_count(agents: &HashMap<String, Weak<dyn Dispatch>>) -> usize {
    agents
        .values()
        .filter(|agent| agent.strong_count() > 0)
        .count()
}
