//! Agent lifecycle
//!
//! An [`Agent`] owns a mailbox, an optional seat in a [`Registry`], a remote
//! transport, and a set of behaviours. Building an agent with a registry
//! registers it, so it can receive local messages before it starts. Starting
//! spawns its behaviours; stopping kills them, waits for them to exit, and
//! unregisters.

use super::behaviour::{
    self, Behaviour, BehaviourContext, BehaviourControl, BehaviourHandle, Schedule,
};
use crate::config::AgentDefaults;
use crate::mail::{
    Address, Delivery, Dispatch, DispatchError, Mailbox, Message, Registry, RemoteTransport,
    RouteError, Router, Template, UnroutableTransport, DEFAULT_MAILBOX_CAPACITY,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::runtime::Handle;

/// Agent lifecycle errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent {0} is already running")]
    AlreadyRunning(String),

    #[error("agent {0} has been stopped")]
    Stopped(String),

    #[error("no tokio runtime available to start agent: {0}")]
    NoRuntime(String),
}

/// Agent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,
    Running,
    Stopped,
}

/// A behaviour that ended with a domain error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviourFailure {
    pub behaviour: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// State shared between an agent, its behaviours, and the registry
pub(crate) struct AgentCore {
    address: Address,
    mailbox: Mailbox,
    router: Option<Router>,
    transport: Arc<dyn RemoteTransport>,
    failures: Mutex<Vec<BehaviourFailure>>,
}

impl AgentCore {
    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Route a message on behalf of this agent
    pub(crate) async fn send(&self, mut message: Message) -> Result<Delivery, RouteError> {
        if message.from.is_none() {
            message.from = Some(self.address.clone());
        }

        match &self.router {
            Some(router) => router.route(message, self.transport.as_ref()).await,
            // Not in a registry: every send is a remote hand-off.
            None => Router::deliver_remote(message, self.transport.as_ref()).await,
        }
    }

    pub(crate) fn report_failure(&self, behaviour: &str, error: String) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(BehaviourFailure {
                behaviour: behaviour.to_string(),
                error,
                at: Utc::now(),
            });
    }
}

impl Dispatch for AgentCore {
    fn address(&self) -> &Address {
        &self.address
    }

    fn dispatch(&self, message: Message) -> Result<(), DispatchError> {
        tracing::trace!(
            agent = %self.address,
            id = message.id.as_str(),
            "Dispatching into mailbox"
        );
        self.mailbox.push(message)
    }
}

struct PendingBehaviour {
    behaviour: Box<dyn Behaviour>,
    schedule: Schedule,
    control: Arc<BehaviourControl>,
    template: Option<Template>,
}

struct Lifecycle {
    status: AgentStatus,
    runtime: Option<Handle>,
    pending: Vec<PendingBehaviour>,
    behaviours: Vec<BehaviourHandle>,
}

/// A locally running agent
pub struct Agent {
    core: Arc<AgentCore>,
    registry: Option<Arc<Registry>>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("address", &self.core.address)
            .field("status", &self.status())
            .field("registered", &self.registry.is_some())
            .finish()
    }
}

impl Agent {
    /// Start building an agent with the given address
    pub fn builder(address: Address) -> AgentBuilder {
        AgentBuilder::new(address)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn address(&self) -> &Address {
        &self.core.address
    }

    pub fn status(&self) -> AgentStatus {
        self.lifecycle().status
    }

    /// Whether this agent participates in local routing
    pub fn uses_registry(&self) -> bool {
        self.registry.is_some()
    }

    /// Spawn all queued behaviours
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), AgentError> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.status {
            AgentStatus::Running => {
                return Err(AgentError::AlreadyRunning(self.core.address.to_string()))
            }
            AgentStatus::Stopped => return Err(AgentError::Stopped(self.core.address.to_string())),
            AgentStatus::Created => {}
        }

        let runtime = Handle::try_current().map_err(|e| AgentError::NoRuntime(e.to_string()))?;

        let pending = std::mem::take(&mut lifecycle.pending);
        let count = pending.len();
        for behaviour in pending {
            self.spawn(&runtime, behaviour);
        }

        lifecycle.status = AgentStatus::Running;
        lifecycle.runtime = Some(runtime);

        tracing::info!(
            agent = %self.core.address,
            behaviours = count,
            registered = self.registry.is_some(),
            "Agent started"
        );
        Ok(())
    }

    /// Kill every behaviour, wait for them to exit, then unregister
    pub async fn stop(&self) {
        let handles = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.status {
                AgentStatus::Stopped => return,
                AgentStatus::Created => {
                    lifecycle.status = AgentStatus::Stopped;
                    for pending in lifecycle.pending.drain(..) {
                        pending.control.abandon();
                    }
                    drop(lifecycle);
                    self.leave();
                    tracing::info!(agent = %self.core.address, "Agent stopped before start");
                    return;
                }
                AgentStatus::Running => {}
            }
            lifecycle.status = AgentStatus::Stopped;
            lifecycle.runtime = None;
            lifecycle.behaviours.clone()
        };

        for handle in &handles {
            handle.kill();
        }
        futures::future::join_all(handles.iter().map(|handle| handle.join())).await;

        self.leave();
        tracing::info!(agent = %self.core.address, "Agent stopped");
    }

    fn leave(&self) {
        if let Some(registry) = &self.registry {
            registry.unregister_handle(&self.handle());
        }
        let discarded = self.core.mailbox.clear();
        self.core.mailbox.close();
        if discarded > 0 {
            tracing::debug!(agent = %self.core.address, discarded, "Discarded queued messages");
        }
    }

    /// Add a behaviour
    ///
    /// Starts immediately if the agent is running; otherwise it starts with
    /// the agent. `template` filters what the behaviour's `receive` returns.
    pub fn add_behaviour<B: Behaviour>(
        &self,
        behaviour: B,
        schedule: Schedule,
        template: Option<Template>,
    ) -> BehaviourHandle {
        let control = BehaviourControl::new(short_type_name::<B>());
        let handle = BehaviourHandle::new(control.clone());
        let pending = PendingBehaviour {
            behaviour: Box::new(behaviour),
            schedule,
            control,
            template,
        };

        let mut lifecycle = self.lifecycle();
        lifecycle.behaviours.push(handle.clone());
        let runtime = lifecycle.runtime.clone();
        match (lifecycle.status, runtime) {
            (AgentStatus::Running, Some(runtime)) => self.spawn(&runtime, pending),
            (AgentStatus::Stopped, _) => {
                pending.control.abandon();
                tracing::warn!(
                    agent = %self.core.address,
                    behaviour = handle.name(),
                    "Behaviour added to stopped agent"
                );
            }
            _ => lifecycle.pending.push(pending),
        }
        handle
    }

    fn spawn(&self, runtime: &Handle, pending: PendingBehaviour) {
        let ctx = BehaviourContext::new(self.core.clone(), pending.control, pending.template);
        runtime.spawn(behaviour::drive(pending.behaviour, pending.schedule, ctx));
    }

    /// Handles of every behaviour added so far
    pub fn behaviours(&self) -> Vec<BehaviourHandle> {
        self.lifecycle().behaviours.clone()
    }

    /// The handle the registry stores for this agent
    pub fn handle(&self) -> Arc<dyn Dispatch> {
        self.core.clone()
    }

    /// Enqueue a message into this agent's mailbox
    pub fn dispatch(&self, message: Message) -> Result<(), DispatchError> {
        self.core.dispatch(message)
    }

    /// Send a message from this agent outside of any behaviour
    pub async fn send(&self, message: Message) -> Result<Delivery, RouteError> {
        self.core.send(message).await
    }

    /// Number of messages waiting in the mailbox
    pub fn mailbox_len(&self) -> usize {
        self.core.mailbox.len()
    }

    /// Domain errors reported by this agent's behaviours
    pub fn failures(&self) -> Vec<BehaviourFailure> {
        self.core
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if lifecycle.status == AgentStatus::Stopped {
            return;
        }
        for pending in lifecycle.pending.drain(..) {
            pending.control.abandon();
        }
        for handle in &lifecycle.behaviours {
            handle.kill();
        }
        self.leave();
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    address: Address,
    registry: Option<Arc<Registry>>,
    use_registry: bool,
    transport: Option<Arc<dyn RemoteTransport>>,
    mailbox_capacity: usize,
}

impl AgentBuilder {
    fn new(address: Address) -> Self {
        Self {
            address,
            registry: None,
            use_registry: true,
            transport: None,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    /// Opt in to local routing through this registry
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Remote transport used when the recipient is not local
    pub fn transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Apply configured defaults
    ///
    /// `use_registry: false` opts the agent out even if a registry was given.
    pub fn from_config(mut self, defaults: &AgentDefaults) -> Self {
        self.mailbox_capacity = defaults.mailbox_capacity;
        self.use_registry = defaults.use_registry;
        self
    }

    pub fn build(self) -> Agent {
        let registry = self.registry.filter(|_| self.use_registry);
        let router = registry.as_ref().map(|r| Router::new(r.clone()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UnroutableTransport));

        let core = Arc::new(AgentCore {
            address: self.address,
            mailbox: Mailbox::new(self.mailbox_capacity),
            router,
            transport,
            failures: Mutex::new(Vec::new()),
        });
        if let Some(registry) = &registry {
            registry.register(core.clone());
        }

        Agent {
            core,
            registry,
            lifecycle: Mutex::new(Lifecycle {
                status: AgentStatus::Created,
                runtime: None,
                pending: Vec::new(),
                behaviours: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{BehaviourResult, BehaviourState};
    use std::time::Duration;

    struct Noop;

    #[async_trait::async_trait]
    impl Behaviour for Noop {
        async fn run(&mut self, _ctx: &BehaviourContext) -> BehaviourResult {
            Ok(())
        }
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Noop>(), "Noop");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn test_builder_defaults() {
        let agent = Agent::builder(addr("a@server")).build();
        assert_eq!(agent.status(), AgentStatus::Created);
        assert!(!agent.uses_registry());
        assert_eq!(agent.core.mailbox.capacity(), DEFAULT_MAILBOX_CAPACITY);
    }

    #[test]
    fn test_from_config_can_opt_out_of_registry() {
        let defaults = AgentDefaults {
            mailbox_capacity: 4,
            use_registry: false,
        };
        let agent = Agent::builder(addr("a@server"))
            .registry(Arc::new(Registry::new()))
            .from_config(&defaults)
            .build();
        assert!(!agent.uses_registry());
        assert_eq!(agent.core.mailbox.capacity(), 4);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let agent = Agent::builder(addr("a@server")).build();
        assert!(matches!(agent.start(), Err(AgentError::NoRuntime(_))));
        assert_eq!(agent.status(), AgentStatus::Created);
    }

    #[tokio::test]
    async fn test_build_registers_and_stop_unregisters() {
        let registry = Arc::new(Registry::new());
        let agent = Agent::builder(addr("a@server"))
            .registry(registry.clone())
            .build();
        assert!(registry.has_agent(&addr("a@server")));

        agent.start().unwrap();
        assert!(registry.has_agent(&addr("a@server")));
        assert!(matches!(agent.start(), Err(AgentError::AlreadyRunning(_))));

        agent.stop().await;
        assert!(!registry.has_agent(&addr("a@server")));
        assert_eq!(agent.status(), AgentStatus::Stopped);
        assert_eq!(
            agent.dispatch(Message::new(addr("a@server"))),
            Err(DispatchError::Closed)
        );
    }

    #[tokio::test]
    async fn test_one_shot_behaviour_finishes() {
        let agent = Agent::builder(addr("a@server")).build();
        let handle = agent.add_behaviour(Noop, Schedule::OneShot, None);
        assert_eq!(handle.state(), BehaviourState::Created);

        agent.start().unwrap();
        let state = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
        assert_eq!(state, BehaviourState::Finished);
        assert!(agent.failures().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_registry_uses_transport() {
        let agent = Agent::builder(addr("a@server")).build();
        let result = agent.send(Message::new(addr("b@server"))).await;
        assert!(matches!(
            result,
            Err(RouteError::Transport(crate::mail::TransportError::NotConfigured(_)))
        ));
    }

    #[tokio::test]
    async fn test_dropping_running_agent_unregisters() {
        let registry = Arc::new(Registry::new());
        let agent = Agent::builder(addr("a@server"))
            .registry(registry.clone())
            .build();
        agent.start().unwrap();
        drop(agent);
        assert!(!registry.has_agent(&addr("a@server")));
    }

    #[tokio::test]
    async fn test_stop_before_start_unregisters() {
        let registry = Arc::new(Registry::new());
        let agent = Agent::builder(addr("a@server"))
            .registry(registry.clone())
            .build();

        agent.stop().await;
        assert!(!registry.has_agent(&addr("a@server")));
        assert!(matches!(agent.start(), Err(AgentError::Stopped(_))));
    }

    #[tokio::test]
    async fn test_dropping_unstarted_agent_ends_queued_behaviours() {
        let registry = Arc::new(Registry::new());
        let agent = Agent::builder(addr("a@server"))
            .registry(registry.clone())
            .build();
        let handle = agent.add_behaviour(Noop, Schedule::OneShot, None);

        drop(agent);
        let state = tokio::time::timeout(Duration::from_millis(300), handle.join())
            .await
            .unwrap();
        assert_eq!(state, BehaviourState::Killed);
        assert!(!registry.has_agent(&addr("a@server")));
    }
}
