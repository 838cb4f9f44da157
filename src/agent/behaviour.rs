//! Behaviour runtime
//!
//! A behaviour is a unit of agent logic driven on its own task. Its lifecycle
//! is `Created -> Running -> (Killed | Finished)`; the state is published on a
//! `watch` channel so supervisors and tests can await transitions without
//! racing the behaviour itself.
//!
//! Killing a behaviour interrupts whatever it is awaiting. A pending
//! [`BehaviourContext::receive`] returns `None`; any other pending await is
//! abandoned. `on_end` still runs afterwards.

use super::agent::AgentCore;
use crate::mail::{Address, AddressError, Delivery, Dispatch, Message, RouteError, Template};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Behaviour lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviourState {
    /// Added but not yet started
    Created,

    /// Executing its hooks
    Running,

    /// Cancelled via `kill`
    Killed,

    /// Completed on its own, successfully or with a domain error
    Finished,
}

impl BehaviourState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Killed => "killed",
            Self::Finished => "finished",
        }
    }

    /// Killed and Finished are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Killed | Self::Finished)
    }
}

impl std::fmt::Display for BehaviourState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised from behaviour hooks
#[derive(Debug, Error)]
pub enum BehaviourError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BehaviourError {
    /// Create a domain failure with a message
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        Self::Failed(msg.into())
    }
}

/// Result type for behaviour hooks
pub type BehaviourResult<T = ()> = std::result::Result<T, BehaviourError>;

/// Agent logic
///
/// `run` is called once for one-shot and timeout schedules and repeatedly for
/// cyclic and periodic ones.
#[async_trait]
pub trait Behaviour: Send + 'static {
    /// Called once before the first `run`
    async fn on_start(&mut self, _ctx: &BehaviourContext) -> BehaviourResult {
        Ok(())
    }

    async fn run(&mut self, ctx: &BehaviourContext) -> BehaviourResult;

    /// Called once after the behaviour stops, including after a kill
    async fn on_end(&mut self, _ctx: &BehaviourContext) -> BehaviourResult {
        Ok(())
    }

    /// Repeating schedules stop once this returns true
    fn is_done(&self) -> bool {
        false
    }
}

/// When and how often a behaviour's `run` executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run once
    OneShot,

    /// Run repeatedly until killed or `is_done`
    Cyclic,

    /// Run every `period`, first at `start_at` (or immediately)
    Periodic {
        period: Duration,
        start_at: Option<DateTime<Utc>>,
    },

    /// Run once at `start_at`
    Timeout { start_at: DateTime<Utc> },
}

impl Schedule {
    pub fn periodic(period: Duration) -> Self {
        Self::Periodic {
            period,
            start_at: None,
        }
    }

    pub fn timeout(start_at: DateTime<Utc>) -> Self {
        Self::Timeout { start_at }
    }
}

/// Shared lifecycle state of one behaviour
#[derive(Debug)]
pub(crate) struct BehaviourControl {
    name: String,
    state: watch::Sender<BehaviourState>,
    exited: watch::Sender<bool>,
    last_error: Mutex<Option<String>>,
}

impl BehaviourControl {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: watch::channel(BehaviourState::Created).0,
            exited: watch::channel(false).0,
            last_error: Mutex::new(None),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> BehaviourState {
        *self.state.borrow()
    }

    /// Created -> Running; false if already killed
    fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == BehaviourState::Created {
                *state = BehaviourState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Any non-terminal state -> Killed; false if already terminal
    fn kill(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = BehaviourState::Killed;
                true
            }
        })
    }

    /// Non-terminal -> Finished; a kill that got there first stands
    fn finish(&self) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = BehaviourState::Finished;
                true
            }
        });
    }

    /// Kill a behaviour that will never be driven
    pub(crate) fn abandon(&self) {
        self.kill();
        self.mark_exited();
    }

    /// Resolves once the behaviour has been killed
    async fn killed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == BehaviourState::Killed).await;
    }

    fn record_error(&self, error: String) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn mark_exited(&self) {
        self.exited.send_replace(true);
    }
}

/// Marks the behaviour exited even if its task panics or is aborted
struct ExitGuard(Arc<BehaviourControl>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.finish();
        self.0.mark_exited();
    }
}

/// External handle to a behaviour
#[derive(Debug, Clone)]
pub struct BehaviourHandle {
    control: Arc<BehaviourControl>,
}

impl BehaviourHandle {
    pub(crate) fn new(control: Arc<BehaviourControl>) -> Self {
        Self { control }
    }

    pub fn name(&self) -> &str {
        self.control.name()
    }

    /// Kill the behaviour
    ///
    /// Safe from any thread; killing a terminal behaviour is a no-op.
    pub fn kill(&self) {
        if self.control.kill() {
            tracing::debug!(behaviour = %self.control.name, "Behaviour killed");
        }
    }

    pub fn state(&self) -> BehaviourState {
        self.control.state()
    }

    pub fn is_killed(&self) -> bool {
        self.state() == BehaviourState::Killed
    }

    /// Wait until the behaviour reaches `target` or a terminal state
    pub async fn wait_for(&self, target: BehaviourState) -> BehaviourState {
        let mut rx = self.control.state.subscribe();
        let reached = match rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reached
    }

    /// Wait for the behaviour task to exit and return its terminal state
    ///
    /// A behaviour queued on an agent that never starts resolves once that
    /// agent is stopped or dropped.
    pub async fn join(&self) -> BehaviourState {
        let mut rx = self.control.exited.subscribe();
        let _ = rx.wait_for(|exited| *exited).await;
        self.state()
    }

    /// Text of the most recent domain error, if any
    pub fn last_error(&self) -> Option<String> {
        self.control.last_error()
    }
}

/// What a behaviour's hooks can do
pub struct BehaviourContext {
    core: Arc<AgentCore>,
    control: Arc<BehaviourControl>,
    template: Option<Template>,
}

impl BehaviourContext {
    pub(crate) fn new(
        core: Arc<AgentCore>,
        control: Arc<BehaviourControl>,
        template: Option<Template>,
    ) -> Self {
        Self {
            core,
            control,
            template,
        }
    }

    /// The owning agent's address
    pub fn address(&self) -> &Address {
        self.core.address()
    }

    /// Send a message, filling in the sender if unset
    ///
    /// Local delivery completes without suspending; remote hand-off suspends
    /// until the transport returns.
    pub async fn send(&self, message: Message) -> Result<Delivery, RouteError> {
        self.core.send(message).await
    }

    /// Wait for a message matching this behaviour's template
    ///
    /// Returns `None` on timeout or when the behaviour is killed. A `None`
    /// timeout waits until a message arrives or the behaviour is killed.
    pub async fn receive(&self, timeout: Option<Duration>) -> Option<Message> {
        self.core
            .mailbox()
            .recv(self.template.as_ref(), timeout, self.control.killed())
            .await
    }

    /// Like [`receive`](Self::receive) with an extra filter on top of the
    /// behaviour's template
    pub async fn receive_matching(
        &self,
        template: &Template,
        timeout: Option<Duration>,
    ) -> Option<Message> {
        let filter = self.combined(template);
        self.core
            .mailbox()
            .recv(Some(&filter), timeout, self.control.killed())
            .await
    }

    /// Take a matching message if one is already queued
    pub fn try_receive(&self) -> Option<Message> {
        self.core.mailbox().take(self.template.as_ref())
    }

    /// Kill this behaviour
    pub fn kill(&self) {
        self.control.kill();
    }

    pub fn is_killed(&self) -> bool {
        self.control.state() == BehaviourState::Killed
    }

    fn combined(&self, template: &Template) -> Template {
        match &self.template {
            Some(own) => own.clone() & template.clone(),
            None => template.clone(),
        }
    }
}

/// Drive a behaviour to a terminal state
pub(crate) async fn drive(
    mut behaviour: Box<dyn Behaviour>,
    schedule: Schedule,
    ctx: BehaviourContext,
) {
    let control = ctx.control.clone();
    let _guard = ExitGuard(control.clone());

    if !control.begin() {
        tracing::debug!(behaviour = %control.name, "Behaviour killed before start");
        metrics::record_behaviour_exit(control.state());
        return;
    }
    tracing::debug!(behaviour = %control.name, agent = %ctx.address(), "Behaviour started");

    // Run is polled first, so a kill lets a pending receive return before
    // the remaining body is abandoned.
    let outcome = tokio::select! {
        biased;
        result = run_schedule(behaviour.as_mut(), &schedule, &ctx) => result,
        _ = control.killed() => Ok(()),
    };

    let end = behaviour.on_end(&ctx).await;

    if let Err(e) = outcome.and(end) {
        let error = e.to_string();
        tracing::error!(
            behaviour = %control.name,
            agent = %ctx.address(),
            error = %error,
            "Behaviour failed"
        );
        control.record_error(error.clone());
        ctx.core.report_failure(control.name(), error);
    }

    control.finish();
    let state = control.state();
    metrics::record_behaviour_exit(state);
    tracing::debug!(behaviour = %control.name, state = %state, "Behaviour exited");
}

async fn run_schedule(
    behaviour: &mut dyn Behaviour,
    schedule: &Schedule,
    ctx: &BehaviourContext,
) -> BehaviourResult {
    behaviour.on_start(ctx).await?;

    match schedule {
        Schedule::OneShot => behaviour.run(ctx).await,
        Schedule::Cyclic => loop {
            behaviour.run(ctx).await?;
            if behaviour.is_done() || ctx.is_killed() {
                return Ok(());
            }
            tokio::task::yield_now().await;
        },
        Schedule::Periodic { period, start_at } => {
            if let Some(start_at) = start_at {
                sleep_until(*start_at).await;
            }
            let mut interval = tokio::time::interval((*period).max(Duration::from_millis(1)));
            loop {
                interval.tick().await;
                behaviour.run(ctx).await?;
                if behaviour.is_done() || ctx.is_killed() {
                    return Ok(());
                }
            }
        }
        Schedule::Timeout { start_at } => {
            sleep_until(*start_at).await;
            behaviour.run(ctx).await
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
