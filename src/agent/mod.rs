//! Agents and behaviours
//!
//! An agent is a mailbox plus a set of behaviours. Behaviours send through the
//! agent's router and receive from its mailbox; each one can be killed
//! independently.
//!
//! # Example
//!
//! ```no_run
//! use agentbus::agent::{Agent, Behaviour, BehaviourContext, BehaviourResult, Schedule};
//! use agentbus::mail::{Message, Registry};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Behaviour for Greeter {
//!     async fn run(&mut self, ctx: &BehaviourContext) -> BehaviourResult {
//!         ctx.send(Message::parse_to("b@server")?.with_body("hello")).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(Registry::new());
//!     let agent = Agent::builder("a@server".parse().unwrap())
//!         .registry(registry)
//!         .build();
//!     let handle = agent.add_behaviour(Greeter, Schedule::OneShot, None);
//!     agent.start().unwrap();
//!     handle.join().await;
//! }
//! ```

#[allow(clippy::module_inception)]
mod agent;
mod behaviour;

pub use agent::{Agent, AgentBuilder, AgentError, AgentStatus, BehaviourFailure};
pub use behaviour::{
    Behaviour, BehaviourContext, BehaviourError, BehaviourHandle, BehaviourResult,
    BehaviourState, Schedule,
};
