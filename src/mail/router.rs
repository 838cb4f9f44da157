//! Router - local short-circuit or remote hand-off
//!
//! For every outbound message the router asks the registry whether the
//! recipient lives in this process. If it does, the message is dispatched
//! straight into the recipient's mailbox; otherwise it goes to the sender's
//! remote transport. The decision is made fresh on every call.
//!
//! The local path never awaits, so a chain of local sends completes within a
//! single scheduling turn.

use super::{DispatchError, Message, Registry, RemoteTransport, TransportError};
use crate::metrics;
use std::sync::Arc;
use thiserror::Error;

/// Routing errors, propagated unchanged to the sending behaviour
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("local dispatch to {to} failed: {source}")]
    Dispatch {
        to: String,
        #[source]
        source: DispatchError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Which path a routed message took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued into a local agent's mailbox
    Local,
    /// Handed to the remote transport
    Remote,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Local => "local",
            Delivery::Remote => "remote",
        }
    }
}

/// Message router backed by a registry
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    /// Create a router that consults the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this router consults
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route a message
    pub async fn route(
        &self,
        message: Message,
        transport: &dyn RemoteTransport,
    ) -> Result<Delivery, RouteError> {
        // One read covers both the membership check and the handle fetch.
        if let Some(handle) = self.registry.lookup(&message.to) {
            return Self::deliver_local(handle.as_ref(), message);
        }
        Self::deliver_remote(message, transport).await
    }

    fn deliver_local(
        handle: &dyn super::Dispatch,
        message: Message,
    ) -> Result<Delivery, RouteError> {
        let to = message.to.to_string();
        tracing::debug!(to = %to, id = message.id.as_str(), "Routing message locally");

        match handle.dispatch(message) {
            Ok(()) => {
                metrics::record_routed(Delivery::Local);
                Ok(Delivery::Local)
            }
            Err(source) => {
                metrics::record_route_failure(Delivery::Local);
                tracing::warn!(to = %to, error = %source, "Local dispatch failed");
                Err(RouteError::Dispatch { to, source })
            }
        }
    }

    /// Hand a message to the remote transport without consulting any registry
    pub async fn deliver_remote(
        message: Message,
        transport: &dyn RemoteTransport,
    ) -> Result<Delivery, RouteError> {
        tracing::debug!(
            to = %message.to,
            id = message.id.as_str(),
            "Handing message to remote transport"
        );

        match transport.send(&message).await {
            Ok(()) => {
                metrics::record_routed(Delivery::Remote);
                Ok(Delivery::Remote)
            }
            Err(e) => {
                metrics::record_route_failure(Delivery::Remote);
                tracing::warn!(to = %message.to, error = %e, "Remote hand-off failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{Address, Dispatch};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Message>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteTransport for RecordingTransport {
        async fn send(&self, message: &Message) -> crate::mail::transport::Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(TransportError::other("unreachable"))
            } else {
                Ok(())
            }
        }
    }

    struct RecordingAgent {
        address: Address,
        received: Mutex<Vec<Message>>,
        reject: bool,
    }

    impl RecordingAgent {
        fn new(address: &str, reject: bool) -> Arc<Self> {
            Arc::new(Self {
                address: address.parse().unwrap(),
                received: Mutex::new(Vec::new()),
                reject,
            })
        }
    }

    impl Dispatch for RecordingAgent {
        fn address(&self) -> &Address {
            &self.address
        }

        fn dispatch(&self, message: Message) -> Result<(), DispatchError> {
            if self.reject {
                return Err(DispatchError::Rejected("busy".to_string()));
            }
            self.received.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_local_recipient_short_circuits() {
        let registry = Arc::new(Registry::new());
        let receiver = RecordingAgent::new("b@server", false);
        registry.register(receiver.clone());

        let router = Router::new(registry);
        let transport = RecordingTransport::default();
        let message = Message::parse_to("b@server").unwrap().with_body("hi");

        let delivery = router.route(message, &transport).await.unwrap();

        assert_eq!(delivery, Delivery::Local);
        let received = receiver.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].to.to_string(), "b@server");
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_recipient_goes_remote() {
        let router = Router::new(Arc::new(Registry::new()));
        let transport = RecordingTransport::default();
        let message = Message::parse_to("x@outside").unwrap();
        let expected = message.clone();

        let delivery = router.route(message, &transport).await.unwrap();

        assert_eq!(delivery, Delivery::Remote);
        assert_eq!(*transport.sent.lock().unwrap(), vec![expected]);
    }

    #[tokio::test]
    async fn test_resource_does_not_affect_locality() {
        let registry = Arc::new(Registry::new());
        let receiver = RecordingAgent::new("b@server", false);
        registry.register(receiver.clone());

        let router = Router::new(registry);
        let transport = RecordingTransport::default();
        let message = Message::parse_to("b@server/mobile").unwrap();

        assert_eq!(
            router.route(message, &transport).await.unwrap(),
            Delivery::Local
        );
        assert_eq!(
            receiver.received.lock().unwrap()[0].to.to_string(),
            "b@server/mobile"
        );
    }

    #[tokio::test]
    async fn test_decision_is_not_cached() {
        let registry = Arc::new(Registry::new());
        let receiver = RecordingAgent::new("b@server", false);
        let router = Router::new(registry.clone());
        let transport = RecordingTransport::default();

        let first = Message::parse_to("b@server").unwrap();
        assert_eq!(
            router.route(first, &transport).await.unwrap(),
            Delivery::Remote
        );

        registry.register(receiver.clone());
        let second = Message::parse_to("b@server").unwrap();
        assert_eq!(
            router.route(second, &transport).await.unwrap(),
            Delivery::Local
        );

        registry.unregister(&"b@server".parse().unwrap());
        let third = Message::parse_to("b@server").unwrap();
        assert_eq!(
            router.route(third, &transport).await.unwrap(),
            Delivery::Remote
        );

        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert_eq!(receiver.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_error_propagates() {
        let registry = Arc::new(Registry::new());
        let receiver = RecordingAgent::new("b@server", true);
        registry.register(receiver.clone());

        let router = Router::new(registry);
        let transport = RecordingTransport::default();
        let result = router
            .route(Message::parse_to("b@server").unwrap(), &transport)
            .await;

        assert!(matches!(
            result,
            Err(RouteError::Dispatch {
                source: DispatchError::Rejected(_),
                ..
            })
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let router = Router::new(Arc::new(Registry::new()));
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };

        let result = router
            .route(Message::parse_to("x@outside").unwrap(), &transport)
            .await;

        assert!(matches!(
            result,
            Err(RouteError::Transport(TransportError::Other(_)))
        ));
    }
}
