//! Message envelope
//!
//! A [`Message`] is built by the sending behaviour, then moved into the
//! router. Once routed it is never mutated again.

use super::{Address, AddressError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key carrying the FIPA-style performative (`inform`, `request`, ...)
pub const PERFORMATIVE_KEY: &str = "performative";

/// Unique message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new message ID
    pub fn new() -> Self {
        Self(format!(
            "msg-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            unique_suffix()
        ))
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:04x}", nanos, counter)
}

/// Complete message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// Recipient address
    pub to: Address,

    /// Sender address, filled in by the sending behaviour when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Conversation / correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Free-form string metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create an empty message for a recipient
    pub fn new(to: Address) -> Self {
        Self {
            id: MessageId::new(),
            to,
            from: None,
            body: None,
            thread: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message from a textual recipient address
    pub fn parse_to(to: impl AsRef<str>) -> Result<Self, AddressError> {
        Ok(Self::new(to.as_ref().parse()?))
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the thread id
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Set the sender explicitly
    pub fn with_sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the performative metadata entry
    pub fn with_performative(self, performative: impl Into<String>) -> Self {
        self.with_metadata(PERFORMATIVE_KEY, performative)
    }

    /// Get the performative metadata entry
    pub fn performative(&self) -> Option<&str> {
        self.get_metadata(PERFORMATIVE_KEY)
    }

    /// Look up a metadata value
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Build a reply addressed to this message's sender
    ///
    /// The reply keeps the thread and metadata and is sent from this
    /// message's recipient. Returns `None` if the sender is unknown.
    pub fn make_reply(&self) -> Option<Message> {
        let to = self.from.clone()?;
        Some(Self {
            id: MessageId::new(),
            to,
            from: Some(self.to.clone()),
            body: None,
            thread: self.thread.clone(),
            metadata: self.metadata.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Get the sender's address
    pub fn sender(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    /// Get the recipient's address
    pub fn recipient(&self) -> &Address {
        &self.to
    }
}
