//! Per-agent mailbox
//!
//! Bounded FIFO queue with selective receive. Enqueueing is synchronous so a
//! local dispatch never suspends the sender; receivers park on a [`Notify`]
//! until something arrives, their deadline passes, or they are cancelled.

use super::{Message, Template};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default number of queued messages before dispatch is refused
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Errors raised by the receiving side of a local dispatch
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("mailbox full ({capacity} messages queued)")]
    MailboxFull { capacity: usize },

    #[error("mailbox closed: agent is not running")]
    Closed,

    #[error("message rejected: {0}")]
    Rejected(String),
}

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<Message>,
    open: bool,
}

/// Agent mailbox
#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    /// Create an open mailbox with the given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                open: true,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message and wake every waiting receiver
    pub fn push(&self, message: Message) -> Result<(), DispatchError> {
        {
            let mut state = self.lock();
            if !state.open {
                return Err(DispatchError::Closed);
            }
            if state.queue.len() >= self.capacity {
                return Err(DispatchError::MailboxFull {
                    capacity: self.capacity,
                });
            }
            state.queue.push_back(message);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Remove the oldest message matching `filter` (any message if `None`)
    pub fn take(&self, filter: Option<&Template>) -> Option<Message> {
        let mut state = self.lock();
        let position = match filter {
            Some(template) => state.queue.iter().position(|m| template.matches(m))?,
            None if state.queue.is_empty() => return None,
            None => 0,
        };
        state.queue.remove(position)
    }

    /// Wait for a matching message
    ///
    /// Returns `None` when `timeout` elapses, when `cancelled` resolves, or when
    /// the mailbox is closed with no matching message left. A `None` timeout
    /// waits indefinitely.
    pub async fn recv<F>(
        &self,
        filter: Option<&Template>,
        timeout: Option<Duration>,
        cancelled: F,
    ) -> Option<Message>
    where
        F: Future<Output = ()>,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        tokio::pin!(cancelled);

        loop {
            // Register interest before scanning so a push in between is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.take(filter) {
                return Some(message);
            }
            if !self.is_open() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = &mut cancelled => return None,
                _ = wait_until(deadline) => return None,
            }
        }
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Accept messages again
    pub fn open(&self) {
        self.lock().open = true;
    }

    /// Refuse further messages and wake all receivers
    ///
    /// Already queued messages stay available to `take`.
    pub fn close(&self) {
        self.lock().open = false;
        self.notify.notify_waiters();
    }

    /// Drop every queued message, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.queue.len();
        state.queue.clear();
        count
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
