//! Message templates
//!
//! A [`Template`] is a predicate over messages used by selective receive.
//! Field constraints are compared for equality; unset fields match anything.
//!
//! ```
//! use agentbus::mail::{Message, Template};
//!
//! let inform = Template::new().with_metadata("performative", "inform");
//! let from_boss = Template::new().with_sender("boss@hq".parse().unwrap());
//! let filter = inform & !from_boss;
//!
//! let msg = Message::parse_to("me@hq").unwrap().with_performative("inform");
//! assert!(filter.matches(&msg));
//! ```

use super::{Address, Message};
use std::collections::BTreeMap;
use std::ops::{BitAnd, BitOr, Not};

/// Field-level constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTemplate {
    pub to: Option<Address>,
    pub sender: Option<Address>,
    pub body: Option<String>,
    pub thread: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl FieldTemplate {
    fn matches(&self, message: &Message) -> bool {
        if let Some(to) = &self.to {
            if !address_matches(to, &message.to) {
                return false;
            }
        }

        if let Some(sender) = &self.sender {
            match &message.from {
                Some(from) if address_matches(sender, from) => {}
                _ => return false,
            }
        }

        if let Some(body) = &self.body {
            if message.body.as_deref() != Some(body.as_str()) {
                return false;
            }
        }

        if let Some(thread) = &self.thread {
            if message.thread.as_deref() != Some(thread.as_str()) {
                return false;
            }
        }

        self.metadata
            .iter()
            .all(|(key, value)| message.get_metadata(key) == Some(value.as_str()))
    }
}

/// A bare constraint matches any resource; a full one must match exactly
fn address_matches(expected: &Address, actual: &Address) -> bool {
    if expected.is_bare() {
        expected.same_bare(actual)
    } else {
        expected == actual
    }
}

/// Message filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Fields(FieldTemplate),
    And(Box<Template>, Box<Template>),
    Or(Box<Template>, Box<Template>),
    Not(Box<Template>),
}

impl Template {
    /// A template that matches every message
    pub fn new() -> Self {
        Template::Fields(FieldTemplate::default())
    }

    /// Check a message against this template
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Template::Fields(fields) => fields.matches(message),
            Template::And(a, b) => a.matches(message) && b.matches(message),
            Template::Or(a, b) => a.matches(message) || b.matches(message),
            Template::Not(inner) => !inner.matches(message),
        }
    }

    pub fn with_to(self, to: Address) -> Self {
        self.map_fields(|f| f.to = Some(to))
    }

    pub fn with_sender(self, sender: Address) -> Self {
        self.map_fields(|f| f.sender = Some(sender))
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.map_fields(|f| f.body = Some(body))
    }

    pub fn with_thread(self, thread: impl Into<String>) -> Self {
        let thread = thread.into();
        self.map_fields(|f| f.thread = Some(thread))
    }

    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.map_fields(|f| {
            f.metadata.insert(key, value);
        })
    }

    // Builders on a composite template add a new conjunct.
    fn map_fields(self, apply: impl FnOnce(&mut FieldTemplate)) -> Self {
        match self {
            Template::Fields(mut fields) => {
                apply(&mut fields);
                Template::Fields(fields)
            }
            other => {
                let mut fields = FieldTemplate::default();
                apply(&mut fields);
                Template::And(Box::new(other), Box::new(Template::Fields(fields)))
            }
        }
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl BitAnd for Template {
    type Output = Template;

    fn bitand(self, rhs: Template) -> Template {
        Template::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Template {
    type Output = Template;

    fn bitor(self, rhs: Template) -> Template {
        Template::Or(Box::new(self), Box::new(rhs))
    }
}

impl Not for Template {
    type Output = Template;

    fn not(self) -> Template {
        Template::Not(Box::new(self))
    }
}
