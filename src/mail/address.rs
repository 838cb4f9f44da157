//! Agent addressing
//!
//! Provides type-safe addressing for agents, local or remote.
//!
//! # Address Format
//!
//! Addresses follow a JID-like format: `local@domain[/resource]`
//!
//! - `worker@server` - Bare address of an agent
//! - `worker@server/laptop` - Same agent, qualified with a resource
//!
//! Routing only ever looks at the bare `local@domain` part. The resource is kept
//! on the message so the remote transport can use it.
//!
//! # Examples
//!
//! ```
//! use agentbus::mail::Address;
//!
//! let addr: Address = "worker@server/laptop".parse().unwrap();
//! assert_eq!(addr.local(), "worker");
//! assert_eq!(addr.domain(), "server");
//! assert_eq!(addr.resource(), Some("laptop"));
//! assert_eq!(addr.canonical(), "worker@server");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for address parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address format: expected 'local@domain[/resource]', got '{0}'")]
    InvalidFormat(String),

    #[error("address local part cannot be empty")]
    EmptyLocal,

    #[error("address domain cannot be empty")]
    EmptyDomain,

    #[error("address resource cannot be empty when '/' is present")]
    EmptyResource,

    #[error("address contains whitespace: '{0}'")]
    InvalidCharacters(String),
}

/// A validated agent address
///
/// Equality is case-sensitive and includes the resource. Use [`Address::bare`]
/// or [`Address::canonical`] when the resource must be ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    local: String,
    domain: String,
    resource: Option<String>,
}

impl Address {
    /// Create a bare address from parts
    ///
    /// # Errors
    /// Returns an error if either part is empty or contains forbidden characters.
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Result<Self, AddressError> {
        let local = local.into();
        let domain = domain.into();

        Self::validate_local(&local)?;
        Self::validate_domain(&domain)?;

        Ok(Self {
            local,
            domain,
            resource: None,
        })
    }

    /// Qualify this address with a resource
    pub fn with_resource(mut self, resource: impl Into<String>) -> Result<Self, AddressError> {
        let resource = resource.into();
        Self::validate_resource(&resource)?;
        self.resource = Some(resource);
        Ok(self)
    }

    /// Get the local part of the address
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Get the domain part of the address
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the resource qualifier, if any
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Check whether this is a bare address (no resource)
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// The same address without its resource
    pub fn bare(&self) -> Address {
        Self {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Canonical routing key: `local@domain`
    pub fn canonical(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }

    /// Compare two addresses ignoring resources
    pub fn same_bare(&self, other: &Address) -> bool {
        self.local == other.local && self.domain == other.domain
    }

    fn validate_local(local: &str) -> Result<(), AddressError> {
        if local.is_empty() {
            return Err(AddressError::EmptyLocal);
        }
        if local.chars().any(|c| c.is_whitespace() || c == '@' || c == '/') {
            return Err(AddressError::InvalidCharacters(local.to_string()));
        }
        Ok(())
    }

    fn validate_domain(domain: &str) -> Result<(), AddressError> {
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain);
        }
        if domain.chars().any(|c| c.is_whitespace() || c == '@' || c == '/') {
            return Err(AddressError::InvalidCharacters(domain.to_string()));
        }
        Ok(())
    }

    fn validate_resource(resource: &str) -> Result<(), AddressError> {
        if resource.is_empty() {
            return Err(AddressError::EmptyResource);
        }
        if resource.chars().any(char::is_whitespace) {
            return Err(AddressError::InvalidCharacters(resource.to_string()));
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (s, None),
        };

        let parts: Vec<&str> = bare.split('@').collect();
        if parts.len() != 2 {
            return Err(AddressError::InvalidFormat(s.to_string()));
        }

        let addr = Self::new(parts[0], parts[1])?;
        match resource {
            Some(resource) => addr.with_resource(resource),
            None => Ok(addr),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}@{}/{}", self.local, self.domain, resource),
            None => write!(f, "{}@{}", self.local, self.domain),
        }
    }
}
