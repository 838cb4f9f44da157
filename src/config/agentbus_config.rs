//! agentbus configuration file handling
//!
//! Loads and manages the ~/.config/agentbus/config.yaml file.

use crate::mail::{DEFAULT_MAILBOX_CAPACITY, DEFAULT_MAX_BODY_SIZE};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Request body size limit in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:7400".to_string()
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Remote relay that receives messages for non-local recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the relay (e.g. `http://relay.internal:7400`)
    pub endpoint: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Defaults applied to agents built from config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefaults {
    /// Messages queued per agent before dispatch is refused
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Register agents for in-process delivery
    #[serde(default = "default_use_registry")]
    pub use_registry: bool,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_use_registry() -> bool {
    true
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            use_registry: default_use_registry(),
        }
    }
}

/// agentbus configuration
///
/// Represents the complete ~/.config/agentbus/config.yaml file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBusConfig {
    /// Relay server settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Remote relay for outbound hand-off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,

    /// Agent defaults
    #[serde(default)]
    pub agents: AgentDefaults,
}

impl AgentBusConfig {
    /// Create a configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/agentbus/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::AgentBusError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading agentbus configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            bind = %config.relay.bind,
            remote = config.remote.is_some(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load from `path` if given, else the default path; fall back to defaults
    /// when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to the default path
    pub fn save_default(&self) -> Result<()> {
        let path = Self::default_path();
        self.save(&path)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving agentbus configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/agentbus/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("agentbus");
        path.push("config.yaml");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_creation() {
        let config = AgentBusConfig::new();
        assert_eq!(config.relay.bind, "127.0.0.1:7400");
        assert!(config.remote.is_none());
        assert_eq!(config.agents.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert!(config.agents.use_registry);
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = AgentBusConfig::new();
        config.remote = Some(RemoteConfig {
            endpoint: "http://relay.internal:7400".to_string(),
            token: Some("secret".to_string()),
        });
        config.agents.use_registry = false;

        config.save(path).unwrap();
        let loaded = AgentBusConfig::load(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "agents:\n  mailbox_capacity: 16\n";
        let config: AgentBusConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agents.mailbox_capacity, 16);
        assert!(config.agents.use_registry);
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn test_default_path() {
        let path = AgentBusConfig::default_path();
        assert!(path.ends_with("agentbus/config.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AgentBusConfig::load("/nonexistent/config.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yaml");
        let config = AgentBusConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config, AgentBusConfig::default());
    }

    #[test]
    fn test_serialization_omits_absent_remote() {
        let yaml = serde_yaml::to_string(&AgentBusConfig::new()).unwrap();
        assert!(yaml.contains("relay:"));
        assert!(yaml.contains("agents:"));
        assert!(!yaml.contains("remote:"));
    }
}
