//! dbgp-proxy configuration.
//!
//! Handles the configuration file at:
//! - Linux/macOS: ~/.config/dbgp-proxy/config.toml
//! - Windows: %APPDATA%\dbgp-proxy\config.toml
//!
//! Command line flags override values from the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listen address for debugger engine connections
    #[serde(default = "default_relay_address")]
    pub relay_address: String,

    /// Listen address for IDE registrations
    #[serde(default = "default_registry_address")]
    pub registry_address: String,

    /// Upper bound on dialing a registered IDE
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long shutdown waits for open sessions; unset waits forever
    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Clients registered at startup
    #[serde(default)]
    pub predefined: Vec<PredefinedClient>,
}

/// A client registered from configuration rather than `proxyinit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedClient {
    pub idekey: String,
    /// IDE listening address, `host:port`
    pub address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_relay_address() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_registry_address() -> String {
    "0.0.0.0:9001".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            relay_address: default_relay_address(),
            registry_address: default_registry_address(),
            connect_timeout_secs: default_connect_timeout_secs(),
            drain_timeout_secs: None,
            logging: LoggingConfig::default(),
            predefined: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dbgp-proxy").join("config.toml"))
    }

    /// Explicit `path` if given, otherwise the default location
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf).or_else(Self::default_path)
    }

    /// Load configuration from a specific path; a missing file gives defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            ProxyError::Config { message } => ProxyError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Load from `path` if given, otherwise from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match Self::resolve_path(path) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProxyError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, relay: Option<String>, registry: Option<String>) -> Self {
        if let Some(relay) = relay {
            self.relay_address = relay;
        }
        if let Some(registry) = registry {
            self.registry_address = registry;
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}
