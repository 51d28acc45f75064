//! Configuration system for NetFS
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/netfs/config.toml
//! - Linux: ~/.config/netfs/config.toml
//!
//! Command-line flags always override the file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::DEFAULT_PORT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings
    pub server: ServerConfig,
    /// Client settings
    pub client: ClientConfig,
    /// Transport settings shared by both sides
    pub transport: TransportConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory tree to export
    pub root: PathBuf,
    /// Bind address
    pub bind: IpAddr,
    /// Listening port
    pub port: u16,
    /// Maximum concurrent request workers
    pub max_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_workers: 4,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server hostname or address
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-read timeout in seconds (0 disables)
    pub read_timeout_secs: u64,
    /// Per-write timeout in seconds (0 disables)
    pub write_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 30,
            write_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_secs > 0).then(|| Duration::from_secs(self.write_timeout_secs))
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "netfs", "netfs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}
