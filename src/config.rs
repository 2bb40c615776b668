//! Configuration file parser for ~/.config/websub/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::discovery::DEFAULT_MAX_DISCOVERY_BYTES;
use crate::util::EndpointPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Subscriber configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `subscriptions.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Timeout applied to every discovery and hub request.
    pub request_timeout_secs: u64,

    /// Cap on the discovery response body.
    pub max_discovery_bytes: usize,

    /// `User-Agent` sent with every request.
    pub user_agent: String,

    /// Allow topics and hubs on localhost or private networks.
    pub allow_private_hosts: bool,

    /// Lease requested when `subscribe` is given none.
    pub default_lease_seconds: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            request_timeout_secs: 30,
            max_discovery_bytes: DEFAULT_MAX_DISCOVERY_BYTES,
            user_agent: concat!("websub-subscriber/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
            default_lease_seconds: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "request_timeout_secs",
        "max_discovery_bytes",
        "user_agent",
        "allow_private_hosts",
        "default_lease_seconds",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - File over 1 MB → `Err(ConfigError::TooLarge)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            allow_private_hosts = config.allow_private_hosts,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn endpoint_policy(&self) -> EndpointPolicy {
        EndpointPolicy {
            allow_private_hosts: self.allow_private_hosts,
        }
    }

    /// The configured database path, or `subscriptions.db` inside `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("subscriptions.db"))
    }
}
