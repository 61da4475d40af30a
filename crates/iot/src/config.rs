//! Application Configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file at all) is a valid configuration. A few fields can be
//! overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration (iot.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IotConfig {
    /// Name of the actor system, used as the root of every actor path
    pub system_name: String,
    /// Default deadline for aggregate reads
    pub query_timeout_ms: u64,
    /// How long the client waits for any single reply
    pub ask_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for IotConfig {
    fn default() -> Self {
        Self {
            system_name: "iot-system".to_string(),
            query_timeout_ms: 3000,
            ask_timeout_ms: 5000,
            shutdown_timeout_ms: 5000,
            log_filter: "iot=info,iot_runtime=info".to_string(),
            log_json: false,
        }
    }
}

impl IotConfig {
    /// Load configuration from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let config: IotConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Override fields from `IOT_*` environment variables
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = parse_millis(&lookup, "IOT_QUERY_TIMEOUT_MS") {
            self.query_timeout_ms = ms;
        }
        if let Some(ms) = parse_millis(&lookup, "IOT_ASK_TIMEOUT_MS") {
            self.ask_timeout_ms = ms;
        }
        if let Some(filter) = lookup("IOT_LOG_FILTER") {
            self.log_filter = filter;
        }
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(ms) => Some(ms),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid millisecond override");
            None
        }
    }
}
