//! apigate configuration types and loading

use eyre::{Context, Result};
use respcache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main apigate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Task scheduler settings
    pub scheduler: SchedulerConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Outbound HTTP settings
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent == 0 {
            return Err(eyre::eyre!("scheduler.max-concurrent must be at least 1"));
        }
        if self.scheduler.retry_attempts == 0 {
            return Err(eyre::eyre!("scheduler.retry-attempts must be at least 1"));
        }
        if self.cache.max_size == 0 {
            return Err(eyre::eyre!("cache.max-size must be at least 1"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(eyre::eyre!("cache.sweep-interval-secs must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, so logging can start before the full load
    ///
    /// Any failure here yields `None`; [`Config::load`] reports it properly.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::default_paths().into_iter().find(|p| p.exists())?,
        };
        Self::load_from_file(&path).ok()?.log_level
    }

    /// Project-local `.apigate.yml`, then `~/.config/apigate/apigate.yml`
    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".apigate.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("apigate").join("apigate.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User-Agent header sent upstream
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("apigate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
