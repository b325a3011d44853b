//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether route handlers consult the cache at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Default entry lifetime in seconds
    #[serde(default = "default_ttl_secs", rename = "ttl-secs")]
    pub ttl_secs: u64,

    /// Maximum number of entries held at once
    #[serde(default = "default_max_size", rename = "max-size")]
    pub max_size: usize,

    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval_secs", rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,

    /// Largest serialized response that may be stored
    #[serde(default = "default_max_entry_bytes", rename = "max-entry-bytes")]
    pub max_entry_bytes: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    crate::DEFAULT_TTL_SECS
}

fn default_max_size() -> usize {
    crate::DEFAULT_MAX_SIZE
}

fn default_sweep_interval_secs() -> u64 {
    crate::DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_max_entry_bytes() -> usize {
    crate::DEFAULT_MAX_ENTRY_BYTES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: default_ttl_secs(),
            max_size: default_max_size(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

impl CacheConfig {
    /// Get the default TTL as a Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get the sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
