//! Which responses route handlers may store

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::config::CacheConfig;

/// Runtime caching switch plus the admission rule for responses
///
/// Only successful (2xx) responses whose serialized form fits within
/// `max_entry_bytes` are stored.
#[derive(Debug)]
pub struct CachePolicy {
    enabled: AtomicBool,
    max_entry_bytes: usize,
}

impl CachePolicy {
    pub fn new(enabled: bool, max_entry_bytes: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            max_entry_bytes,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, config.max_entry_bytes)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip caching on or off for every subsequent request
    pub fn set_enabled(&self, enabled: bool) {
        debug!(enabled, "CachePolicy::set_enabled: called");
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }

    /// Whether a response with this status and serialized size may be stored
    pub fn should_store(&self, status: u16, serialized_len: usize) -> bool {
        let admit = self.is_enabled() && (200..300).contains(&status) && serialized_len <= self.max_entry_bytes;
        debug!(status, serialized_len, admit, "CachePolicy::should_store");
        admit
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
