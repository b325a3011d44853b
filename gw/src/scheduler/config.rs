//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max tasks executing at once
    #[serde(default = "default_max_concurrent", rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Per-attempt time budget in milliseconds
    #[serde(default = "default_timeout_ms", rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Total attempts per task before giving up
    #[serde(default = "default_retry_attempts", rename = "retry-attempts")]
    pub retry_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_retry_delay_ms", rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Get the per-attempt timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the backoff base as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Delay before the next attempt after `attempts` failures
    ///
    /// `retry_delay * 2^(attempts - 1)`, saturating.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.retry_delay().saturating_mul(factor)
    }
}
