//! Cache statistics

use serde::{Deserialize, Serialize};

/// Snapshot of cache occupancy and effectiveness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage with two decimals, `"0%"` before the first lookup
    pub hit_rate: String,
    /// Default TTL in seconds
    pub ttl: u64,
}

/// Format a hit rate the way stats consumers expect it
pub(crate) fn format_hit_rate(hits: u64, misses: u64) -> String {
    let total = hits + misses;
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", hits as f64 / total as f64 * 100.0)
}
