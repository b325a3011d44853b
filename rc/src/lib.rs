//! respcache - bounded in-memory response cache
//!
//! Stores upstream responses under content-addressed keys with per-entry
//! TTL expiry and least-recently-accessed eviction once the store is full.
//! A background sweep removes expired entries that are never read again.
//!
//! # Example
//!
//! ```ignore
//! use respcache::{CacheConfig, RequestDescriptor, ResponseCache};
//!
//! let cache: ResponseCache<String> = ResponseCache::new(CacheConfig::default());
//! let key = RequestDescriptor::new("GET", "/weather").query("city", "Oslo").cache_key();
//!
//! cache.set(key.clone(), "sunny".to_string());
//! assert_eq!(cache.get(&key), Some("sunny".to_string()));
//!
//! cache.destroy();
//! ```

pub mod config;
mod error;
mod key;
mod policy;
mod stats;
mod store;

pub use config::CacheConfig;
pub use error::CacheError;
pub use key::{CacheKey, RequestDescriptor, compute_key};
pub use policy::CachePolicy;
pub use stats::CacheStats;
pub use store::ResponseCache;

/// Default time-to-live for entries (1 hour)
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default maximum number of entries
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default interval between expiry sweeps (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Default largest serialized response eligible for caching (100KB)
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 100 * 1024;
