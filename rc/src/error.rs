//! Cache errors

use thiserror::Error;

/// Errors from cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize request descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}
