//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for all cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store directory cannot be created, opened or written
    #[error("store unavailable at {}: {source}", .path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes for a key cannot be parsed; callers treat this as a miss
    #[error("corrupt entry for key '{key}': {reason}")]
    CorruptEntry { key: String, reason: String },

    /// A document could not be encoded for storage
    #[error("encode failure: {0}")]
    EncodeFailure(String),

    /// Stored bytes could not be decoded back into a document
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Key absent or expired (only surfaced by size lookups)
    #[error("key not found: {0}")]
    NotFound(String),

    /// Configuration rejected at construction time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
