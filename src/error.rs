//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by user-supplied policy functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Cache Error Enum ==
/// Unified error type for caches, key makers, serializers and TTL policies.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent or expired
    #[error("Key not found")]
    NotFound,

    /// Stored bytes could not be decoded
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    /// Call arguments have no canonical representation
    #[error("Unrepresentable call arguments: {0}")]
    Unrepresentable(String),

    /// Value cannot be encoded by the serializer
    #[error("Unserializable value: {0}")]
    Unserializable(String),

    /// Range TTL with min greater than max
    #[error("Invalid TTL range: min {min:?} is greater than max {max:?}")]
    InvalidRange { min: Duration, max: Duration },

    /// Computed TTL function failed
    #[error("TTL policy failed: {0}")]
    Policy(#[source] BoxError),

    /// Storage backend I/O failure
    #[error("Backend error: {0}")]
    Backend(#[from] std::io::Error),
}

impl CacheError {
    /// Returns true for the expected cache-miss error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
