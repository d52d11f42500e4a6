//! Cache Module
//!
//! The storage abstraction plus its backends: in-memory, on-disk and disabled.

mod disk;
mod entry;
mod memory;
mod none;
mod stats;


use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::key::CacheKey;

// Re-export public types
pub use disk::DiskCache;
pub use entry::CacheEntry;
pub use memory::MemoryCache;
pub use none::NoCache;
pub use stats::CacheStats;

// == Cache Trait ==
/// Asynchronous key/value store with per-entry expiry.
///
/// Expiry is checked lazily on every read, so an expired entry is never
/// served even if no sweep has run. Implementations serialize their own
/// mutations and never hold an internal lock across another cache operation.
#[async_trait]
pub trait Cache<V>: Send + Sync {
    /// Returns the live value for `key`, or `NotFound` if absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<V>;

    /// Like `get` but never fails.
    ///
    /// Errors other than `NotFound` are logged before falling back.
    async fn get_or_default(&self, key: &CacheKey, default: V) -> V
    where
        V: Send + 'static,
    {
        match self.get(key).await {
            Ok(value) => value,
            Err(CacheError::NotFound) => default,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, using default");
                default
            }
        }
    }

    /// Stores `value`, replacing any existing entry. `ttl` is measured from now.
    async fn put(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> Result<()>;

    /// Deletes the entry if present. Absent keys are not an error.
    async fn remove(&self, key: &CacheKey) -> Result<()>;

    /// Deletes every entry whose expiry has passed; returns how many.
    async fn remove_expired(&self) -> Result<usize>;

    /// Snapshot of all live entries.
    async fn entries(&self) -> Result<Vec<(CacheKey, V)>>;
}
