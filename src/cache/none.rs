//! Disabled cache: every read misses and every write is dropped.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

/// Turns caching off without changing call sites.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl<V: Send + 'static> Cache<V> for NoCache {
    async fn get(&self, _key: &CacheKey) -> Result<V> {
        Err(CacheError::NotFound)
    }

    async fn put(&self, _key: CacheKey, _value: V, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }

    async fn remove_expired(&self) -> Result<usize> {
        Ok(0)
    }

    async fn entries(&self) -> Result<Vec<(CacheKey, V)>> {
        Ok(Vec::new())
    }
}
