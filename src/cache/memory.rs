//! Memory Cache Module
//!
//! Reference backend: live values in a HashMap, expiry checked on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{Cache, CacheEntry, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

#[derive(Debug)]
struct Inner<V> {
    /// Key-value storage
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
}

// == Memory Cache ==
/// In-memory cache holding live values.
///
/// Values are cloned out on `get`. The map lock is held only for the
/// duration of one operation.
#[derive(Debug)]
pub struct MemoryCache<V> {
    inner: Mutex<Inner<V>>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryCache<V> {
    // == Constructor ==
    /// Creates an empty cache stamping entries with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::new(),
            }),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }

    // == Length ==
    /// Number of entries held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Get ==
    /// Expired entries are removed on sight and counted as misses.
    async fn get(&self, key: &CacheKey) -> Result<V> {
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                inner.stats.record_hit();
                return Ok(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.record_expired(1);
            debug!(key = %key, "Dropped expired entry on read");
        }
        inner.stats.record_miss();
        Err(CacheError::NotFound)
    }

    async fn put(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        let mut inner = self.inner.lock().await;
        inner.entries.insert(key, entry);
        let total = inner.entries.len();
        inner.stats.set_total_entries(total);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.remove(key);
        let total = inner.entries.len();
        inner.stats.set_total_entries(total);
        Ok(())
    }

    // == Remove Expired ==
    async fn remove_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();

        inner.stats.record_expired(removed);
        let total = inner.entries.len();
        inner.stats.set_total_entries(total);
        Ok(removed)
    }

    async fn entries(&self) -> Result<Vec<(CacheKey, V)>> {
        let now = self.clock.now();
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn test_cache() -> (Arc<TestClock>, MemoryCache<String>) {
        let clock = Arc::new(TestClock::new());
        let cache = MemoryCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_cache_starts_empty() {
        let (_, cache) = test_cache();
        assert!(cache.is_empty().await);
        assert_eq!(
            cache.get_or_default(&"foo".into(), "none".to_string()).await,
            "none"
        );
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_, cache) = test_cache();

        cache.put("key1".into(), "value1".to_string(), None).await.unwrap();
        let value = cache.get(&"key1".into()).await.unwrap();

        assert_eq!(value, "value1");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (_, cache) = test_cache();
        let result = cache.get(&"nonexistent".into()).await;
        assert!(matches!(result, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_, cache) = test_cache();

        cache.put("key1".into(), "value1".to_string(), None).await.unwrap();
        cache.remove(&"key1".into()).await.unwrap();

        assert!(cache.is_empty().await);
        assert!(matches!(cache.get(&"key1".into()).await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_ok() {
        let (_, cache) = test_cache();
        assert!(cache.remove(&"nonexistent".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (_, cache) = test_cache();

        cache.put("key1".into(), "value1".to_string(), None).await.unwrap();
        cache.put("key1".into(), "value2".to_string(), None).await.unwrap();

        assert_eq!(cache.get(&"key1".into()).await.unwrap(), "value2");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let (clock, cache) = test_cache();

        cache
            .put("key1".into(), "short".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache.put("key1".into(), "forever".to_string(), None).await.unwrap();
        clock.sleep(Duration::from_secs(10)).await;

        assert_eq!(cache.get(&"key1".into()).await.unwrap(), "forever");
    }

    #[tokio::test]
    async fn test_lazy_expiry_without_sweep() {
        let (clock, cache) = test_cache();

        cache
            .put("key1".into(), "value1".to_string(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        clock.sleep(Duration::from_millis(4_999)).await;
        assert!(cache.get(&"key1".into()).await.is_ok());

        clock.sleep(Duration::from_millis(1)).await;
        assert!(matches!(cache.get(&"key1".into()).await, Err(CacheError::NotFound)));
        // Purged on read
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sub_millisecond_ttl_expires_at_boundary() {
        let (clock, cache) = test_cache();

        cache
            .put("key1".into(), "value1".to_string(), Some(Duration::from_micros(1500)))
            .await
            .unwrap();
        clock.sleep(Duration::from_micros(1500)).await;

        assert!(matches!(cache.get(&"key1".into()).await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_expired_keeps_live_entries() {
        let (clock, cache) = test_cache();

        cache
            .put("short".into(), "a".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache
            .put("long".into(), "b".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        cache.put("forever".into(), "c".to_string(), None).await.unwrap();

        clock.sleep(Duration::from_secs(2)).await;

        let removed = cache.remove_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&"long".into()).await.is_ok());
        assert!(cache.get(&"forever".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_entries_skips_expired() {
        let (clock, cache) = test_cache();

        cache.put("foo".into(), "bar".to_string(), None).await.unwrap();
        cache
            .put("ttl".into(), "gone".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        clock.sleep(Duration::from_secs(2)).await;

        let entries = cache.entries().await.unwrap();
        assert_eq!(entries, vec![(CacheKey::from("foo"), "bar".to_string())]);
    }

    #[tokio::test]
    async fn test_stats() {
        let (clock, cache) = test_cache();

        cache
            .put("key1".into(), "value1".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache.get(&"key1".into()).await.unwrap(); // hit
        let _ = cache.get(&"nonexistent".into()).await; // miss
        clock.sleep(Duration::from_secs(1)).await;
        let _ = cache.get(&"key1".into()).await; // expired miss

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.total_entries, 0);
    }
}
