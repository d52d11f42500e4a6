//! Expiry Sweeper Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::Config;

/// Spawns a background task that periodically calls `remove_expired`.
///
/// Reads already ignore expired entries; sweeping only reclaims space.
/// Sweep failures are logged and the task keeps running.
///
/// # Arguments
/// * `cache` - Shared cache to sweep
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task.
///
/// # Example
/// ```ignore
/// let cache: Arc<dyn Cache<String>> = Arc::new(MemoryCache::default());
/// let sweeper = spawn_sweeper(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweeper<V>(cache: Arc<dyn Cache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache sweeper");

        loop {
            tokio::time::sleep(interval).await;

            match cache.remove_expired().await {
                Ok(0) => debug!("Sweep: no expired entries found"),
                Ok(removed) => info!(removed, "Sweep: removed expired entries"),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }
        }
    })
}

/// Spawns a sweeper at the interval from `config`.
///
/// Returns `None` without spawning when the configured interval is zero.
pub fn spawn_configured_sweeper<V>(
    cache: Arc<dyn Cache<V>>,
    config: &Config,
) -> Option<JoinHandle<()>>
where
    V: Send + 'static,
{
    match config.sweep_interval() {
        Some(interval) => Some(spawn_sweeper(cache, interval)),
        None => {
            debug!("Sweeping disabled by configuration");
            None
        }
    }
}
