//! Configuration Module
//!
//! Loads memoization defaults from environment variables.

use std::env;
use std::time::Duration;

use crate::key::KeyHashing;

/// Memoization settings.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Background sweep interval in seconds, 0 disables sweeping
    pub sweep_interval: u64,
    /// How much of each cache key is condensed with SHA-256
    pub key_hashing: KeyHashing,
    /// Deduplicate concurrent misses for the same key
    pub single_flight: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_SWEEP_INTERVAL` - Sweep frequency in seconds, 0 to disable (default: 60)
    /// - `MEMO_KEY_HASHING` - `none`, `args` or `full` (default: none)
    /// - `MEMO_SINGLE_FLIGHT` - `true` or `false` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval: env::var("MEMO_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval),
            key_hashing: env::var("MEMO_KEY_HASHING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.key_hashing),
            single_flight: env::var("MEMO_SINGLE_FLIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.single_flight),
        }
    }

    /// Interval for [`spawn_configured_sweeper`](crate::tasks::spawn_configured_sweeper),
    /// or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval > 0).then(|| Duration::from_secs(self.sweep_interval))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval: 60,
            key_hashing: KeyHashing::None,
            single_flight: false,
        }
    }
}
