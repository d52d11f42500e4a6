//! Clock Module
//!
//! Time sources used by caches to stamp and check expiry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

// == Timestamp ==
/// Milliseconds since the origin of the clock that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the raw millisecond value.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the timestamp `ttl` after this one.
    ///
    /// Sub-millisecond remainders round up. Against [`SystemClock`], which
    /// truncates the wall clock to whole milliseconds, an entry may still
    /// expire up to 1 ms before `store time + ttl` in real time.
    pub fn after(self, ttl: Duration) -> Self {
        let millis = ttl.as_nanos().div_ceil(1_000_000);
        let millis = u64::try_from(millis).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

// == Clock Trait ==
/// Source of "now" plus a cooperative sleep.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time. Never suspends.
    fn now(&self) -> Timestamp;

    /// Suspends the calling task for at least `duration`.
    async fn sleep(&self, duration: Duration);
}

// == System Clock ==
/// Wall clock: milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0))
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// == Test Clock ==
/// Deterministic clock that only moves when slept on or advanced.
///
/// Starts at timestamp zero. `sleep` advances time instantly, which lets
/// expiry be tested without waiting on the wall clock.
#[derive(Debug, Default)]
pub struct TestClock {
    now_ms: AtomicU64,
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward without suspending.
    ///
    /// Rounds up to whole milliseconds, the same way TTLs are stamped, so
    /// advancing by a TTL always reaches its expiry.
    pub fn advance(&self, duration: Duration) {
        let millis = duration.as_nanos().div_ceil(1_000_000);
        let millis = u64::try_from(millis).unwrap_or(u64::MAX);
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(millis))
            });
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
