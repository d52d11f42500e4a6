//! Memo Cache - memoization for async computations
//!
//! Caches results of async functions keyed by call signature, with TTL
//! expiry and pluggable storage backends.
//!
//! ```ignore
//! let fetch = memoize(fetch_user, MemoizeOptions::new().ttl(Duration::from_secs(30)));
//! let user = fetch.call(42).await?;
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod memoize;
pub mod serializer;
pub mod tasks;
pub mod ttl;

pub use cache::{Cache, CacheStats, DiskCache, MemoryCache, NoCache};
pub use clock::{Clock, SystemClock, TestClock, Timestamp};
pub use config::Config;
pub use error::{BoxError, CacheError, Result};
pub use key::{CacheKey, CallSignature, KeyHashing, KeyMaker, ReprKeyMaker};
pub use memoize::{memoize, MemoizeOptions, Memoized};
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
pub use tasks::{spawn_configured_sweeper, spawn_sweeper};
pub use ttl::TtlPolicy;
