//! Memoize Module
//!
//! Wraps an async function so repeated calls with the same arguments are
//! served from a cache until their TTL runs out.
//!
//! # Concurrency
//! By default two concurrent calls that both miss compute independently and
//! both store their result (last write wins). Enabling
//! [`MemoizeOptions::single_flight`] adds a per-key in-flight map: the first
//! caller computes, later callers wait and then read its result from the
//! cache. If the first caller fails, each waiter computes for itself, so
//! errors are never shared between callers.

mod flight;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::error::CacheError;
use crate::key::{CacheKey, CallSignature, KeyMaker, ReprKeyMaker};
use crate::ttl::TtlPolicy;

use flight::InFlight;

// == Memoize Options ==
/// How a memoized function caches: where, for how long, and under which key.
pub struct MemoizeOptions<V> {
    cache: Option<Arc<dyn Cache<V>>>,
    ttl: TtlPolicy<V>,
    key_maker: Arc<dyn KeyMaker>,
    single_flight: bool,
    name: Option<String>,
    rng: Option<StdRng>,
}

impl<V> MemoizeOptions<V> {
    /// Defaults: in-memory cache on the system clock, readable keys, no expiry,
    /// no single-flight.
    pub fn new() -> Self {
        Self {
            cache: None,
            ttl: TtlPolicy::None,
            key_maker: Arc::new(ReprKeyMaker::default()),
            single_flight: false,
            name: None,
            rng: None,
        }
    }

    /// Options seeded from environment configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .key_maker(ReprKeyMaker::new(config.key_hashing))
            .single_flight(config.single_flight)
    }

    pub fn cache(mut self, cache: Arc<dyn Cache<V>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ttl(mut self, ttl: impl Into<TtlPolicy<V>>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn key_maker(mut self, key_maker: impl KeyMaker + 'static) -> Self {
        self.key_maker = Arc::new(key_maker);
        self
    }

    /// Deduplicates concurrent misses for the same key.
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Identity used in keys. Defaults to the function's type name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Random source for Range TTLs.
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn rng_seed(self, seed: u64) -> Self {
        self.rng(StdRng::seed_from_u64(seed))
    }
}

impl<V> Default for MemoizeOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for MemoizeOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeOptions")
            .field("custom_cache", &self.cache.is_some())
            .field("ttl", &self.ttl)
            .field("key_maker", &self.key_maker)
            .field("single_flight", &self.single_flight)
            .field("name", &self.name)
            .finish()
    }
}

// == Memoized ==
/// An async function plus the cache that remembers its results.
///
/// `call` has the same arguments and result type as the wrapped function.
/// Cache-layer failures reach the caller through `E: From<CacheError>`;
/// failures of the function itself are returned unchanged and never cached.
pub struct Memoized<A, V, F> {
    name: String,
    func: F,
    cache: Arc<dyn Cache<V>>,
    key_maker: Arc<dyn KeyMaker>,
    ttl: TtlPolicy<V>,
    rng: Mutex<StdRng>,
    in_flight: Option<InFlight>,
    _args: PhantomData<fn(A)>,
}

impl<A, V, F, Fut, E> Memoized<A, V, F>
where
    A: Serialize,
    V: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: From<CacheError>,
{
    pub fn new(func: F, options: MemoizeOptions<V>) -> Self {
        let MemoizeOptions {
            cache,
            ttl,
            key_maker,
            single_flight,
            name,
            rng,
        } = options;

        Self {
            name: name.unwrap_or_else(|| std::any::type_name::<F>().to_string()),
            func,
            cache: cache
                .unwrap_or_else(|| Arc::new(MemoryCache::<V>::default()) as Arc<dyn Cache<V>>),
            key_maker,
            ttl,
            rng: Mutex::new(rng.unwrap_or_else(StdRng::from_os_rng)),
            in_flight: single_flight.then(InFlight::new),
            _args: PhantomData,
        }
    }

    // == Call ==
    /// Returns the cached result for `args`, computing and storing it on a miss.
    ///
    /// A corrupt cache entry is treated as a miss and overwritten.
    pub async fn call(&self, args: A) -> Result<V, E> {
        let call = CallSignature::capture(self.name.as_str(), &args)?;
        let key = self.key_maker.make_key(&call)?;

        let _flight = match &self.in_flight {
            Some(flights) => Some(flights.acquire(&key).await),
            None => None,
        };

        match self.cache.get(&key).await {
            Ok(value) => {
                debug!(key = %key, "Memoized call hit");
                return Ok(value);
            }
            Err(CacheError::NotFound) => debug!(key = %key, "Memoized call miss"),
            Err(CacheError::Corrupt(reason)) => {
                warn!(key = %key, reason = %reason, "Corrupt cache entry, recomputing");
            }
            Err(e) => return Err(e.into()),
        }

        let value = (self.func)(args).await?;

        let ttl = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.ttl.resolve(&call, &value, &mut *rng)?
        };
        self.cache.put(key.clone(), value.clone(), ttl).await?;
        debug!(key = %key, ttl = ?ttl, "Stored memoized result");

        Ok(value)
    }

    // == Invalidate ==
    /// Drops the cached result for `args`, if any.
    pub async fn invalidate(&self, args: &A) -> Result<(), CacheError> {
        let call = CallSignature::capture(self.name.as_str(), args)?;
        let key = self.key_maker.make_key(&call)?;
        self.cache.remove(&key).await
    }

    /// Derives the key `call(args)` would use.
    pub fn key_for(&self, args: &A) -> Result<CacheKey, CacheError> {
        let call = CallSignature::capture(self.name.as_str(), args)?;
        self.key_maker.make_key(&call)
    }
}

impl<A, V, F> Memoized<A, V, F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &Arc<dyn Cache<V>> {
        &self.cache
    }

    pub fn key_maker(&self) -> &Arc<dyn KeyMaker> {
        &self.key_maker
    }

    pub fn ttl(&self) -> &TtlPolicy<V> {
        &self.ttl
    }

    pub fn is_single_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl<A, V, F> fmt::Debug for Memoized<A, V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("name", &self.name)
            .field("key_maker", &self.key_maker)
            .field("ttl", &self.ttl)
            .field("single_flight", &self.in_flight.is_some())
            .finish()
    }
}

/// Shorthand for [`Memoized::new`].
pub fn memoize<A, V, F, Fut, E>(func: F, options: MemoizeOptions<V>) -> Memoized<A, V, F>
where
    A: Serialize,
    V: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: From<CacheError>,
{
    Memoized::new(func, options)
}
