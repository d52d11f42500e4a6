//! TTL Policy Module
//!
//! Resolves how long a freshly computed value stays valid.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{BoxError, CacheError, Result};
use crate::key::CallSignature;

/// User function deciding the TTL from the call and its result.
pub type TtlFn<V> =
    dyn Fn(&CallSignature, &V) -> std::result::Result<Option<Duration>, BoxError> + Send + Sync;

// == TTL Policy ==
/// Time-to-live policy, resolved once per stored value.
pub enum TtlPolicy<V> {
    /// Never expires
    None,
    /// Always the same duration
    Fixed(Duration),
    /// Uniformly random in `[min, max]`, drawn per stored value
    Range { min: Duration, max: Duration },
    /// Decided by a user function
    Computed(Arc<TtlFn<V>>),
}

impl<V> TtlPolicy<V> {
    pub fn fixed(ttl: Duration) -> Self {
        TtlPolicy::Fixed(ttl)
    }

    pub fn range(min: Duration, max: Duration) -> Self {
        TtlPolicy::Range { min, max }
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&CallSignature, &V) -> std::result::Result<Option<Duration>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        TtlPolicy::Computed(Arc::new(f))
    }

    // == Resolve ==
    /// Resolves the TTL for one value. `None` means the value never expires.
    ///
    /// # Errors
    /// - `InvalidRange` if a Range policy has `min > max`
    /// - `Policy` if a Computed policy's function fails
    pub fn resolve<R: Rng>(
        &self,
        call: &CallSignature,
        value: &V,
        rng: &mut R,
    ) -> Result<Option<Duration>> {
        match self {
            TtlPolicy::None => Ok(None),
            TtlPolicy::Fixed(ttl) => Ok(Some(*ttl)),
            TtlPolicy::Range { min, max } => {
                if min > max {
                    return Err(CacheError::InvalidRange {
                        min: *min,
                        max: *max,
                    });
                }
                if min == max {
                    return Ok(Some(*min));
                }
                Ok(Some(rng.random_range(*min..=*max)))
            }
            TtlPolicy::Computed(f) => f(call, value).map_err(CacheError::Policy),
        }
    }
}

impl<V> Default for TtlPolicy<V> {
    fn default() -> Self {
        TtlPolicy::None
    }
}

impl<V> Clone for TtlPolicy<V> {
    fn clone(&self) -> Self {
        match self {
            TtlPolicy::None => TtlPolicy::None,
            TtlPolicy::Fixed(ttl) => TtlPolicy::Fixed(*ttl),
            TtlPolicy::Range { min, max } => TtlPolicy::Range {
                min: *min,
                max: *max,
            },
            TtlPolicy::Computed(f) => TtlPolicy::Computed(Arc::clone(f)),
        }
    }
}

impl<V> fmt::Debug for TtlPolicy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlPolicy::None => f.write_str("None"),
            TtlPolicy::Fixed(ttl) => f.debug_tuple("Fixed").field(ttl).finish(),
            TtlPolicy::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            TtlPolicy::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<V> From<Duration> for TtlPolicy<V> {
    fn from(ttl: Duration) -> Self {
        TtlPolicy::Fixed(ttl)
    }
}

impl<V> From<Option<Duration>> for TtlPolicy<V> {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(TtlPolicy::None, TtlPolicy::Fixed)
    }
}
