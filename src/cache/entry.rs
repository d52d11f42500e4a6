//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use crate::clock::Timestamp;

// == Cache Entry ==
/// A stored value and the moment it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<Timestamp>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stored at `now` with optional TTL.
    pub fn new(value: V, now: Timestamp, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now.after(ttl)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// value stored with TTL `d` is served strictly before `store_time + d`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value", Timestamp(0), None);

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(Timestamp(u64::MAX)));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("test_value", Timestamp(1_000), Some(Duration::from_secs(60)));

        assert_eq!(entry.expires_at, Some(Timestamp(61_000)));
        assert!(!entry.is_expired(Timestamp(1_000)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new("test", Timestamp(0), Some(Duration::from_secs(5)));

        assert!(!entry.is_expired(Timestamp(4_999)));
        assert!(entry.is_expired(Timestamp(5_000)), "Entry should be expired at boundary");
        assert!(entry.is_expired(Timestamp(5_001)));
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::new(1u8, Timestamp(10), Some(Duration::ZERO));
        assert!(entry.is_expired(Timestamp(10)));
    }
}
