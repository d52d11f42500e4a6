//! Per-key in-flight tracking for single-flight memoization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::key::CacheKey;

/// Map from key to the lock held by whoever is computing that key.
///
/// The outer map lock is only taken briefly and never across an await.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

/// Lock for one key plus the number of callers holding or awaiting it.
#[derive(Debug, Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits until no other caller is computing `key`, then claims it.
    ///
    /// The caller is counted before waiting, so a waiter that is cancelled
    /// still releases its share of the slot.
    pub(crate) async fn acquire(&self, key: &CacheKey) -> FlightGuard<'_> {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        let mut guard = FlightGuard {
            flights: self,
            key: key.clone(),
            permit: None,
        };
        guard.permit = Some(lock.lock_owned().await);
        guard
    }

    /// Number of keys currently claimed or waited on.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Releases the key on drop, including when the holder is cancelled.
#[derive(Debug)]
pub(crate) struct FlightGuard<'a> {
    flights: &'a InFlight,
    key: CacheKey,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());

        let mut slots = self
            .flights
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
