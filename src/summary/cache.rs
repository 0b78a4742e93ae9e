// src/summary/cache.rs
//! The time-limited result cache and the clock it reads.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// A clock stopped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cached value with the time it was computed.
#[derive(Debug)]
pub struct Cached<T> {
    /// The value.
    pub value: Arc<T>,
    /// When it was computed.
    pub computed_at: DateTime<Utc>,
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            computed_at: self.computed_at,
        }
    }
}

/// A single-slot cache whose entry expires after a TTL.
///
/// Concurrent writers overwrite each other; the last one wins.
#[derive(Debug)]
pub struct TtlCache<T> {
    slot: Mutex<Option<Cached<T>>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> TtlCache<T> {
    /// The cached entry, if it is younger than `ttl` at `now`.
    pub fn get(&self, now: DateTime<Utc>, ttl: Duration) -> Option<Cached<T>> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|cached| now - cached.computed_at < ttl)
            .cloned()
    }

    /// Store `value`, computed at `computed_at`.
    pub fn put(&self, value: T, computed_at: DateTime<Utc>) -> Cached<T> {
        let cached = Cached {
            value: Arc::new(value),
            computed_at,
        };
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(cached.clone());
        cached
    }

    /// Drop the entry.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
