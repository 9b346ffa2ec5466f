//! Timestamped cache entries
//!
//! A [`Slot`] owns one payload for its whole life and records, in
//! microseconds since the Unix epoch, when it was created and when it was last
//! read. Both timestamps are plain atomics so reads never take a lock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A write-once cache entry with access and modification times
#[derive(Debug)]
pub struct Slot<T> {
    payload: T,
    accessed: AtomicI64,
    modified: AtomicI64,
}

impl<T> Slot<T> {
    /// Wrap a payload; access and modification times both start now
    pub fn new(payload: T) -> Self {
        let now = now_micros();
        Self {
            payload,
            accessed: AtomicI64::new(now),
            modified: AtomicI64::new(now),
        }
    }

    /// Return the payload, marking the slot as accessed now
    ///
    /// Concurrent readers may race on the stored instant; the later instant
    /// always wins, so the access time never moves backwards.
    pub fn read(&self) -> &T {
        self.accessed.fetch_max(now_micros(), Ordering::AcqRel);
        &self.payload
    }

    /// Return the payload without touching the access time
    pub(crate) fn peek(&self) -> &T {
        &self.payload
    }

    /// Time of the last [`read`](Self::read), or creation if never read
    pub fn access_time(&self) -> SystemTime {
        from_micros(self.accessed_micros())
    }

    /// Time the slot was created
    pub fn modify_time(&self) -> SystemTime {
        from_micros(self.modified.load(Ordering::Acquire))
    }

    pub(crate) fn accessed_micros(&self) -> i64 {
        self.accessed.load(Ordering::Acquire)
    }
}

/// Current wall-clock time in microseconds since the Unix epoch
pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

fn from_micros(micros: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros.max(0) as u64)
}
