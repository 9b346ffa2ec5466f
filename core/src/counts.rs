//! Request and outcome counters for a single breaker
//!
//! The tracker is shared between the breaker and its state machine context,
//! so trip guards can read the counts the breaker records. All mutation happens
//! under the breaker's lock; the atomics only make the sharing safe.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Snapshot of a breaker's statistics for the current generation
///
/// Counts are cleared whenever the breaker changes state and, in the closed
/// state, at every configured interval boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

/// Live counters plus the breaker's monotonic clock
#[derive(Debug)]
pub struct CountTracker {
    requests: AtomicU32,
    total_successes: AtomicU32,
    total_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
    /// Monotonic time anchor (prevents clock skew issues from NTP)
    start_time: Instant,
}

impl CountTracker {
    pub fn new() -> Self {
        Self {
            requests: AtomicU32::new(0),
            total_successes: AtomicU32::new(0),
            total_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn on_request(&self) {
        bump(&self.requests);
    }

    pub fn on_success(&self) {
        bump(&self.total_successes);
        bump(&self.consecutive_successes);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn on_failure(&self) {
        bump(&self.total_failures);
        bump(&self.consecutive_failures);
        self.consecutive_successes.store(0, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.total_successes.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Counts {
        Counts {
            requests: self.requests.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            consecutive_successes: self.consecutive_successes.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Get monotonic time in seconds (relative to tracker creation)
    pub fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

impl Default for CountTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU32) {
    // Saturate rather than wrap; a wrapped consecutive count would un-trip.
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
}
