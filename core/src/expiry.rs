//! Background expiry of idle breakers
//!
//! # Policies
//! - `Idle(after)`: every tick, drop slots whose last access is older than
//!   `now - after`
//! - `Flush`: every tick, clear the whole registry
//!
//! The sweep runs on its own thread and waits on a ticker and a shutdown
//! channel. Dropping the shutdown sender is the cancellation signal.

use crate::mux::Registry;
use crate::slot::now_micros;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use crossbeam::select;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a sweep removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpiryPolicy {
    /// Remove everything on every sweep
    Flush,
    /// Remove slots idle for longer than the given duration
    Idle(Duration),
}

impl ExpiryPolicy {
    pub(crate) fn from_expire_after(expire_after: Duration) -> Self {
        if expire_after.is_zero() {
            ExpiryPolicy::Flush
        } else {
            ExpiryPolicy::Idle(expire_after)
        }
    }
}

/// Handle to the running sweep thread
#[derive(Debug)]
pub(crate) struct ExpiryScheduler {
    shutdown: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryScheduler {
    /// Spawn the sweep thread, ticking every `check`
    pub(crate) fn start<E: 'static>(
        registry: Arc<Registry<E>>,
        check: Duration,
        policy: ExpiryPolicy,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(check);

        tracing::debug!(check = ?check, policy = ?policy, "expiry scheduler starting");

        let handle = thread::Builder::new()
            .name("breaker-mux-expiry".to_string())
            .spawn(move || run(&registry, &ticker, &shutdown_rx, policy))
            .expect("failed to spawn breaker expiry thread");

        Self {
            shutdown: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal the thread and wait for it to exit; later calls are no-ops
    pub(crate) fn stop(&self) {
        drop(self.shutdown.lock().take());

        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            tracing::warn!("expiry scheduler thread panicked");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn run<E>(
    registry: &Registry<E>,
    ticker: &Receiver<Instant>,
    shutdown: &Receiver<()>,
    policy: ExpiryPolicy,
) {
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                // A tick can win the race against a pending shutdown
                if matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected)) {
                    break;
                }
                sweep(registry, policy);
            }
        }
    }

    tracing::debug!("expiry scheduler stopped");
}

/// One eviction pass over the registry
pub(crate) fn sweep<E>(registry: &Registry<E>, policy: ExpiryPolicy) {
    match policy {
        ExpiryPolicy::Flush => registry.clear(),
        ExpiryPolicy::Idle(after) => {
            let after_micros = i64::try_from(after.as_micros()).unwrap_or(i64::MAX);
            let deadline = now_micros().saturating_sub(after_micros);
            let before = registry.breakers.len();

            registry.breakers.retain(|key, slot| {
                let keep = slot.accessed_micros() >= deadline;
                if !keep {
                    tracing::trace!(key = %key, "expiring idle circuit breaker");
                }
                keep
            });

            let removed = before.saturating_sub(registry.breakers.len());
            if removed > 0 {
                tracing::trace!(removed, "expiry sweep finished");
            }
        }
    }
}
