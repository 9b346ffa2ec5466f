//! Keyed multiplexer of circuit breakers
//!
//! # Data Flow
//! ```text
//! get(key) / get_with_arg(key, arg):
//!     → registry lookup (touches the slot's access time)
//!     → on miss: template renamed to `key` → new breaker → insert-if-absent
//!     → exec_closure(arg) runs through the breaker
//!
//! expiry thread (optional):
//!     → every expire_check: drop idle slots, or clear() everything
//! ```

use crate::{
    State,
    builder::MuxBuilder,
    circuit::CircuitBreaker,
    errors::CircuitError,
    expiry::{ExpiryPolicy, ExpiryScheduler},
    settings::{BreakerSettings, ExecClosure, Settings},
    slot::Slot,
};
use dashmap::DashMap;
use std::sync::Arc;

/// Breakers keyed by name, plus the template new ones are built from
pub(crate) struct Registry<E> {
    template: BreakerSettings<E>,
    pub(crate) breakers: DashMap<String, Slot<Arc<CircuitBreaker<E>>>>,
}

impl<E> Registry<E> {
    pub(crate) fn new(template: BreakerSettings<E>) -> Self {
        Self {
            template,
            breakers: DashMap::new(),
        }
    }

    /// Existing breaker for `key`, or a new one inserted atomically
    pub(crate) fn breaker(&self, key: &str) -> Arc<CircuitBreaker<E>> {
        if let Some(slot) = self.breakers.get(key) {
            return Arc::clone(slot.read());
        }

        let slot = self.breakers.entry(key.to_owned()).or_insert_with(|| {
            tracing::debug!(key, "creating circuit breaker");
            Slot::new(Arc::new(CircuitBreaker::new(self.template.named(key))))
        });
        Arc::clone(slot.read())
    }

    /// Breaker for `key` without touching its access time
    pub(crate) fn peek(&self, key: &str) -> Option<Arc<CircuitBreaker<E>>> {
        self.breakers.get(key).map(|slot| Arc::clone(slot.peek()))
    }

    /// Remove every breaker. Entry point for the flush expiry policy.
    pub(crate) fn clear(&self) {
        let evicted = self.breakers.len();
        self.breakers.clear();
        if evicted > 0 {
            tracing::debug!(evicted, "cleared circuit breakers");
        }
    }
}

/// A thread-safe multiplex of circuit breakers, one per key
///
/// Breakers are created on first use from the configured template, renamed
/// after their key, and reused until they are deleted, cleared or expired.
///
/// # Example
///
/// ```rust
/// use breaker_mux::BreakerMux;
///
/// let mux = BreakerMux::builder(|host: &str| {
///     let host = host.to_string();
///     move || -> Result<String, String> { Ok(format!("fetched {}", host)) }
/// })
/// .build();
///
/// assert_eq!(mux.get("example.com").unwrap(), "fetched example.com");
/// mux.close();
/// ```
pub struct BreakerMux<T, E> {
    registry: Arc<Registry<E>>,
    exec_closure: ExecClosure<T, E>,
    expiry: Option<ExpiryScheduler>,
}

impl<T: 'static, E: 'static> BreakerMux<T, E> {
    /// Build a multiplexer, starting the expiry thread if `expire_check` is set
    pub fn new(settings: Settings<T, E>) -> Self {
        let Settings {
            breaker,
            exec_closure,
            expire_after,
            expire_check,
        } = settings;

        let registry = Arc::new(Registry::new(breaker));

        let expiry = (!expire_check.is_zero()).then(|| {
            ExpiryScheduler::start(
                Arc::clone(&registry),
                expire_check,
                ExpiryPolicy::from_expire_after(expire_after),
            )
        });

        Self {
            registry,
            exec_closure,
            expiry,
        }
    }

    /// Start a fluent builder around an execution-closure factory
    pub fn builder<F, G>(exec_closure: F) -> MuxBuilder<T, E>
    where
        F: Fn(&str) -> G + Send + Sync + 'static,
        G: FnOnce() -> Result<T, E> + 'static,
    {
        MuxBuilder::new(exec_closure)
    }
}

impl<T, E> BreakerMux<T, E> {
    /// Run the closure built from `key` through the breaker for `key`
    pub fn get(&self, key: &str) -> Result<T, CircuitError<E>> {
        self.get_with_arg(key, key)
    }

    /// Run the closure built from `exec_arg` through the breaker for `key`
    ///
    /// Lets many distinct operations share one breaker, e.g. every URL of a
    /// host behind the host's breaker.
    pub fn get_with_arg(&self, key: &str, exec_arg: &str) -> Result<T, CircuitError<E>> {
        let breaker = self.registry.breaker(key);
        breaker.execute((self.exec_closure)(exec_arg))
    }

    /// Remove the breaker for `key`, if there is one
    pub fn delete(&self, key: &str) {
        self.registry.breakers.remove(key);
    }

    /// Remove every breaker
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Stop background expiry and drop every breaker
    ///
    /// Safe to call more than once. The multiplexer keeps working afterwards,
    /// but breakers created later are never expired.
    pub fn close(&self) {
        if let Some(expiry) = &self.expiry {
            expiry.stop();
        }
        self.registry.breakers.clear();
    }

    /// Current state of the breaker for `key`, without counting as an access
    pub fn state(&self, key: &str) -> Option<State> {
        // Release the map shard before the breaker runs any callbacks
        let breaker = self.registry.peek(key)?;
        Some(breaker.state())
    }

    /// Whether a breaker exists for `key`, without counting as an access
    pub fn contains(&self, key: &str) -> bool {
        self.registry.breakers.contains_key(key)
    }

    /// Number of live breakers
    pub fn len(&self) -> usize {
        self.registry.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.breakers.is_empty()
    }

    /// Whether the background expiry thread is running
    pub fn is_expiring(&self) -> bool {
        self.expiry.as_ref().is_some_and(ExpiryScheduler::is_running)
    }
}

impl<T, E> Drop for BreakerMux<T, E> {
    fn drop(&mut self) {
        if let Some(expiry) = &self.expiry {
            expiry.stop();
        }
    }
}

impl<T, E> std::fmt::Debug for BreakerMux<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerMux")
            .field("breakers", &self.registry.breakers.len())
            .field("template", &self.registry.template)
            .field("expiry", &self.expiry)
            .finish()
    }
}
