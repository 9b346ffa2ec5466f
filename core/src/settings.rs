//! Breaker and multiplexer configuration

use crate::{
    Counts, State,
    callbacks::Callbacks,
    classifier::{DefaultClassifier, SuccessClassifier},
};
use std::sync::Arc;
use std::time::Duration;

/// Open-state timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Consecutive failures the default trip policy tolerates before opening
pub const DEFAULT_CONSECUTIVE_FAILURES: u32 = 5;

/// Trip predicate, evaluated after every failure in the closed state
pub type TripFn = Arc<dyn Fn(Counts) -> bool + Send + Sync>;

/// Type alias for callable function
pub type CallableFn<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

/// Execution-closure factory: turns an argument into the operation to run
pub type ExecClosure<T, E> = Arc<dyn Fn(&str) -> CallableFn<T, E> + Send + Sync>;

/// The default trip policy: more than five consecutive failures
pub fn default_ready_to_trip(counts: Counts) -> bool {
    counts.consecutive_failures > DEFAULT_CONSECUTIVE_FAILURES
}

/// Per-breaker configuration
///
/// The multiplexer keeps one of these as a template and hands every new
/// breaker a copy renamed after its key.
pub struct BreakerSettings<E> {
    /// Breaker name, reported to callbacks and in errors
    pub name: String,

    /// Requests admitted while half-open; also the number of consecutive
    /// successes needed to close again. Zero is treated as one.
    pub max_requests: u32,

    /// Cyclic period after which the closed state clears its counts.
    /// Zero never clears.
    pub interval: Duration,

    /// Time spent open before probing in half-open.
    /// Zero falls back to [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,

    /// Jitter factor for the open timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,

    /// Decides from the current counts whether a failure should open the circuit
    pub ready_to_trip: TripFn,

    /// State transition listeners
    pub callbacks: Callbacks,

    /// Decides whether an error still counts as a success
    pub is_successful: Arc<dyn SuccessClassifier<E>>,
}

impl<E> BreakerSettings<E> {
    /// Copy of these settings with the name replaced
    pub fn named(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub(crate) fn effective_max_requests(&self) -> u32 {
        self.max_requests.max(1)
    }

    pub(crate) fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

impl<E> Default for BreakerSettings<E> {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            jitter_factor: 0.0,
            ready_to_trip: Arc::new(default_ready_to_trip),
            callbacks: Callbacks::new(),
            is_successful: Arc::new(DefaultClassifier),
        }
    }
}

impl<E> Clone for BreakerSettings<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_requests: self.max_requests,
            interval: self.interval,
            timeout: self.timeout,
            jitter_factor: self.jitter_factor,
            ready_to_trip: Arc::clone(&self.ready_to_trip),
            callbacks: self.callbacks.clone(),
            is_successful: Arc::clone(&self.is_successful),
        }
    }
}

impl<E> std::fmt::Debug for BreakerSettings<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("jitter_factor", &self.jitter_factor)
            .field("ready_to_trip", &"<closure>")
            .field("callbacks", &self.callbacks)
            .field("is_successful", &self.is_successful)
            .finish()
    }
}

/// Full multiplexer configuration: the breaker template, the execution-closure
/// factory and the expiry policy
///
/// Moved into the multiplexer at construction; it cannot be changed afterwards.
pub struct Settings<T, E> {
    /// Template for every per-key breaker
    pub breaker: BreakerSettings<E>,

    /// Builds the operation to run from the key (or the explicit exec argument)
    pub exec_closure: ExecClosure<T, E>,

    /// Idle time after which a breaker is evicted. Zero evicts every breaker
    /// on every sweep.
    pub expire_after: Duration,

    /// Sweep period. Zero disables background expiry.
    pub expire_check: Duration,
}

impl<T, E> Settings<T, E> {
    /// Settings with default breaker configuration and no expiry
    pub fn new<F, G>(exec_closure: F) -> Self
    where
        F: Fn(&str) -> G + Send + Sync + 'static,
        G: FnOnce() -> Result<T, E> + 'static,
    {
        Self {
            breaker: BreakerSettings::default(),
            exec_closure: Arc::new(move |arg: &str| Box::new(exec_closure(arg)) as CallableFn<T, E>),
            expire_after: Duration::ZERO,
            expire_check: Duration::ZERO,
        }
    }

    /// Set the state-change listener on the breaker template
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.breaker.callbacks = Callbacks::on_state_change(f);
        self
    }
}

impl<T, E> std::fmt::Debug for Settings<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("breaker", &self.breaker)
            .field("exec_closure", &"<closure>")
            .field("expire_after", &self.expire_after)
            .field("expire_check", &self.expire_check)
            .finish()
    }
}
