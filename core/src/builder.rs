//! Builder API for ergonomic multiplexer configuration

use crate::{
    Counts, State,
    callbacks::Callbacks,
    classifier::{PredicateClassifier, SuccessClassifier},
    mux::BreakerMux,
    settings::Settings,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating breaker multiplexers with fluent API
pub struct MuxBuilder<T, E> {
    settings: Settings<T, E>,
}

impl<T, E> MuxBuilder<T, E> {
    /// Create a new builder around an execution-closure factory
    pub fn new<F, G>(exec_closure: F) -> Self
    where
        F: Fn(&str) -> G + Send + Sync + 'static,
        G: FnOnce() -> Result<T, E> + 'static,
    {
        Self {
            settings: Settings::new(exec_closure),
        }
    }

    /// Requests admitted while half-open, and consecutive successes needed to close
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.settings.breaker.max_requests = max_requests;
        self
    }

    /// Period after which a closed breaker clears its counts
    pub fn interval(mut self, interval: Duration) -> Self {
        self.settings.breaker.interval = interval;
        self
    }

    /// Time spent open before probing in half-open
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.breaker.timeout = timeout;
        self
    }

    /// Set jitter factor (0.0 = no jitter, 1.0 = full jitter)
    ///
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    /// For example, 0.25 means a 60s timeout becomes 45-60s.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.settings.breaker.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Replace the trip predicate
    pub fn ready_to_trip<F>(mut self, f: F) -> Self
    where
        F: Fn(Counts) -> bool + Send + Sync + 'static,
    {
        self.settings.breaker.ready_to_trip = Arc::new(f);
        self
    }

    /// Trip once `threshold` consecutive failures have been seen
    pub fn failure_threshold(self, threshold: u32) -> Self {
        self.ready_to_trip(move |counts| counts.consecutive_failures >= threshold)
    }

    /// Set callback for every state transition
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.settings.breaker.callbacks = Callbacks::on_state_change(f);
        self
    }

    /// Treat errors matching `predicate` as successes
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breaker_mux::BreakerMux;
    ///
    /// // A missing record is an answer, not an outage
    /// let mux = BreakerMux::builder(|id: &str| {
    ///     let missing = id.starts_with("missing");
    ///     move || if missing { Err("not found") } else { Ok(()) }
    /// })
    /// .failure_threshold(1)
    /// .is_successful(|err| *err == "not found")
    /// .build();
    ///
    /// assert!(mux.get("missing-1").is_err());
    /// assert!(mux.get("missing-1").unwrap_err().execution().is_some());
    /// ```
    pub fn is_successful<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
        E: 'static,
    {
        self.success_classifier(Arc::new(PredicateClassifier::new(predicate)))
    }

    /// Set a custom success classifier
    pub fn success_classifier(mut self, classifier: Arc<dyn SuccessClassifier<E>>) -> Self {
        self.settings.breaker.is_successful = classifier;
        self
    }

    /// Idle time after which a breaker is evicted; zero evicts all on every sweep
    pub fn expire_after(mut self, expire_after: Duration) -> Self {
        self.settings.expire_after = expire_after;
        self
    }

    /// Sweep period for background expiry; zero disables it
    pub fn expire_check(mut self, expire_check: Duration) -> Self {
        self.settings.expire_check = expire_check;
        self
    }

    /// Finish without starting anything
    pub fn into_settings(self) -> Settings<T, E> {
        self.settings
    }
}

impl<T: 'static, E: 'static> MuxBuilder<T, E> {
    /// Build the multiplexer
    pub fn build(self) -> BreakerMux<T, E> {
        BreakerMux::new(self.settings)
    }
}

impl<T, E> std::fmt::Debug for MuxBuilder<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxBuilder")
            .field("settings", &self.settings)
            .finish()
    }
}
