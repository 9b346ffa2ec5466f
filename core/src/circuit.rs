//! Circuit breaker implementation using state machines
//!
//! The state machine lives behind a short-lived lock: it is taken once to
//! admit a request and once to account for its outcome, never while the
//! wrapped operation runs. Every state change starts a new generation and
//! clears the counts; outcomes that arrive for an older generation are
//! dropped from accounting.

use crate::{
    State,
    counts::{CountTracker, Counts},
    errors::CircuitError,
    settings::{BreakerSettings, TripFn, default_ready_to_trip},
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub counts: Arc<CountTracker>,
    pub ready_to_trip: TripFn,
    pub max_requests: u32,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            counts: Arc::new(CountTracker::new()),
            ready_to_trip: Arc::new(default_ready_to_trip),
            max_requests: 1,
        }
    }
}

impl std::fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("counts", &self.counts)
            .field("ready_to_trip", &"<closure>")
            .field("max_requests", &self.max_requests)
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
    /// Open timeout for this opening, jitter already applied
    pub timeout_secs: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub consecutive_successes: u32,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Ask the trip policy about the counts recorded so far
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        (ctx.ready_to_trip)(ctx.counts.snapshot())
    }
}

impl Circuit<HalfOpen> {
    /// Any failure while probing reopens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    /// Check if enough probes succeeded to close circuit
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        let data = self
            .state_data_half_open()
            .expect("HalfOpen state must have data");
        data.consecutive_successes >= ctx.max_requests
    }
}

impl Circuit<Open> {
    /// Check if timeout has elapsed for Open -> HalfOpen transition
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let data = self.state_data_open().expect("Open state must have data");
        let elapsed = ctx.counts.monotonic_time() - data.opened_at;
        elapsed >= data.timeout_secs
    }
}

struct Inner {
    machine: DynamicCircuit,
    generation: u64,
    /// Monotonic deadline at which closed-state counts reset
    expiry: Option<f64>,
}

/// A single circuit breaker
///
/// Safe to share between threads; concurrent `execute` calls run their
/// operations in parallel.
pub struct CircuitBreaker<E> {
    context: CircuitContext,
    settings: BreakerSettings<E>,
    inner: Mutex<Inner>,
}

impl<E> CircuitBreaker<E> {
    /// Create a new circuit breaker from its settings
    pub fn new(settings: BreakerSettings<E>) -> Self {
        let context = CircuitContext {
            name: settings.name.clone(),
            counts: Arc::new(CountTracker::new()),
            ready_to_trip: Arc::clone(&settings.ready_to_trip),
            max_requests: settings.effective_max_requests(),
        };

        let machine = DynamicCircuit::new(context.clone());
        let now = context.counts.monotonic_time();

        let breaker = Self {
            context,
            settings,
            inner: Mutex::new(Inner {
                machine,
                generation: 0,
                expiry: None,
            }),
        };
        breaker.inner.lock().expiry = breaker.closed_expiry(now);
        breaker
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// Returns the operation's own result, or a rejection without running it
    /// when the circuit is open or the half-open probe budget is used up. An
    /// error the success classifier accepts is still returned to the caller.
    ///
    /// State-change callbacks fire from inside this call while the breaker's
    /// lock is held, so they must not call back into the same breaker.
    pub fn execute<T, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let generation = self.before_request()?;

        let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => {
                self.after_request(generation, false);
                panic::resume_unwind(payload);
            }
        };

        let success = match &result {
            Ok(_) => true,
            Err(e) => self.settings.is_successful.is_successful(e),
        };
        self.after_request(generation, success);

        result.map_err(CircuitError::Execution)
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Current state, applying any transition that is due by now
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        let now = self.now();
        self.refresh(&mut inner, now);
        State::from_name(inner.machine.current_state())
    }

    /// Counts for the current generation
    pub fn counts(&self) -> Counts {
        let _inner = self.inner.lock();
        self.context.counts.snapshot()
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    fn before_request(&self) -> Result<u64, CircuitError<E>> {
        let mut inner = self.inner.lock();
        let now = self.now();
        self.refresh(&mut inner, now);

        match inner.machine.current_state() {
            "Open" => {
                let opened_at = inner.machine.open_data().map(|d| d.opened_at).unwrap_or(0.0);
                return Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    opened_at,
                });
            }
            "HalfOpen" if self.context.counts.snapshot().requests >= self.context.max_requests => {
                return Err(CircuitError::HalfOpenLimitReached {
                    circuit: self.context.name.clone(),
                });
            }
            _ => {}
        }

        self.context.counts.on_request();
        Ok(inner.generation)
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = self.now();
        self.refresh(&mut inner, now);

        if inner.generation != before {
            return;
        }

        if success {
            self.on_success(&mut inner, now);
        } else {
            self.on_failure(&mut inner, now);
        }
    }

    fn on_success(&self, inner: &mut Inner, now: f64) {
        self.context.counts.on_success();

        if inner.machine.current_state() == "HalfOpen" {
            if let Some(data) = inner.machine.half_open_data_mut() {
                data.consecutive_successes += 1;
            }

            // Try to close the circuit
            if inner.machine.handle(CircuitEvent::Close).is_ok() {
                self.enter(inner, State::HalfOpen, State::Closed, now);
            }
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: f64) {
        self.context.counts.on_failure();

        let from = State::from_name(inner.machine.current_state());
        if inner.machine.handle(CircuitEvent::Trip).is_ok() {
            self.mark_open(inner, now);
            self.enter(inner, from, State::Open, now);
        }
    }

    /// Apply time-based transitions: closed-state count resets and the
    /// Open -> HalfOpen timeout
    fn refresh(&self, inner: &mut Inner, now: f64) {
        match inner.machine.current_state() {
            "Closed" => {
                if let Some(expiry) = inner.expiry
                    && expiry <= now
                {
                    self.new_generation(inner, State::Closed, now);
                }
            }
            "Open" => {
                if inner.machine.handle(CircuitEvent::AttemptReset).is_ok() {
                    self.enter(inner, State::Open, State::HalfOpen, now);
                }
            }
            _ => {}
        }
    }

    fn enter(&self, inner: &mut Inner, from: State, to: State, now: f64) {
        self.new_generation(inner, to, now);
        self.settings
            .callbacks
            .trigger_state_change(&self.context.name, from, to);
    }

    fn new_generation(&self, inner: &mut Inner, state: State, now: f64) {
        inner.generation = inner.generation.wrapping_add(1);
        self.context.counts.clear();
        inner.expiry = match state {
            State::Closed => self.closed_expiry(now),
            State::Open | State::HalfOpen => None,
        };
    }

    /// Apply Open-state bookkeeping (timestamp + jittered timeout)
    fn mark_open(&self, inner: &mut Inner, now: f64) {
        let timeout_secs = self.open_timeout_secs();
        if let Some(data) = inner.machine.open_data_mut() {
            data.opened_at = now;
            data.timeout_secs = timeout_secs;
        }
    }

    fn closed_expiry(&self, now: f64) -> Option<f64> {
        if self.settings.interval.is_zero() {
            None
        } else {
            Some(now + self.settings.interval.as_secs_f64())
        }
    }

    fn open_timeout_secs(&self) -> f64 {
        let timeout = self.settings.effective_timeout();

        // Apply jitter using chrono-machines if jitter_factor > 0
        if self.settings.jitter_factor > 0.0 {
            let timeout_ms = timeout.as_millis() as u64;
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: timeout_ms,
                multiplier: 1.0,
                max_delay_ms: timeout_ms,
            };
            let jittered_ms = policy.calculate_delay(1, self.settings.jitter_factor);
            (jittered_ms as f64) / 1000.0
        } else {
            timeout.as_secs_f64()
        }
    }

    fn now(&self) -> f64 {
        self.context.counts.monotonic_time()
    }
}

impl<E> std::fmt::Debug for CircuitBreaker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use crate::classifier::PredicateClassifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn breaker(settings: BreakerSettings<&'static str>) -> CircuitBreaker<&'static str> {
        CircuitBreaker::new(BreakerSettings {
            name: "test".to_string(),
            ..settings
        })
    }

    fn trip_after(failures: u32) -> TripFn {
        Arc::new(move |counts: Counts| counts.consecutive_failures >= failures)
    }

    #[test]
    fn test_circuit_breaker_creation() {
        let circuit = breaker(BreakerSettings::default());

        assert!(circuit.is_closed());
        assert!(!circuit.is_open());
        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.counts(), Counts::default());
    }

    #[test]
    fn test_default_policy_trips_on_sixth_failure() {
        let circuit = breaker(BreakerSettings::default());
        let runs = AtomicUsize::new(0);

        for i in 0..5 {
            let result = circuit.execute(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            });
            assert!(matches!(result, Err(CircuitError::Execution("boom"))), "call {}", i);
            assert!(circuit.is_closed());
        }

        // Sixth failure runs and trips
        let result = circuit.execute(|| {
            runs.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        });
        assert!(matches!(result, Err(CircuitError::Execution(_))));
        assert!(circuit.is_open());

        // From now on the operation is not invoked
        for _ in 0..10 {
            let result = circuit.execute(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            });
            assert!(matches!(result, Err(CircuitError::Open { .. })));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(3),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error 1"));
        let _ = circuit.execute(|| Err::<(), _>("error 2"));
        let _ = circuit.execute(|| Ok::<_, &str>(()));
        let _ = circuit.execute(|| Err::<(), _>("error 3"));
        assert!(circuit.is_closed());

        let counts = circuit.counts();
        assert_eq!(counts.requests, 4);
        assert_eq!(counts.total_failures, 3);
        assert_eq!(counts.consecutive_failures, 1);
    }

    #[test]
    fn test_open_to_half_open_after_timeout() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(5),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        assert_eq!(circuit.state(), State::Open);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(circuit.state(), State::HalfOpen);
        assert_eq!(circuit.counts(), Counts::default());
    }

    #[test]
    fn test_half_open_success_closes() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(2),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        std::thread::sleep(Duration::from_millis(5));

        let result = circuit.execute(|| Ok::<_, &str>("probe"));
        assert_eq!(result.ok(), Some("probe"));
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(2),
            max_requests: 3,
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(circuit.state(), State::HalfOpen);

        let _ = circuit.execute(|| Ok::<_, &str>(()));
        assert_eq!(circuit.state(), State::HalfOpen);

        let _ = circuit.execute(|| Err::<(), _>("still broken"));
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_half_open_needs_max_requests_successes() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(2),
            max_requests: 2,
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        std::thread::sleep(Duration::from_millis(5));

        let _ = circuit.execute(|| Ok::<_, &str>(()));
        assert_eq!(circuit.state(), State::HalfOpen);

        let _ = circuit.execute(|| Ok::<_, &str>(()));
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_half_open_limit_rejects_extra_probes() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(2),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        std::thread::sleep(Duration::from_millis(5));

        // The outer probe is in flight while the nested one asks for admission
        let result = circuit.execute(|| {
            let nested = circuit.execute(|| Ok::<_, &str>(()));
            assert!(matches!(
                nested,
                Err(CircuitError::HalfOpenLimitReached { ref circuit }) if circuit == "test"
            ));
            Ok::<_, &str>(())
        });

        assert!(result.is_ok());
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_classified_errors_count_as_success() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(2),
            is_successful: Arc::new(PredicateClassifier::new(|e: &&str| e.starts_with("client"))),
            ..Default::default()
        });

        for _ in 0..5 {
            let result = circuit.execute(|| Err::<(), _>("client_error"));
            // Still surfaced to the caller
            assert!(matches!(result, Err(CircuitError::Execution("client_error"))));
        }
        assert!(circuit.is_closed());
        assert_eq!(circuit.counts().total_successes, 5);

        let _ = circuit.execute(|| Err::<(), _>("server_error_1"));
        let _ = circuit.execute(|| Err::<(), _>("server_error_2"));
        assert!(circuit.is_open());
    }

    #[test]
    fn test_interval_clears_closed_counts() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(3),
            interval: Duration::from_millis(20),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error 1"));
        let _ = circuit.execute(|| Err::<(), _>("error 2"));
        std::thread::sleep(Duration::from_millis(30));
        let _ = circuit.execute(|| Err::<(), _>("error 3"));

        assert!(circuit.is_closed());
        assert_eq!(circuit.counts().consecutive_failures, 1);
    }

    #[test]
    fn test_state_change_callbacks() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            timeout: Duration::from_millis(2),
            callbacks: Callbacks::on_state_change(move |name, from, to| {
                assert_eq!(name, "test");
                seen_clone.lock().unwrap().push((from, to));
            }),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        std::thread::sleep(Duration::from_millis(5));
        let _ = circuit.execute(|| Ok::<_, &str>(()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (State::Closed, State::Open),
                (State::Open, State::HalfOpen),
                (State::HalfOpen, State::Closed),
            ]
        );
    }

    #[test]
    fn test_stale_generation_outcome_is_ignored() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            ..Default::default()
        });

        // The breaker trips while the outer call is still running
        let result = circuit.execute(|| {
            let _ = circuit.execute(|| Err::<(), _>("inner failure"));
            Ok::<_, &str>("outer")
        });

        assert_eq!(result.ok(), Some("outer"));
        assert!(circuit.is_open());
        assert_eq!(circuit.counts().total_successes, 0);
    }

    #[test]
    fn test_panic_counts_as_failure() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            ..Default::default()
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = circuit.execute(|| -> Result<(), &str> { panic!("operation blew up") });
        }));

        assert!(outcome.is_err());
        assert!(circuit.is_open());
    }

    #[test]
    fn test_open_error_reports_circuit() {
        let circuit = breaker(BreakerSettings {
            ready_to_trip: trip_after(1),
            ..Default::default()
        });

        let _ = circuit.execute(|| Err::<(), _>("error"));
        match circuit.execute(|| Ok::<_, &str>(())) {
            Err(CircuitError::Open { circuit, opened_at }) => {
                assert_eq!(circuit, "test");
                assert!(opened_at >= 0.0);
            }
            other => panic!("Expected CircuitError::Open, got: {:?}", other),
        }
    }

    #[test]
    fn test_jitter_distribution_within_bounds() {
        // With 25% jitter on 1000ms base, expect 750-1000ms range
        let circuit = breaker(BreakerSettings {
            timeout: Duration::from_secs(1),
            jitter_factor: 0.25,
            ..Default::default()
        });

        for _ in 0..50 {
            let timeout = circuit.open_timeout_secs();
            assert!(timeout >= 0.75 - 0.01, "timeout {} below bound", timeout);
            assert!(timeout <= 1.0 + 0.01, "timeout {} above bound", timeout);
        }
    }

    #[test]
    fn test_zero_jitter_produces_constant_timeout() {
        let circuit = breaker(BreakerSettings {
            timeout: Duration::from_millis(1500),
            ..Default::default()
        });

        for _ in 0..10 {
            assert_eq!(circuit.open_timeout_secs(), 1.5);
        }
    }

    #[test]
    fn test_concurrent_executions_share_counts() {
        let circuit = Arc::new(breaker(BreakerSettings {
            ready_to_trip: Arc::new(|_| false),
            ..Default::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let circuit = Arc::clone(&circuit);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = circuit.execute(|| if i % 2 == 0 { Ok(()) } else { Err("odd") });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let counts = circuit.counts();
        assert_eq!(counts.requests, 200);
        assert_eq!(counts.total_successes, 100);
        assert_eq!(counts.total_failures, 100);
    }
}
