//! Callback system for circuit breaker state transitions

use crate::State;
use std::sync::Arc;

/// Signature of a state-change listener: `(circuit_name, from, to)`
pub type StateChangeFn = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_state_change: Option<StateChangeFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self {
            on_state_change: None,
        }
    }

    /// Build callbacks around a single state-change listener
    pub fn on_state_change<F>(f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        Self {
            on_state_change: Some(Arc::new(f)),
        }
    }

    pub fn trigger_state_change(&self, circuit: &str, from: State, to: State) {
        tracing::debug!(circuit, %from, %to, "circuit state changed");
        if let Some(ref callback) = self.on_state_change {
            callback(circuit, from, to);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}
