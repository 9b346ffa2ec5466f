//! BreakerMux - Keyed multiplexer of circuit breakers
//!
//! This crate keeps one circuit breaker per key, created lazily from a shared
//! template:
//! - Per-key breakers named after their key (Closed → Open → HalfOpen)
//! - Generation-based counts so stale outcomes never leak into a new state
//! - Optional background expiry of idle breakers
//! - Monotonic time tracking for open timeouts and count intervals
//!
//! # Example
//!
//! ```rust
//! use breaker_mux::{BreakerMux, State};
//! use std::time::Duration;
//!
//! let mux = BreakerMux::builder(|host: &str| {
//!     let up = host != "down.example.com";
//!     move || if up { Ok("pong") } else { Err("connection refused") }
//! })
//! .failure_threshold(3)
//! .timeout(Duration::from_secs(30))
//! .on_state_change(|name, from, to| println!("{}: {} -> {}", name, from, to))
//! .build();
//!
//! assert_eq!(mux.get("up.example.com").unwrap(), "pong");
//!
//! for _ in 0..3 {
//!     let _ = mux.get("down.example.com");
//! }
//! assert_eq!(mux.state("down.example.com"), Some(State::Open));
//! assert!(mux.get("down.example.com").unwrap_err().is_open());
//!
//! // Other keys are unaffected
//! assert_eq!(mux.get("up.example.com").unwrap(), "pong");
//! mux.close();
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod counts;
pub mod errors;
mod expiry;
pub mod mux;
pub mod settings;
pub mod slot;
pub mod state;

pub use builder::MuxBuilder;
pub use callbacks::{Callbacks, StateChangeFn};
pub use circuit::CircuitBreaker;
pub use classifier::{DefaultClassifier, PredicateClassifier, SuccessClassifier};
pub use counts::Counts;
pub use errors::CircuitError;
pub use mux::BreakerMux;
pub use settings::{
    BreakerSettings, CallableFn, DEFAULT_CONSECUTIVE_FAILURES, DEFAULT_TIMEOUT, ExecClosure, Settings, TripFn,
    default_ready_to_trip,
};
pub use slot::Slot;
pub use state::State;
