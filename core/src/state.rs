//! Public view of a breaker's lifecycle state

use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Calls pass through and outcomes are counted
    Closed,
    /// Calls are rejected until the open timeout elapses
    Open,
    /// A limited number of probe calls decide whether to close again
    HalfOpen,
}

impl State {
    /// Map a state-machine state name onto the public enum
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}
