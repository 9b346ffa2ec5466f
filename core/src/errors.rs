//! Error types for breaker and multiplexer operations

use std::error::Error;
use std::fmt;

/// Errors returned when executing through a circuit breaker
///
/// `Execution` carries the caller's own error untouched. The other variants
/// mean the breaker short-circuited and the closure never ran.
#[derive(Debug)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected
    Open { circuit: String, opened_at: f64 },
    /// Half-open request limit has been reached
    HalfOpenLimitReached { circuit: String },
    /// The wrapped operation failed
    Execution(E),
}

impl<E> CircuitError<E> {
    /// True when the breaker rejected the call without running it
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CircuitError::Open { .. } | CircuitError::HalfOpenLimitReached { .. }
        )
    }

    /// True for the open-circuit short-circuit
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Borrow the execution error, if the closure ran and failed
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }

    /// Take the execution error, if the closure ran and failed
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open { circuit, opened_at } => {
                write!(f, "Circuit '{}' is open (opened at {})", circuit, opened_at)
            }
            CircuitError::HalfOpenLimitReached { circuit } => {
                write!(f, "Circuit '{}' half-open request limit reached", circuit)
            }
            CircuitError::Execution(e) => write!(f, "Circuit execution failed: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for CircuitError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl Error for Boom {}

    #[test]
    fn test_rejections_are_distinguishable() {
        let open: CircuitError<Boom> = CircuitError::Open {
            circuit: "api".to_string(),
            opened_at: 1.5,
        };
        let limited: CircuitError<Boom> = CircuitError::HalfOpenLimitReached {
            circuit: "api".to_string(),
        };
        let failed = CircuitError::Execution(Boom);

        assert!(open.is_rejection());
        assert!(open.is_open());
        assert!(limited.is_rejection());
        assert!(!limited.is_open());
        assert!(!failed.is_rejection());
        assert!(failed.execution().is_some());
        assert!(open.into_execution().is_none());
    }

    #[test]
    fn test_display_and_source() {
        let open: CircuitError<Boom> = CircuitError::Open {
            circuit: "api".to_string(),
            opened_at: 2.0,
        };
        assert_eq!(open.to_string(), "Circuit 'api' is open (opened at 2)");
        assert!(open.source().is_none());

        let failed = CircuitError::Execution(Boom);
        assert_eq!(failed.to_string(), "Circuit execution failed: boom");
        assert_eq!(failed.source().map(|e| e.to_string()), Some("boom".into()));
    }
}
