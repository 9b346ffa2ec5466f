//! Success classification for returned errors
//!
//! A breaker counts every `Ok` as a success. For `Err` values it asks a
//! [`SuccessClassifier`] whether the error should still be counted as a
//! success (a 404 from a healthy backend, a validation error, ...). The error
//! is returned to the caller either way; classification only affects the
//! breaker's accounting.

/// Decides whether an error returned by the wrapped operation counts as a
/// success for breaker accounting
///
/// # Examples
///
/// ```rust
/// use breaker_mux::SuccessClassifier;
///
/// #[derive(Debug)]
/// struct IgnoreNotFound;
///
/// impl SuccessClassifier<u16> for IgnoreNotFound {
///     fn is_successful(&self, status: &u16) -> bool {
///         *status == 404
///     }
/// }
///
/// assert!(IgnoreNotFound.is_successful(&404));
/// assert!(!IgnoreNotFound.is_successful(&503));
/// ```
pub trait SuccessClassifier<E>: Send + Sync + std::fmt::Debug {
    /// Returns `true` if this error should be recorded as a success
    fn is_successful(&self, err: &E) -> bool;
}

/// Default classifier: every error is a failure
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<E> SuccessClassifier<E> for DefaultClassifier {
    fn is_successful(&self, _err: &E) -> bool {
        false
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    /// Create a new predicate-based classifier
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> SuccessClassifier<E> for PredicateClassifier<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_successful(&self, err: &E) -> bool {
        (self.predicate)(err)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
