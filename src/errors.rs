/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 *
 * Acquisition timeouts are not errors: every `try_*` acquisition reports
 * contention as `None`. The variants here cover precondition violations
 * and abandoned deferred work.
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for fallible operations in this crate
pub type GuardedResult<T> = Result<T, GuardedError>;

/// Errors surfaced by the protected value family and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum GuardedError {
    #[error("Index {index} out of range for a pool of {len}")]
    #[diagnostic(
        code(guarded::index_out_of_range),
        help("Indexed lines are fixed at construction. Use an index below the pool size.")
    )]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Deferred mutation was dropped before it was applied")]
    #[diagnostic(
        code(guarded::mutation_abandoned),
        help("The protected value was torn down while the mutation was still queued.")
    )]
    MutationAbandoned,

    #[error("Promise for {key} was dropped without a value")]
    #[diagnostic(
        code(guarded::promise_broken),
        help("The value was released with finished_with_value or its holder was dropped.")
    )]
    PromiseBroken { key: String },

    #[error("Timed out waiting for a deferred result")]
    #[diagnostic(
        code(guarded::wait_timeout),
        help("The mutation is still queued. Wait again or drain the queue from another thread.")
    )]
    WaitTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardedError::IndexOutOfRange { index: 7, len: 4 };
        assert_eq!(err.to_string(), "Index 7 out of range for a pool of 4");
        assert_eq!(
            GuardedError::MutationAbandoned.to_string(),
            "Deferred mutation was dropped before it was applied"
        );
    }

    #[test]
    fn test_error_diagnostic_code() {
        let err = GuardedError::WaitTimeout;
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("guarded::wait_timeout"));
    }
}
