//! Retry classification for store errors.
//!
//! The executor in `vst-core` never inspects errors, so every store call site
//! routes its result through [`decide`]. A missing record, a closed client,
//! invalid input and schema failures are terminal. Everything else, including
//! transport errors and lock contention on the write transaction, is retried
//! within the budget.

use vst_core::RetryDecision;

use crate::error::DatabaseError;

/// Whether a failed store call may succeed if issued again.
#[must_use]
pub const fn is_retriable(error: &DatabaseError) -> bool {
    !matches!(
        error,
        DatabaseError::NotFound { .. }
            | DatabaseError::Closed { .. }
            | DatabaseError::InvalidState(_)
            | DatabaseError::Migration(_)
    )
}

/// Turn a store result into a retry decision.
pub fn decide<T>(result: Result<T, DatabaseError>) -> RetryDecision<T, DatabaseError> {
    RetryDecision::classify(result, is_retriable)
}
