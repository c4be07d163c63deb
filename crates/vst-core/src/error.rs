//! Error types for the cache and the retry executor.
//!
//! Both are generic over the caller's own error type so that the cause chain
//! survives: `source()` on either wrapper yields the underlying error.

use std::error::Error as StdError;

use thiserror::Error;

/// A client constructor failed for `key`. The slot is left empty.
#[derive(Debug, Error)]
#[error("failed to construct client for target '{key}': {source}")]
pub struct ConstructionError<E: StdError + 'static> {
    pub key: String,
    pub source: E,
}

/// Why a retried operation ended without a value.
///
/// The messages name only where the loop stopped; the operation's own error
/// is the `source()`, so `{error:#}` prints the full chain once.
#[derive(Debug, Error)]
pub enum RetryError<E: StdError + 'static> {
    /// The operation marked its failure as not retriable on attempt
    /// `attempts`.
    #[error("non-retriable failure on attempt {attempts}")]
    Terminal {
        attempts: u32,
        #[source]
        source: E,
    },

    /// Every attempt in the budget failed retriably. Holds the last error.
    #[error("retry budget exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The cancellation signal fired before an attempt or during backoff.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled {
        attempts: u32,
        #[source]
        last: Option<E>,
    },
}

impl<E: StdError + 'static> RetryError<E> {
    /// Number of completed attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Terminal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation, if any attempt ran.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        match self {
            Self::Terminal { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }

    /// Consume the wrapper and return the last underlying error.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Terminal { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled { last, .. } => last,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
