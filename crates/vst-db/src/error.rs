//! Error types for vst-db.

use thiserror::Error;
use vst_config::ConfigError;
use vst_core::{ConstructionError, RetryError};

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A row could not be decoded.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// The requested record does not exist.
    #[error("Entity not found: {kind} {id}")]
    NotFound { kind: String, id: i64 },

    /// The client was closed; reopen through the cache.
    #[error("Store client for '{target}' is closed")]
    Closed { target: String },

    /// Invalid state encountered (e.g., bad input to a store call).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Filesystem error preparing a local database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from [`ItemService`](crate::service::ItemService) operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The shared client could not be constructed within the retry budget.
    #[error("failed to acquire store client")]
    Connect(#[from] RetryError<ConstructionError<DatabaseError>>),

    /// A retried store operation failed.
    #[error(transparent)]
    Store(#[from] RetryError<DatabaseError>),

    /// A single, non-retried store call failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    /// Whether the failure is a missing record, however it was reached.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        let db = match self {
            Self::Store(e) => e.last_error(),
            Self::Database(e) => Some(e),
            Self::Config(_) | Self::Connect(_) => None,
        };
        matches!(db, Some(DatabaseError::NotFound { .. }))
    }
}
