//! # vst-db
//!
//! libSQL item store for vstore, and the service that composes it with the
//! shared client cache and the retry executor.
//!
//! A [`StoreClient`] is one handle to one project's database. It is cheap to
//! share: every operation opens its own `libsql::Connection` from the shared
//! `libsql::Database`, so concurrent transactions never interleave on a
//! single connection.

pub mod entities;
pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod retry;
pub mod service;
pub mod updates;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use error::DatabaseError;
use libsql::{Builder, TransactionBehavior};
use vst_config::StoreConfig;
use vst_core::ClientHandle;

/// Milliseconds a local connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Handle to one project's item store.
pub struct StoreClient {
    db: libsql::Database,
    target: String,
    remote: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("target", &self.target)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Open a local database file for `target`, creating parent directories.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created, the
    /// database cannot be opened, or migrations fail.
    pub async fn open_local(target: &str, path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new_local(path).build().await?;

        let client = Self {
            db,
            target: target.to_string(),
            remote: false,
            closed: AtomicBool::new(false),
        };

        let conn = client.connect().await?;
        // journal_mode answers with a row, so it must go through query().
        conn.query("PRAGMA journal_mode = WAL", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA journal_mode: {e}")))?;
        migrations::run_migrations(&conn).await?;

        tracing::debug!(project = target, path = %path.display(), "opened local store");
        Ok(client)
    }

    /// Open a remote (Turso) database for `target`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the connection or migrations fail.
    pub async fn open_remote(
        target: &str,
        url: &str,
        auth_token: &str,
    ) -> Result<Self, DatabaseError> {
        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await?;

        let client = Self {
            db,
            target: target.to_string(),
            remote: true,
            closed: AtomicBool::new(false),
        };
        migrations::run_migrations(&client.connect().await?).await?;

        tracing::debug!(project = target, url, "opened remote store");
        Ok(client)
    }

    /// Open the store for `project` as described by `config`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open_local`] / [`Self::open_remote`].
    pub async fn open(config: &StoreConfig, project: &str) -> Result<Self, DatabaseError> {
        if config.is_remote() {
            Self::open_remote(project, &config.remote_url(project), &config.auth_token).await
        } else {
            Self::open_local(project, &config.local_path(project)).await
        }
    }

    /// The project this client writes to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.remote
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open a fresh connection for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Closed`] once the client has been closed.
    pub async fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::Closed {
                target: self.target.clone(),
            });
        }
        let conn = self.db.connect()?;
        if !self.remote {
            conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
                .await?;
        }
        Ok(conn)
    }

    /// Begin a write transaction. Local databases take the write lock up
    /// front so two read-modify-writes cannot both read before either writes.
    pub(crate) async fn begin_write(
        &self,
        conn: &libsql::Connection,
    ) -> Result<libsql::Transaction, DatabaseError> {
        let behavior = if self.remote {
            TransactionBehavior::Deferred
        } else {
            TransactionBehavior::Immediate
        };
        Ok(conn.transaction_with_behavior(behavior).await?)
    }
}

impl ClientHandle for StoreClient {
    type Error = DatabaseError;

    /// Mark the client closed. Idempotent; the database file is released
    /// when the last `Arc` is dropped.
    fn close(&self) -> Result<(), Self::Error> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(project = %self.target, "store client closed");
        }
        Ok(())
    }
}
