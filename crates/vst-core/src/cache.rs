//! Per-target lazily constructed client handles.
//!
//! Each target key owns a slot: an async `RwLock<Option<Arc<C>>>`. Readers of
//! a populated slot only take the shared lock. A miss takes the slot's
//! exclusive lock, re-checks, and constructs only if the slot is still empty,
//! so callers queued behind a construction observe its result instead of
//! building their own.
//!
//! The key-to-slot map has its own short-lived lock that is never held across
//! an `.await`, so one target's slow first construction never delays another
//! target.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use tokio::sync::RwLock;

use crate::error::ConstructionError;

/// A shareable session to a remote store.
///
/// Implementations must be safe for concurrent use once published; the cache
/// never guards handle usage.
pub trait ClientHandle: Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;

    /// Release the session. Later calls through outstanding `Arc`s should fail
    /// with an error rather than panic.
    ///
    /// # Errors
    ///
    /// Returns the handle's own error if shutdown fails.
    fn close(&self) -> Result<(), Self::Error>;
}

type Slot<C> = Arc<RwLock<Option<Arc<C>>>>;

/// Keyed cache holding at most one published client per target.
///
/// Owned by the process's top-level composition and shared by `Arc`.
pub struct ClientCache<C> {
    slots: StdRwLock<HashMap<String, Slot<C>>>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            slots: StdRwLock::new(HashMap::new()),
        }
    }
}

impl<C: ClientHandle> ClientCache<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for `key`, constructing it on first use.
    ///
    /// Concurrent callers for the same key wait for the winning construction
    /// and receive the same `Arc`. A failed construction leaves the slot empty
    /// so the next call tries again; nothing is retried here.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError`] wrapping the constructor's error.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &str,
        constructor: F,
    ) -> Result<Arc<C>, ConstructionError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, E>>,
        E: StdError + 'static,
    {
        let slot = self.slot(key);

        if let Some(client) = slot.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut guard = slot.write().await;
        if let Some(client) = guard.as_ref() {
            tracing::debug!(key, "client published by a concurrent caller");
            return Ok(Arc::clone(client));
        }

        tracing::debug!(key, "constructing client");
        let client = constructor()
            .await
            .map_err(|source| ConstructionError {
                key: key.to_string(),
                source,
            })?;
        let client = Arc::new(client);
        *guard = Some(Arc::clone(&client));
        tracing::debug!(key, "client published");
        Ok(client)
    }

    /// Peek at the published client for `key` without constructing.
    pub async fn get(&self, key: &str) -> Option<Arc<C>> {
        let slot = self.existing_slot(key)?;
        let guard = slot.read().await;
        guard.as_ref().map(Arc::clone)
    }

    /// Close and clear the client for `key`. No-op if nothing is published.
    ///
    /// Callers must quiesce users of the handle first: outstanding `Arc`s stay
    /// alive but the handle is closed underneath them.
    ///
    /// # Errors
    ///
    /// Returns the handle's close error. The slot is cleared either way.
    pub async fn close(&self, key: &str) -> Result<(), C::Error> {
        let Some(slot) = self.existing_slot(key) else {
            return Ok(());
        };
        let taken = slot.write().await.take();
        match taken {
            Some(client) => {
                tracing::debug!(key, "closing client");
                client.close()
            }
            None => Ok(()),
        }
    }

    /// Close every published client. All slots are attempted; the first
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first close error encountered.
    pub async fn close_all(&self) -> Result<(), C::Error> {
        let keys: Vec<String> = self.read_slots().keys().cloned().collect();
        let mut first_error = None;
        for key in keys {
            if let Err(error) = self.close(&key).await {
                tracing::warn!(key = %key, %error, "failed to close client");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of slots currently holding a published client.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot<C>> = self.read_slots().values().cloned().collect();
        let mut populated = 0;
        for slot in slots {
            if slot.read().await.is_some() {
                populated += 1;
            }
        }
        populated
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn existing_slot(&self, key: &str) -> Option<Slot<C>> {
        self.read_slots().get(key).cloned()
    }

    fn slot(&self, key: &str) -> Slot<C> {
        if let Some(slot) = self.existing_slot(key) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Slot<C>>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }
}
