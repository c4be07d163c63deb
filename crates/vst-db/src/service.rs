//! Service layer composing the client cache, the item store and the retry
//! executor.
//!
//! `ItemService` owns no clients itself. Shared clients live in the
//! [`ClientCache`] handed in by the binary; per-call and per-attempt clients
//! are opened and closed around the work they do.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use vst_config::VstConfig;
use vst_core::{ClientCache, ClientHandle, Retry, RetryDecision, RetryError};

use crate::StoreClient;
use crate::entities::{Item, kinds};
use crate::error::{DatabaseError, ServiceError};
use crate::retry::{decide, is_retriable};
use crate::updates::item::ItemUpdate;

/// How a write acquires its store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientMode {
    /// Open a client for the call and close it afterwards.
    PerCall,
    /// The cached client for the primary project.
    Shared,
    /// The cached client for the secondary project.
    SharedOtherProject,
    /// Open a fresh client inside every retry attempt.
    PerAttempt,
}

impl ClientMode {
    pub const ALL: [Self; 4] = [
        Self::PerCall,
        Self::Shared,
        Self::SharedOtherProject,
        Self::PerAttempt,
    ];

    /// Item kind written by this mode.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::PerCall => kinds::ITEM_V1,
            Self::Shared | Self::SharedOtherProject => kinds::ONLY_ONE_CLIENT,
            Self::PerAttempt => kinds::CREATE_CLIENT_EVERY_TIME_RETRY,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerCall => "per-call",
            Self::Shared => "shared",
            Self::SharedOtherProject => "shared-other-project",
            Self::PerAttempt => "per-attempt",
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMode {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| DatabaseError::InvalidState(format!("unknown client mode '{s}'")))
    }
}

/// Fields a caller supplies for a new item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostItem {
    pub lot: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub contents: Vec<String>,
}

impl PostItem {
    fn into_item(self, kind: &str) -> Item {
        Item::new(kind, self.lot, self.index, self.contents)
    }
}

pub struct ItemService {
    cache: Arc<ClientCache<StoreClient>>,
    config: VstConfig,
    retry: Retry,
}

impl ItemService {
    /// Store operations retry within `config.retry.store_write_attempts`.
    #[must_use]
    pub fn new(cache: Arc<ClientCache<StoreClient>>, config: VstConfig) -> Self {
        let retry = Retry::new(config.retry.store_policy());
        Self {
            cache,
            config,
            retry,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<ClientCache<StoreClient>> {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &VstConfig {
        &self.config
    }

    /// The project a mode writes to.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] when the secondary project is needed
    /// but not configured.
    pub fn project_for(&self, mode: ClientMode) -> Result<&str, ServiceError> {
        match mode {
            ClientMode::SharedOtherProject => Ok(self.config.other_project()?),
            ClientMode::PerCall | ClientMode::Shared | ClientMode::PerAttempt => {
                Ok(&self.config.project.id)
            }
        }
    }

    /// The cached client for `project`, constructing it on first use.
    /// Construction is retried within the store budget.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Connect`] when no client could be opened.
    pub async fn shared_client(&self, project: &str) -> Result<Arc<StoreClient>, ServiceError> {
        let store = &self.config.store;
        let cache = &self.cache;
        let client = self
            .retry
            .run(|attempt| async move {
                tracing::debug!(project, attempt, "acquiring shared store client");
                let result = cache
                    .get_or_create(project, || StoreClient::open(store, project))
                    .await;
                RetryDecision::classify(result, |e| is_retriable(&e.source))
            })
            .await?;
        Ok(client)
    }

    /// Save a new item through the client `mode` selects.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] once the write budget is spent or on a
    /// terminal store error.
    pub async fn post(&self, form: PostItem, mode: ClientMode) -> Result<Item, ServiceError> {
        let project = self.project_for(mode)?;
        let item = form.into_item(mode.kind());
        tracing::debug!(%mode, project, kind = %item.kind, "posting item");

        match mode {
            ClientMode::Shared | ClientMode::SharedOtherProject => {
                let client = self.shared_client(project).await?;
                Ok(self.put_with_retry(&client, item).await?)
            }
            ClientMode::PerCall => {
                let client = StoreClient::open(&self.config.store, project).await?;
                let result = self.put_with_retry(&client, item).await;
                if let Err(error) = client.close() {
                    tracing::warn!(project, %error, "failed to close per-call client");
                }
                Ok(result?)
            }
            ClientMode::PerAttempt => Ok(self.put_with_fresh_clients(project, item).await?),
        }
    }

    /// Reserve an id for `kind` on `client`, retried within the store budget.
    async fn reserve_id(
        &self,
        client: &StoreClient,
        kind: &str,
    ) -> Result<i64, RetryError<DatabaseError>> {
        let id = self
            .retry
            .run(|_| async move { decide(client.allocate_id(kind).await) })
            .await?;
        tracing::debug!(project = %client.target(), kind, id, "reserved id");
        Ok(id)
    }

    /// Retry `client.put(item)` within the store budget.
    ///
    /// An item without an id gets one reserved before the first attempt, so
    /// every attempt writes the same key and a retried write cannot leave a
    /// second row behind.
    ///
    /// # Errors
    ///
    /// Returns the executor's [`RetryError`].
    pub async fn put_with_retry(
        &self,
        client: &StoreClient,
        mut item: Item,
    ) -> Result<Item, RetryError<DatabaseError>> {
        if item.id == 0 {
            item.id = self.reserve_id(client, &item.kind).await?;
        }
        self.retry
            .run(|attempt| {
                let item = item.clone();
                async move {
                    tracing::debug!(project = %client.target(), attempt, "put attempt");
                    decide(client.put(item).await)
                }
            })
            .await
    }

    async fn put_with_fresh_clients(
        &self,
        project: &str,
        item: Item,
    ) -> Result<Item, RetryError<DatabaseError>> {
        let store = &self.config.store;
        // Zero until an attempt's client reserves the id; later attempts reuse it.
        let reserved = AtomicI64::new(item.id);
        let reserved = &reserved;
        self.retry
            .run(|attempt| {
                let mut item = item.clone();
                async move {
                    tracing::debug!(project, attempt, "opening client for attempt");
                    let client = match StoreClient::open(store, project).await {
                        Ok(client) => client,
                        Err(error) => return decide(Err(error)),
                    };
                    let result = match reserve_once(&client, reserved, &item.kind).await {
                        Ok(id) => {
                            item.id = id;
                            client.put(item).await
                        }
                        Err(error) => Err(error),
                    };
                    if let Err(error) = client.close() {
                        tracing::warn!(project, %error, "failed to close attempt client");
                    }
                    decide(result)
                }
            })
            .await
    }

    /// Fetch an item through the shared client of the primary project.
    ///
    /// # Errors
    ///
    /// A missing item surfaces after one attempt; see
    /// [`ServiceError::is_not_found`].
    pub async fn get(&self, kind: &str, id: i64) -> Result<Item, ServiceError> {
        let client = self.shared_client(&self.config.project.id).await?;
        let client = client.as_ref();
        let item = self
            .retry
            .run(|_| async move { decide(client.get(kind, id).await) })
            .await?;
        Ok(item)
    }

    /// Read-modify-write an existing item through the shared client of the
    /// primary project.
    ///
    /// # Errors
    ///
    /// As [`StoreClient::update_with_retry`], plus client acquisition errors.
    pub async fn update(
        &self,
        kind: &str,
        id: i64,
        update: &ItemUpdate,
    ) -> Result<Item, ServiceError> {
        let client = self.shared_client(&self.config.project.id).await?;
        Ok(client
            .update_with_retry(kind, id, update, &self.retry)
            .await?)
    }

    /// Reserve an id up front, then save the item under it.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if either step fails within its budget.
    pub async fn allocate_and_put(&self, form: PostItem) -> Result<Item, ServiceError> {
        let client = self.shared_client(&self.config.project.id).await?;
        let mut item = form.into_item(kinds::ONLY_ONE_CLIENT);
        item.id = self.reserve_id(&client, &item.kind).await?;
        Ok(self.put_with_retry(&client, item).await?)
    }

    /// Close every cached client. Call once at process exit, after all work
    /// using the service has finished.
    ///
    /// # Errors
    ///
    /// Returns the first close error; every client is still attempted.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        tracing::debug!(clients = self.cache.len().await, "closing cached clients");
        Ok(self.cache.close_all().await?)
    }
}

/// The id held in `reserved`, allocating it through `client` on first use.
async fn reserve_once(
    client: &StoreClient,
    reserved: &AtomicI64,
    kind: &str,
) -> Result<i64, DatabaseError> {
    let id = reserved.load(Ordering::Acquire);
    if id != 0 {
        return Ok(id);
    }
    let id = client.allocate_id(kind).await?;
    reserved.store(id, Ordering::Release);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn modes_map_to_kinds() {
        assert_eq!(ClientMode::PerCall.kind(), "ItemV1");
        assert_eq!(ClientMode::Shared.kind(), "ItemV1OnlyOneClient");
        assert_eq!(ClientMode::SharedOtherProject.kind(), "ItemV1OnlyOneClient");
        assert_eq!(
            ClientMode::PerAttempt.kind(),
            "ItemV1CreateClientEveryTimeRetry"
        );
    }

    #[test]
    fn mode_names_parse_back() {
        for mode in ClientMode::ALL {
            assert_eq!(mode.as_str().parse::<ClientMode>().unwrap(), mode);
        }
        assert!("sometimes".parse::<ClientMode>().is_err());
    }

    #[test]
    fn post_form_defaults() {
        let form: PostItem = serde_json::from_str(r#"{"lot":"L-1"}"#).unwrap();
        assert_eq!(form.index, 0);
        assert!(form.contents.is_empty());
    }
}
