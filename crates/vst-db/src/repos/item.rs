//! Item repository: id allocation, upsert, lookup and the read-modify-write
//! transaction.

use chrono::Utc;
use vst_core::{Retry, RetryError};

use crate::StoreClient;
use crate::entities::Item;
use crate::error::DatabaseError;
use crate::helpers::{encode_string_list, parse_datetime, parse_string_list};
use crate::retry::decide;
use crate::updates::item::ItemUpdate;

const SELECT_COLS: &str = "kind, id, lot, item_index, contents, contents_org, crypt_key, \
     encrypted_contents, created_at, updated_at, schema_version";

fn row_to_item(row: &libsql::Row) -> Result<Item, DatabaseError> {
    Ok(Item {
        kind: row.get(0)?,
        id: row.get(1)?,
        lot: row.get(2)?,
        index: row.get(3)?,
        contents: parse_string_list(&row.get::<String>(4)?)?,
        contents_org: parse_string_list(&row.get::<String>(5)?)?,
        crypt_key: row.get(6)?,
        encrypted_contents: row.get(7)?,
        created_at: Some(parse_datetime(&row.get::<String>(8)?)?),
        updated_at: Some(parse_datetime(&row.get::<String>(9)?)?),
        schema_version: row.get(10)?,
    })
}

fn check_kind(kind: &str) -> Result<(), DatabaseError> {
    if kind.is_empty() {
        return Err(DatabaseError::InvalidState("item kind must not be empty".into()));
    }
    Ok(())
}

async fn fetch(conn: &libsql::Connection, kind: &str, id: i64) -> Result<Item, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {SELECT_COLS} FROM items WHERE kind = ?1 AND id = ?2"),
            libsql::params![kind, id],
        )
        .await?;
    let row = rows.next().await?.ok_or_else(|| DatabaseError::NotFound {
        kind: kind.to_string(),
        id,
    })?;
    row_to_item(&row)
}

async fn write(conn: &libsql::Connection, item: &Item) -> Result<(), DatabaseError> {
    let created_at = item.created_at.unwrap_or_else(Utc::now).to_rfc3339();
    let updated_at = item.updated_at.unwrap_or_else(Utc::now).to_rfc3339();
    conn.execute(
        &format!(
            "INSERT INTO items ({SELECT_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (kind, id) DO UPDATE SET
                lot = excluded.lot,
                item_index = excluded.item_index,
                contents = excluded.contents,
                contents_org = excluded.contents_org,
                crypt_key = excluded.crypt_key,
                encrypted_contents = excluded.encrypted_contents,
                updated_at = excluded.updated_at,
                schema_version = excluded.schema_version"
        ),
        libsql::params![
            item.kind.as_str(),
            item.id,
            item.lot.as_str(),
            item.index,
            encode_string_list(&item.contents)?,
            encode_string_list(&item.contents_org)?,
            item.crypt_key.as_str(),
            item.encrypted_contents.as_str(),
            created_at,
            updated_at,
            item.schema_version
        ],
    )
    .await?;
    Ok(())
}

async fn read_modify_write(
    conn: &libsql::Connection,
    kind: &str,
    id: i64,
    update: &ItemUpdate,
) -> Result<Item, DatabaseError> {
    let mut item = fetch(conn, kind, id).await?;
    update.apply(&mut item);
    item.touch(Utc::now());
    write(conn, &item).await?;
    Ok(item)
}

/// Commit `tx` when `outcome` succeeded, otherwise roll it back and return
/// the original error.
async fn settle<T>(
    tx: libsql::Transaction,
    outcome: Result<T, DatabaseError>,
    key: &str,
) -> Result<T, DatabaseError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(key, %rollback, "rollback after failed write failed");
            }
            Err(error)
        }
    }
}

async fn write_and_fetch(conn: &libsql::Connection, item: &Item) -> Result<Item, DatabaseError> {
    write(conn, item).await?;
    // A re-put of an existing key keeps the first-save timestamp.
    fetch(conn, &item.kind, item.id).await
}

impl StoreClient {
    /// Reserve a fresh numeric id for `kind`. Ids are never reused.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the kind is empty or the insert fails.
    pub async fn allocate_id(&self, kind: &str) -> Result<i64, DatabaseError> {
        check_kind(kind)?;
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "INSERT INTO id_allocations (kind) VALUES (?1) RETURNING id",
                [kind],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<i64>(0)?)
    }

    /// Save `item`, allocating an id first when it has none.
    ///
    /// The stored schema version is forced to the current one, `created_at` is
    /// set on first save and kept afterwards, `updated_at` is always now. The
    /// upsert and its read-back share one write transaction, so a failed call
    /// leaves no row behind. Repeating a put with the same id is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` on invalid input or a failed write.
    pub async fn put(&self, mut item: Item) -> Result<Item, DatabaseError> {
        check_kind(&item.kind)?;
        if item.id < 0 {
            return Err(DatabaseError::InvalidState(format!(
                "item id must not be negative, got {}",
                item.id
            )));
        }
        if item.id == 0 {
            item.id = self.allocate_id(&item.kind).await?;
        }
        item.touch(Utc::now());

        let key = item.key().to_string();
        let conn = self.connect().await?;
        let tx = self.begin_write(&conn).await?;
        let outcome = write_and_fetch(&tx, &item).await;
        let saved = settle(tx, outcome, &key).await?;
        tracing::debug!(project = %self.target(), key = %key, "item saved");
        Ok(saved)
    }

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] when no item has this key.
    pub async fn get(&self, kind: &str, id: i64) -> Result<Item, DatabaseError> {
        let conn = self.connect().await?;
        fetch(&conn, kind, id).await
    }

    /// One read-modify-write of an existing item inside a write transaction.
    ///
    /// An empty update writes nothing and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] for a missing item, or the
    /// transaction's error. The transaction is rolled back on any failure.
    pub async fn update_in_transaction(
        &self,
        kind: &str,
        id: i64,
        update: &ItemUpdate,
    ) -> Result<Item, DatabaseError> {
        if update.is_empty() {
            return self.get(kind, id).await;
        }

        let conn = self.connect().await?;
        let tx = self.begin_write(&conn).await?;
        let outcome = read_modify_write(&tx, kind, id, update).await;
        settle(tx, outcome, &format!("{kind}:{id}")).await
    }

    /// [`update_in_transaction`](Self::update_in_transaction) under `retry`.
    /// A missing item ends the loop after the first attempt.
    ///
    /// # Errors
    ///
    /// Returns the executor's [`RetryError`] wrapping the last store error.
    pub async fn update_with_retry(
        &self,
        kind: &str,
        id: i64,
        update: &ItemUpdate,
        retry: &Retry,
    ) -> Result<Item, RetryError<DatabaseError>> {
        retry
            .run(|attempt| async move {
                tracing::debug!(kind, id, attempt, "update transaction attempt");
                decide(self.update_in_transaction(kind, id, update).await)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entities::{SCHEMA_VERSION, kinds};
    use crate::test_support::helpers::{fast_retry, local_client};
    use crate::updates::item::ItemUpdateBuilder;

    fn sample(lot: &str) -> Item {
        Item::new(kinds::ITEM_V1, lot, 1, vec!["alpha".into(), "beta".into()])
    }

    #[tokio::test]
    async fn allocated_ids_are_distinct_and_increasing() {
        let (_dir, client) = local_client("p1").await;
        let first = client.allocate_id(kinds::ITEM_V1).await.unwrap();
        let second = client.allocate_id(kinds::ITEM_V1).await.unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[tokio::test]
    async fn put_allocates_and_stamps() {
        let (_dir, client) = local_client("p1").await;
        let saved = client.put(sample("lot-a")).await.unwrap();

        assert!(saved.id > 0);
        assert_eq!(saved.schema_version, SCHEMA_VERSION);
        assert!(saved.created_at.is_some());
        assert_eq!(saved.contents_org, saved.contents);

        let fetched = client.get(kinds::ITEM_V1, saved.id).await.unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn put_with_explicit_id_keeps_it() {
        let (_dir, client) = local_client("p1").await;
        let mut item = sample("lot-b");
        item.id = 500;
        let saved = client.put(item).await.unwrap();
        assert_eq!(saved.id, 500);
    }

    #[tokio::test]
    async fn reput_keeps_created_at() {
        let (_dir, client) = local_client("p1").await;
        let first = client.put(sample("lot")).await.unwrap();

        let mut again = sample("lot-renamed");
        again.id = first.id;
        let second = client.put(again).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.lot, "lot-renamed");
    }

    #[tokio::test]
    async fn put_rejects_invalid_items() {
        let (_dir, client) = local_client("p1").await;
        let err = client.put(Item::new("", "lot", 0, vec![])).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidState(_)));

        let mut negative = sample("lot");
        negative.id = -1;
        assert!(matches!(
            client.put(negative).await.unwrap_err(),
            DatabaseError::InvalidState(_)
        ));
    }

    /// Corrupt the read-back of any item with lot `poison`, so the write
    /// succeeds and the fetch after it fails.
    async fn poison_read_back(client: &StoreClient) {
        client
            .connect()
            .await
            .unwrap()
            .execute(
                "CREATE TRIGGER poison_created_at AFTER INSERT ON items
                 WHEN NEW.lot = 'poison'
                 BEGIN
                    UPDATE items SET created_at = 'not a timestamp'
                    WHERE kind = NEW.kind AND id = NEW.id;
                 END",
                (),
            )
            .await
            .unwrap();
    }

    async fn item_rows(client: &StoreClient) -> i64 {
        let conn = client.connect().await.unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM items", ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    #[tokio::test]
    async fn failed_read_back_rolls_back_the_write() {
        let (_dir, client) = local_client("p1").await;
        poison_read_back(&client).await;

        let err = client.put(sample("poison")).await.unwrap_err();

        assert!(matches!(err, DatabaseError::Query(_)), "{err}");
        assert_eq!(item_rows(&client).await, 0);
        assert!(client.put(sample("lot")).await.is_ok());
        assert_eq!(item_rows(&client).await, 1);
    }

    #[tokio::test]
    async fn repeated_put_of_reserved_id_leaves_one_row() {
        let (_dir, client) = local_client("p1").await;
        let mut item = sample("lot");
        item.id = client.allocate_id(kinds::ITEM_V1).await.unwrap();
        let calls = std::sync::atomic::AtomicU32::new(0);

        // The first attempt commits but its answer is dropped, as when the
        // connection fails after the server applied the write.
        let (store, item) = (&client, &item);
        let saved = fast_retry(3)
            .run(|attempt| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    let result = store.put(item.clone()).await;
                    if attempt == 1 {
                        return vst_core::RetryDecision::Retriable(DatabaseError::Query(
                            "response lost".into(),
                        ));
                    }
                    decide(result)
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(saved.id, item.id);
        assert_eq!(item_rows(&client).await, 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, client) = local_client("p1").await;
        let err = client.get(kinds::ITEM_V1, 404).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { id: 404, .. }));
    }

    #[tokio::test]
    async fn update_copies_only_mutable_fields() {
        let (_dir, client) = local_client("p1").await;
        let saved = client.put(sample("lot")).await.unwrap();

        let update = ItemUpdateBuilder::new()
            .contents(vec!["gamma".into()])
            .crypt_key("key-1")
            .encrypted_contents("c2VjcmV0")
            .build();
        let updated = client
            .update_in_transaction(kinds::ITEM_V1, saved.id, &update)
            .await
            .unwrap();

        assert_eq!(updated.contents, vec!["gamma".to_string()]);
        assert_eq!(updated.contents_org, saved.contents_org);
        assert_eq!(updated.crypt_key, "key-1");
        assert_eq!(updated.lot, saved.lot);
        assert_eq!(updated.created_at, saved.created_at);
        assert!(updated.updated_at >= saved.updated_at);

        let stored = client.get(kinds::ITEM_V1, saved.id).await.unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn empty_update_returns_stored_record() {
        let (_dir, client) = local_client("p1").await;
        let saved = client.put(sample("lot")).await.unwrap();
        let same = client
            .update_in_transaction(kinds::ITEM_V1, saved.id, &ItemUpdate::default())
            .await
            .unwrap();
        assert_eq!(same, saved);
    }

    #[tokio::test]
    async fn update_missing_is_terminal_after_one_attempt() {
        let (_dir, client) = local_client("p1").await;
        let update = ItemUpdateBuilder::new().crypt_key("k").build();

        let err = client
            .update_with_retry(kinds::ITEM_V1, 77, &update, &fast_retry(5))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert!(matches!(
            err,
            RetryError::Terminal {
                attempts: 1,
                source: DatabaseError::NotFound { .. }
            }
        ));
    }

    #[tokio::test]
    async fn update_on_closed_client_is_terminal() {
        use vst_core::ClientHandle;

        let (_dir, client) = local_client("p1").await;
        let saved = client.put(sample("lot")).await.unwrap();
        client.close().unwrap();

        let update = ItemUpdateBuilder::new().crypt_key("k").build();
        let err = client
            .update_with_retry(kinds::ITEM_V1, saved.id, &update, &fast_retry(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetryError::Terminal {
                source: DatabaseError::Closed { .. },
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_all_commit() {
        let (_dir, client) = local_client("p1").await;
        let client = Arc::new(client);
        let saved = client.put(sample("lot")).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let client = Arc::clone(&client);
            let id = saved.id;
            handles.push(tokio::spawn(async move {
                let update = ItemUpdateBuilder::new().crypt_key(format!("key-{n}")).build();
                client
                    .update_with_retry(kinds::ITEM_V1, id, &update, &fast_retry(8))
                    .await
            }));
        }
        let mut results = Vec::new();
        for (n, handle) in handles.into_iter().enumerate() {
            let updated = handle.await.unwrap().unwrap();
            assert_eq!(updated.crypt_key, format!("key-{n}"));
            assert!(updated.updated_at > saved.updated_at);
            results.push(updated);
        }

        // Each commit stamped its own time, so no update was lost or merged.
        let mut stamps: Vec<_> = results.iter().map(|item| item.updated_at).collect();
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), results.len());

        let last = results
            .iter()
            .max_by_key(|item| item.updated_at)
            .unwrap();
        let stored = client.get(kinds::ITEM_V1, saved.id).await.unwrap();
        assert_eq!(stored.crypt_key, last.crypt_key);
        assert_eq!(stored.updated_at, last.updated_at);
    }
}
