//! Item records and their keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Written on every save.
pub const SCHEMA_VERSION: i64 = 4;

/// Logical collections items are written into, one per client experiment.
pub mod kinds {
    pub const ITEM_V1: &str = "ItemV1";
    pub const ONLY_ONE_CLIENT: &str = "ItemV1OnlyOneClient";
    pub const CREATE_CLIENT_EVERY_TIME_RETRY: &str = "ItemV1CreateClientEveryTimeRetry";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub kind: String,
    /// Zero until the store allocates one.
    pub id: i64,
    pub lot: String,
    pub index: i64,
    pub contents: Vec<String>,
    pub contents_org: Vec<String>,
    pub crypt_key: String,
    pub encrypted_contents: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub schema_version: i64,
}

impl Item {
    /// A new, unsaved item. `contents_org` starts as a copy of `contents`.
    pub fn new(kind: impl Into<String>, lot: impl Into<String>, index: i64, contents: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            id: 0,
            lot: lot.into(),
            index,
            contents_org: contents.clone(),
            contents,
            crypt_key: String::new(),
            encrypted_contents: String::new(),
            created_at: None,
            updated_at: None,
            schema_version: SCHEMA_VERSION,
        }
    }

    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.kind, self.id)
    }

    /// Apply save semantics: version bump, first-save and last-save stamps.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.schema_version = SCHEMA_VERSION;
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
}

/// `(kind, id)` identity of a stored item. Encodes as `"{kind}:{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: String,
    pub id: i64,
}

impl ItemKey {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ItemKey {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .rsplit_once(':')
            .ok_or_else(|| DatabaseError::InvalidState(format!("malformed item key '{s}'")))?;
        if kind.is_empty() {
            return Err(DatabaseError::InvalidState(format!(
                "item key '{s}' has no kind"
            )));
        }
        let id = id
            .parse()
            .map_err(|e| DatabaseError::InvalidState(format!("item key '{s}': {e}")))?;
        Ok(Self::new(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn new_item_copies_contents_to_original() {
        let item = Item::new(kinds::ITEM_V1, "lot-1", 3, vec!["a".into()]);
        assert_eq!(item.contents_org, vec!["a".to_string()]);
        assert_eq!(item.id, 0);
        assert!(item.created_at.is_none());
    }

    #[test]
    fn touch_sets_created_once() {
        let mut item = Item::new(kinds::ITEM_V1, "lot", 0, vec![]);
        item.schema_version = 1;
        let first = Utc::now();
        item.touch(first);
        let later = first + chrono::Duration::seconds(5);
        item.touch(later);

        assert_eq!(item.created_at, Some(first));
        assert_eq!(item.updated_at, Some(later));
        assert_eq!(item.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn key_display_and_parse() {
        let key = ItemKey::new(kinds::ONLY_ONE_CLIENT, 42);
        assert_eq!(key.to_string(), "ItemV1OnlyOneClient:42");
        assert_eq!("ItemV1OnlyOneClient:42".parse::<ItemKey>().unwrap(), key);
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!("no-separator".parse::<ItemKey>().is_err());
        assert!(":5".parse::<ItemKey>().is_err());
        assert!("ItemV1:abc".parse::<ItemKey>().is_err());
    }

    #[test]
    fn json_uses_camel_case_and_hides_schema_version() {
        let item = Item::new(kinds::ITEM_V1, "lot", 1, vec!["x".into()]);
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("contentsOrg").is_some());
        assert!(value.get("schemaVersion").is_none());
    }
}
