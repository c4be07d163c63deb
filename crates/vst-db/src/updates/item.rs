//! Item update builder.

use serde::Serialize;

use crate::entities::Item;

/// Fields a read-modify-write may overwrite. Identity, lot, index and the
/// timestamps are never taken from the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents_org: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypt_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_contents: Option<String>,
}

impl ItemUpdate {
    /// Copy every mutable field of `item`, as a full-record update does.
    #[must_use]
    pub fn from_item(item: &Item) -> Self {
        Self {
            contents: Some(item.contents.clone()),
            contents_org: Some(item.contents_org.clone()),
            crypt_key: Some(item.crypt_key.clone()),
            encrypted_contents: Some(item.encrypted_contents.clone()),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.contents.is_none()
            && self.contents_org.is_none()
            && self.crypt_key.is_none()
            && self.encrypted_contents.is_none()
    }

    pub fn apply(&self, item: &mut Item) {
        if let Some(ref contents) = self.contents {
            item.contents.clone_from(contents);
        }
        if let Some(ref contents_org) = self.contents_org {
            item.contents_org.clone_from(contents_org);
        }
        if let Some(ref crypt_key) = self.crypt_key {
            item.crypt_key.clone_from(crypt_key);
        }
        if let Some(ref encrypted) = self.encrypted_contents {
            item.encrypted_contents.clone_from(encrypted);
        }
    }
}

pub struct ItemUpdateBuilder(ItemUpdate);

impl Default for ItemUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(ItemUpdate::default())
    }

    #[must_use]
    pub fn contents(mut self, contents: Vec<String>) -> Self {
        self.0.contents = Some(contents);
        self
    }

    #[must_use]
    pub fn contents_org(mut self, contents_org: Vec<String>) -> Self {
        self.0.contents_org = Some(contents_org);
        self
    }

    #[must_use]
    pub fn crypt_key(mut self, crypt_key: impl Into<String>) -> Self {
        self.0.crypt_key = Some(crypt_key.into());
        self
    }

    #[must_use]
    pub fn encrypted_contents(mut self, encrypted: impl Into<String>) -> Self {
        self.0.encrypted_contents = Some(encrypted.into());
        self
    }

    #[must_use]
    pub fn build(self) -> ItemUpdate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entities::kinds;

    #[test]
    fn apply_only_touches_set_fields() {
        let mut item = Item::new(kinds::ITEM_V1, "lot", 2, vec!["a".into()]);
        item.crypt_key = "k1".into();

        ItemUpdateBuilder::new()
            .contents(vec!["b".into()])
            .build()
            .apply(&mut item);

        assert_eq!(item.contents, vec!["b".to_string()]);
        assert_eq!(item.contents_org, vec!["a".to_string()]);
        assert_eq!(item.crypt_key, "k1");
        assert_eq!(item.index, 2);
    }

    #[test]
    fn empty_update() {
        assert!(ItemUpdate::default().is_empty());
        assert!(!ItemUpdateBuilder::new().crypt_key("k").build().is_empty());
    }

    #[test]
    fn from_item_copies_all_mutable_fields() {
        let mut source = Item::new(kinds::ITEM_V1, "lot", 0, vec!["x".into()]);
        source.encrypted_contents = "ciphertext".into();
        let update = ItemUpdate::from_item(&source);

        let mut target = Item::new(kinds::ITEM_V1, "other", 9, vec![]);
        update.apply(&mut target);
        assert_eq!(target.contents, source.contents);
        assert_eq!(target.encrypted_contents, "ciphertext");
        assert_eq!(target.lot, "other");
    }

    #[test]
    fn serializes_changed_fields_only() {
        let update = ItemUpdateBuilder::new().crypt_key("k").build();
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "crypt_key": "k" }));
    }
}
