use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use collectify_core::{Entry, EntryPatch, Item, SourceDescriptor, DEFAULT_ENTRY_TTL_SECS};
use tokio::sync::Mutex;

use super::{EntryStore, SourceFeed};
use crate::error::StoreError;

/// In-process entry store with the same expiry rules as Postgres.
pub struct MemoryStore {
    ttl: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    entries: HashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Put an entry in as-is, e.g. one whose `created_at` is long past.
    pub async fn insert_entry(&self, mut entry: Entry) {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        entry.id = inner.next_id;
        inner.entries.insert(entry.guid.clone(), entry);
    }

    /// Every stored entry, expired or not.
    pub async fn entries(&self) -> Vec<Entry> {
        self.inner.lock().await.entries.values().cloned().collect()
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now, self.ttl));
        before - inner.entries.len()
    }

    fn live<'a>(&self, inner: &'a Inner, guid: &str) -> Option<&'a Entry> {
        inner
            .entries
            .get(guid)
            .filter(|e| !e.is_expired(Utc::now(), self.ttl))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_ENTRY_TTL_SECS))
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn count(&self, guid: &str) -> Result<u64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(self.live(&inner, guid).map_or(0, |_| 1))
    }

    async fn create(&self, item: &Item) -> Result<Entry, StoreError> {
        let mut inner = self.inner.lock().await;
        if self.live(&inner, &item.guid).is_some() {
            return Err(StoreError::Duplicate(item.guid.clone()));
        }
        inner.next_id += 1;
        let entry = Entry {
            id: inner.next_id,
            version: 0,
            guid: item.guid.clone(),
            url: item.url.clone(),
            title: item.title.clone(),
            image: item.image.clone(),
            content: item.content.clone(),
            keywords: item.keywords.clone(),
            shares: item.shares.clone(),
            posted: item.posted,
            created_at: item.created_at.unwrap_or_else(Utc::now),
        };
        inner.entries.insert(entry.guid.clone(), entry.clone());
        Ok(entry)
    }

    async fn update(&self, patch: &EntryPatch) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&patch.guid) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                patch.apply_to(entry);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_one(&self, guid: &str) -> Result<Option<Entry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(self.live(&inner, guid).cloned())
    }
}

/// Fixed descriptor list, typically loaded from a JSON file.
pub struct StaticSourceFeed {
    sources: Vec<SourceDescriptor>,
}

impl StaticSourceFeed {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }

    /// Read a JSON array of descriptors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
        let sources = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Decode(format!("{}: {e}", path.display())))?;
        Ok(Self::new(sources))
    }
}

#[async_trait]
impl SourceFeed for StaticSourceFeed {
    async fn find_active(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
        Ok(self.sources.iter().filter(|s| s.active).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collectify_core::SourceKind;

    fn item(guid: &str) -> Item {
        Item::new(guid, "http://x", "T", Utc::now())
    }

    #[tokio::test]
    async fn create_then_count() {
        let store = MemoryStore::default();
        assert_eq!(store.count("a").await.unwrap(), 0);

        let entry = store.create(&item("a")).await.unwrap();
        assert_eq!(entry.guid, "a");
        assert_eq!(store.count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn live_duplicate_is_rejected() {
        let store = MemoryStore::default();
        store.create(&item("a")).await.unwrap();
        let err = store.create(&item("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(g) if g == "a"));
    }

    #[tokio::test]
    async fn expired_entry_is_invisible_and_replaceable() {
        let store = MemoryStore::default();
        let mut old = store.create(&item("a")).await.unwrap();
        old.created_at = Utc::now() - Duration::hours(25);
        store.insert_entry(old).await;

        assert_eq!(store.count("a").await.unwrap(), 0);
        assert!(store.find_one("a").await.unwrap().is_none());

        let patch = EntryPatch {
            guid: "a".into(),
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(store.update(&patch).await.unwrap(), 0);

        store.create(&item("a")).await.unwrap();
        assert_eq!(store.count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_refreshes_expiry() {
        let store = MemoryStore::new(Duration::hours(24));
        let mut entry = store.create(&item("a")).await.unwrap();
        entry.created_at = Utc::now() - Duration::hours(23);
        store.insert_entry(entry).await;

        let patch = EntryPatch {
            guid: "a".into(),
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(store.update(&patch).await.unwrap(), 1);

        let found = store.find_one("a").await.unwrap().unwrap();
        assert!(found.created_at > Utc::now() - Duration::minutes(1));
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::default();
        store.create(&item("fresh")).await.unwrap();
        let mut stale = store.create(&item("stale")).await.unwrap();
        stale.created_at = Utc::now() - Duration::days(2);
        store.insert_entry(stale).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn static_feed_filters_inactive() {
        let json = r#"[
            { "active": true, "type": "feed", "name": "a", "url": "http://a" },
            { "active": false, "type": "json", "name": "b", "url": "http://b" },
            { "type": "site", "name": "c", "url": "http://c" }
        ]"#;
        let sources: Vec<SourceDescriptor> = serde_json::from_str(json).unwrap();
        let feed = StaticSourceFeed::new(sources);

        let active = feed.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, SourceKind::Feed);
    }
}
