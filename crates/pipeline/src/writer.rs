use std::future::ready;
use std::sync::Arc;

use collectify_core::{EntryPatch, EntryView, Item, Stage, UpdateField, WriteOp};
use futures::StreamExt;
use tracing::debug;

use crate::config::WriteConfig;
use crate::sink::ErrorSink;
use crate::store::EntryStore;
use crate::stream::BoxStream;

/// Persists classified items.
///
/// New items are created unconditionally. Existing items are written as
/// an allow-listed patch and only continue downstream when the store
/// reports a matched record; a zero match (the entry expired meanwhile)
/// drops the item without an error.
#[derive(Clone)]
pub struct Writer {
    store: Arc<dyn EntryStore>,
    update_fields: Arc<Vec<UpdateField>>,
    concurrency: usize,
    errors: ErrorSink,
}

impl Writer {
    pub fn new(store: Arc<dyn EntryStore>, config: &WriteConfig, errors: ErrorSink) -> Self {
        Self {
            store,
            update_fields: Arc::new(config.update_fields.clone()),
            concurrency: config.concurrency.max(1),
            errors,
        }
    }

    pub async fn create(&self, item: Item) -> Option<EntryView> {
        match self.store.create(&item).await {
            Ok(entry) => {
                debug!(guid = %entry.guid, stage = "write:create", "created");
                Some(entry.view())
            }
            Err(e) => {
                self.errors.item(Stage::Write(WriteOp::Create), &item.guid, e);
                None
            }
        }
    }

    /// Patch the live entry and return its stored state after the write.
    pub async fn update(&self, item: Item) -> Option<EntryView> {
        let patch = EntryPatch::from_item(&item, &self.update_fields);
        self.apply(patch).await
    }

    pub(crate) async fn apply(&self, patch: EntryPatch) -> Option<EntryView> {
        let matched = match self.store.update(&patch).await {
            Ok(n) => n,
            Err(e) => {
                self.errors.item(Stage::Write(WriteOp::Update), &patch.guid, e);
                return None;
            }
        };
        if matched == 0 {
            debug!(guid = %patch.guid, stage = "write:update", "no live entry, dropped");
            return None;
        }

        match self.store.find_one(&patch.guid).await {
            Ok(Some(entry)) => {
                debug!(guid = %entry.guid, stage = "write:update", fields = ?patch.fields(), "updated");
                Some(entry.view())
            }
            Ok(None) => None,
            Err(e) => {
                self.errors.item(Stage::Write(WriteOp::Find), &patch.guid, e);
                None
            }
        }
    }

    pub fn created(&self, items: BoxStream<Item>) -> BoxStream<EntryView> {
        let this = self.clone();
        let out = items
            .map(move |item| {
                let this = this.clone();
                async move { this.create(item).await }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(ready);
        Box::pin(out)
    }

    pub fn updated(&self, items: BoxStream<Item>) -> BoxStream<EntryView> {
        let this = self.clone();
        let out = items
            .map(move |item| {
                let this = this.clone();
                async move { this.update(item).await }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(ready);
        Box::pin(out)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use collectify_core::{Entry, Shares};
    use futures::stream;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    /// Records every patch and reports a fixed match count.
    struct RecordingStore {
        matched: u64,
        patches: Mutex<Vec<EntryPatch>>,
        inner: MemoryStore,
    }

    impl RecordingStore {
        fn new(matched: u64) -> Self {
            Self {
                matched,
                patches: Mutex::new(Vec::new()),
                inner: MemoryStore::default(),
            }
        }
    }

    #[async_trait]
    impl EntryStore for RecordingStore {
        async fn count(&self, guid: &str) -> Result<u64, StoreError> {
            self.inner.count(guid).await
        }
        async fn create(&self, item: &Item) -> Result<Entry, StoreError> {
            self.inner.create(item).await
        }
        async fn update(&self, patch: &EntryPatch) -> Result<u64, StoreError> {
            self.patches.lock().await.push(patch.clone());
            self.inner.update(patch).await?;
            Ok(self.matched)
        }
        async fn find_one(&self, guid: &str) -> Result<Option<Entry>, StoreError> {
            self.inner.find_one(guid).await
        }
    }

    fn rich_item(guid: &str) -> Item {
        let mut item = Item::new(guid, "http://x", "New title", Utc::now());
        item.image = Some("http://x/new.png".into());
        item.content = Some("body".into());
        item.shares = Some(Shares::from([("facebook".to_string(), 3)]));
        item.created_at = Some(Utc::now());
        item
    }

    #[tokio::test]
    async fn update_sends_only_allow_listed_fields() {
        let store = Arc::new(RecordingStore::new(1));
        store.create(&Item::new("a", "http://x", "Old", Utc::now())).await.unwrap();

        let (sink, _errors) = ErrorSink::channel(8);
        let config = WriteConfig {
            update_fields: vec![UpdateField::CreatedAt, UpdateField::Shares],
            ..Default::default()
        };
        let writer = Writer::new(store.clone(), &config, sink);
        let view = writer.update(rich_item("a")).await.unwrap();

        let patches = store.patches.lock().await;
        assert_eq!(patches.len(), 1);
        assert_eq!(
            patches[0].fields(),
            vec![UpdateField::CreatedAt, UpdateField::Shares]
        );
        assert!(patches[0].title.is_none());
        assert!(patches[0].image.is_none());
        assert!(patches[0].content.is_none());

        assert_eq!(view.title, "Old");
        assert_eq!(view.shares.unwrap()["facebook"], 3);
    }

    #[tokio::test]
    async fn zero_match_update_vanishes_silently() {
        let store = Arc::new(RecordingStore::new(0));
        let (sink, errors) = ErrorSink::channel(8);
        let writer = Writer::new(store.clone(), &WriteConfig::default(), sink);

        let out: Vec<EntryView> = writer
            .updated(Box::pin(stream::iter(vec![rich_item("gone")])))
            .collect()
            .await;
        drop(writer);

        assert!(out.is_empty());
        assert_eq!(store.patches.lock().await.len(), 1);
        assert!(errors.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_not_updated() {
        let store = Arc::new(MemoryStore::default());
        let mut old = store.create(&Item::new("a", "http://x", "T", Utc::now())).await.unwrap();
        old.created_at = Utc::now() - Duration::hours(30);
        store.insert_entry(old).await;

        let (sink, _errors) = ErrorSink::channel(8);
        let writer = Writer::new(store, &WriteConfig::default(), sink);
        assert!(writer.update(rich_item("a")).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_write_error() {
        let store = Arc::new(MemoryStore::default());
        let (sink, mut errors) = ErrorSink::channel(8);
        let writer = Writer::new(store, &WriteConfig::default(), sink);

        let created: Vec<EntryView> = writer
            .created(Box::pin(stream::iter(vec![rich_item("a"), rich_item("a")])))
            .collect()
            .await;

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].guid, "a");
        let err = errors.next().await.unwrap();
        assert_eq!(err.stage, Stage::Write(WriteOp::Create));
    }
}
