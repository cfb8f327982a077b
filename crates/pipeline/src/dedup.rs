use std::future::ready;
use std::sync::Arc;

use collectify_core::{Item, Stage};
use futures::StreamExt;
use tracing::debug;

use crate::config::DedupConfig;
use crate::sink::ErrorSink;
use crate::store::EntryStore;
use crate::stream::{detach, fork2, BoxStream};

/// Items split by whether the store already knows their guid.
pub struct Classified {
    pub new: BoxStream<Item>,
    pub existing: BoxStream<Item>,
}

/// Classifies items as new or existing by counting their guid in the store.
///
/// The upstream is forked and each side runs its own lookup per item, so
/// both sides see every item. Each side looks up on its own task, so both
/// lookups for an item go out as soon as it arrives rather than when the
/// side's consumer gets to it. A lookup failure is reported by each side
/// that hit it and the item is left out of that side. Nothing links a
/// lookup to the later write: two sightings of one guid close together can
/// both come out as new, and the store's unique guid rejects the second
/// create.
pub struct Deduplicator {
    store: Arc<dyn EntryStore>,
    concurrency: usize,
    buffer: usize,
    errors: ErrorSink,
}

impl Deduplicator {
    pub fn new(
        store: Arc<dyn EntryStore>,
        config: &DedupConfig,
        buffer: usize,
        errors: ErrorSink,
    ) -> Self {
        Self {
            store,
            concurrency: config.concurrency.max(1),
            buffer,
            errors,
        }
    }

    /// Must be called inside a tokio runtime.
    pub fn split(self, items: BoxStream<Item>) -> Classified {
        let (for_new, for_existing) = fork2(items, self.buffer);
        Classified {
            new: self.side(for_new, true),
            existing: self.side(for_existing, false),
        }
    }

    fn side(&self, items: BoxStream<Item>, want_new: bool) -> BoxStream<Item> {
        let store = self.store.clone();
        let errors = self.errors.clone();
        let label = if want_new { "new" } else { "existing" };

        let kept = items
            .map(move |item| {
                let store = store.clone();
                let errors = errors.clone();
                async move {
                    match store.count(&item.guid).await {
                        Ok(n) if (n == 0) == want_new => {
                            debug!(guid = %item.guid, stage = "dedup", class = label, "classified");
                            Some(item)
                        }
                        Ok(_) => None,
                        Err(e) => {
                            errors.item(Stage::Dedup, &item.guid, e);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(ready);
        detach(Box::pin(kept), self.buffer)
    }
}
