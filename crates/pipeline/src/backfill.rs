use std::future::ready;
use std::sync::Arc;

use collectify_core::{EntryView, Item, UpdateField};
use futures::StreamExt;

use crate::config::WriteConfig;
use crate::enrich::Enricher;
use crate::sink::ErrorSink;
use crate::store::EntryStore;
use crate::stream::BoxStream;
use crate::writer::Writer;

/// Second pass over updated entries that still have no content.
///
/// The entry is content- and keyword-enriched, then written with a patch
/// limited to those two fields. The write is effect-gated like any other
/// update.
pub struct Backfill {
    enricher: Enricher,
    writer: Writer,
}

impl Backfill {
    /// `enricher` should run a content + keywords plan.
    pub fn new(
        store: Arc<dyn EntryStore>,
        enricher: Enricher,
        write: &WriteConfig,
        errors: ErrorSink,
    ) -> Self {
        let config = WriteConfig {
            update_fields: vec![UpdateField::Content, UpdateField::Keywords],
            ..write.clone()
        };
        Self {
            enricher,
            writer: Writer::new(store, &config, errors),
        }
    }

    pub fn run(&self, updated: BoxStream<EntryView>) -> BoxStream<EntryView> {
        let missing: BoxStream<Item> = Box::pin(
            updated
                .filter(|view| ready(view.content.as_deref().map_or(true, str::is_empty)))
                .map(Item::from),
        );
        let enriched = self.enricher.apply(missing);
        self.writer.updated(enriched)
    }
}
