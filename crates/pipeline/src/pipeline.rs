//! Wires the stages together.
//!
//! ```text
//! poll -> route/extract -> merge -> dedup -+-> new ------> enrich(new) -----> create -> created
//!                                          +-> existing -> enrich(existing) -> update -> updated
//!                                                                                 `-> backfill -> backfilled
//! every stage -> error sink -> errors
//! ```

use std::future::{ready, Future};
use std::sync::Arc;

use collectify_core::{EntryView, SourceKind, StageError};
use collectify_relay::EventPublisher;
use futures::StreamExt;
use tracing::{info, warn};

use crate::backfill::Backfill;
use crate::config::{EnrichPlan, PipelineConfig};
use crate::dedup::{Classified, Deduplicator};
use crate::distributor::Distributor;
use crate::enrich::{ContentFetcher, EnrichDeps, Enricher, KeywordExtractor, ShareCounter};
use crate::error::PipelineError;
use crate::extract::{Extractor, ExtractorSet};
use crate::poller::Poller;
use crate::router::Router;
use crate::sink::ErrorSink;
use crate::store::{EntryStore, SourceFeed};
use crate::stream::{fork2, BoxStream};
use crate::writer::Writer;

/// Collects collaborators and checks them against the config.
pub struct PipelineBuilder {
    config: PipelineConfig,
    sources: Option<Arc<dyn SourceFeed>>,
    extractors: ExtractorSet,
    store: Option<Arc<dyn EntryStore>>,
    deps: EnrichDeps,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sources: None,
            extractors: ExtractorSet::new(),
            store: None,
            deps: EnrichDeps::default(),
            publisher: None,
        }
    }

    pub fn source_feed(mut self, feed: Arc<dyn SourceFeed>) -> Self {
        self.sources = Some(feed);
        self
    }

    pub fn extractor(mut self, kind: SourceKind, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.insert(kind, extractor);
        self
    }

    pub fn store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn share_counter(mut self, counter: Arc<dyn ShareCounter>) -> Self {
        self.deps.shares = Some(counter);
        self
    }

    pub fn content_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.deps.content = Some(fetcher);
        self
    }

    pub fn keyword_extractor(mut self, keywords: Arc<dyn KeywordExtractor>) -> Self {
        self.deps.keywords = keywords;
        self
    }

    /// Only needed for [`Pipeline::run`].
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let sources = self
            .sources
            .ok_or(PipelineError::MissingCollaborator("source feed"))?;
        let store = self
            .store
            .ok_or(PipelineError::MissingCollaborator("entry store"))?;

        self.deps.check(self.config.enrich.new)?;
        self.deps.check(self.config.enrich.existing)?;

        let kinds = self.extractors.kinds();
        if kinds.is_empty() {
            warn!("no extractors registered, every source will fail extraction");
        }
        let backfill = self.config.enrich.content_backfill && self.deps.content.is_some();
        if self.config.enrich.content_backfill && !backfill {
            warn!("content backfill enabled but no content fetcher set, skipping it");
        }
        info!(?kinds, backfill, "pipeline built");

        Ok(Pipeline {
            config: self.config,
            sources,
            extractors: self.extractors,
            store,
            deps: self.deps,
            publisher: self.publisher,
            backfill,
        })
    }
}

/// Output side of one pipeline instance.
pub struct PipelineStreams {
    pub created: BoxStream<EntryView>,
    pub updated: BoxStream<EntryView>,
    /// Present when content backfill runs.
    pub backfilled: Option<BoxStream<EntryView>>,
    pub errors: BoxStream<StageError>,
}

pub struct Pipeline {
    config: PipelineConfig,
    sources: Arc<dyn SourceFeed>,
    extractors: ExtractorSet,
    store: Arc<dyn EntryStore>,
    deps: EnrichDeps,
    publisher: Option<Arc<dyn EventPublisher>>,
    backfill: bool,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Assemble the stage graph and hand back its terminal streams.
    ///
    /// Nothing runs until the streams are polled. Every call builds an
    /// independent graph with its own error sink. Must be called inside a
    /// tokio runtime.
    pub fn streams(&self) -> Result<PipelineStreams, PipelineError> {
        let config = &self.config;
        let buffer = config.channels.buffer;
        let (errors, error_stream) = ErrorSink::channel(buffer);

        let descriptors = Poller::new(self.sources.clone(), &config.poll, errors.clone())?.stream();
        let items = Router::new(self.extractors.clone(), &config.extract, errors.clone())
            .route(descriptors);

        let Classified { new, existing } =
            Deduplicator::new(self.store.clone(), &config.dedup, buffer, errors.clone())
                .split(items);

        let enrich = &config.enrich;
        let new = Enricher::new(enrich.new, enrich, self.deps.clone(), errors.clone())?.apply(new);
        let existing = Enricher::new(enrich.existing, enrich, self.deps.clone(), errors.clone())?
            .apply(existing);

        let writer = Writer::new(self.store.clone(), &config.write, errors.clone());
        let created = writer.created(new);
        let updated = writer.updated(existing);

        let (updated, backfilled) = if self.backfill {
            let (updated, to_backfill) = fork2(updated, buffer);
            let enricher = Enricher::new(
                EnrichPlan::backfill(),
                enrich,
                self.deps.clone(),
                errors.clone(),
            )?;
            let backfill = Backfill::new(self.store.clone(), enricher, &config.write, errors);
            (updated, Some(backfill.run(to_backfill)))
        } else {
            (updated, None)
        };

        Ok(PipelineStreams {
            created,
            updated,
            backfilled,
            errors: error_stream,
        })
    }

    /// Publish every output stream on its channel until `shutdown`
    /// resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()>,
    {
        let publisher = self
            .publisher
            .clone()
            .ok_or(PipelineError::MissingCollaborator("publisher"))?;
        let streams = self.streams()?;
        let channels = &self.config.channels;
        let distributor = Distributor::new(publisher, channels.buffer);

        let created = distributor.open(&channels.created).drain(streams.created);
        let updated = distributor.open(&channels.updated).drain(streams.updated);
        let errors = distributor.open(&channels.errors).drain(streams.errors);
        let backfilled = async {
            match (streams.backfilled, &channels.backfilled) {
                (Some(stream), Some(channel)) => distributor.open(channel).drain(stream).await,
                (Some(stream), None) => {
                    stream
                        .fold(0u64, |n, view| {
                            info!(guid = %view.guid, "content backfilled");
                            ready(n + 1)
                        })
                        .await
                }
                (None, _) => 0,
            }
        };

        info!(
            created = %channels.created,
            updated = %channels.updated,
            errors = %channels.errors,
            "pipeline running"
        );

        tokio::select! {
            _ = shutdown => info!("pipeline stopping"),
            (created, updated, errors, backfilled) = async {
                tokio::join!(created, updated, errors, backfilled)
            } => {
                info!(created, updated, errors, backfilled, "pipeline streams ended");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StaticSourceFeed};

    fn base() -> PipelineBuilder {
        Pipeline::builder(PipelineConfig::default())
            .source_feed(Arc::new(StaticSourceFeed::new(Vec::new())))
            .store(Arc::new(MemoryStore::default()))
    }

    #[test]
    fn store_is_required() {
        let result = Pipeline::builder(PipelineConfig::default())
            .source_feed(Arc::new(StaticSourceFeed::new(Vec::new())))
            .build();
        assert!(matches!(
            result,
            Err(PipelineError::MissingCollaborator("entry store"))
        ));
    }

    #[test]
    fn default_existing_plan_needs_a_share_counter() {
        let result = base().build();
        assert!(matches!(
            result,
            Err(PipelineError::MissingCollaborator("share counter"))
        ));
    }

    #[tokio::test]
    async fn run_without_publisher_fails_fast() {
        let mut config = PipelineConfig::default();
        config.enrich.existing = EnrichPlan {
            timestamp: true,
            ..Default::default()
        };
        let pipeline = Pipeline::builder(config)
            .source_feed(Arc::new(StaticSourceFeed::new(Vec::new())))
            .store(Arc::new(MemoryStore::default()))
            .build()
            .unwrap();
        assert!(matches!(
            pipeline.run(std::future::pending()).await,
            Err(PipelineError::MissingCollaborator("publisher"))
        ));
    }
}
