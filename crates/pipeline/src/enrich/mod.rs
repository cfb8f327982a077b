//! Item enrichment: timestamp refresh, share counts, page content, keywords.
//!
//! Every step except the timestamp is derive-if-absent: an item that
//! already carries the target field passes through untouched and no
//! collaborator is called for it.

mod content;
mod keywords;
mod shares;

pub use content::{page_text, ContentFetcher, HttpContentFetcher};
pub use keywords::{KeywordExtractor, StopwordKeywords};
pub use shares::{HttpShareCounter, ShareCounter};

use std::sync::Arc;

use chrono::Utc;
use collectify_core::{EnrichStep, Item, Shares, Stage};
use futures::future::{join_all, ready};
use futures::StreamExt;
use tracing::debug;

use crate::config::{EnrichConfig, EnrichPlan};
use crate::error::PipelineError;
use crate::sink::ErrorSink;
use crate::stream::BoxStream;

/// Collaborators the enrichment steps call out to.
#[derive(Clone)]
pub struct EnrichDeps {
    pub shares: Option<Arc<dyn ShareCounter>>,
    pub content: Option<Arc<dyn ContentFetcher>>,
    pub keywords: Arc<dyn KeywordExtractor>,
}

impl EnrichDeps {
    /// Fails when `plan` needs a collaborator that is not set.
    pub fn check(&self, plan: EnrichPlan) -> Result<(), PipelineError> {
        if plan.shares && self.shares.is_none() {
            return Err(PipelineError::MissingCollaborator("share counter"));
        }
        if plan.content && self.content.is_none() {
            return Err(PipelineError::MissingCollaborator("content fetcher"));
        }
        Ok(())
    }
}

impl Default for EnrichDeps {
    fn default() -> Self {
        Self {
            shares: None,
            content: None,
            keywords: Arc::new(StopwordKeywords::new()),
        }
    }
}

/// One configured enrichment chain. Cheap to clone.
#[derive(Clone)]
pub struct Enricher {
    plan: EnrichPlan,
    networks: Arc<Vec<String>>,
    keyword_limit: usize,
    share_concurrency: usize,
    content_concurrency: usize,
    deps: EnrichDeps,
    errors: ErrorSink,
}

impl Enricher {
    /// Fails when `plan` needs a collaborator `deps` does not provide.
    pub fn new(
        plan: EnrichPlan,
        config: &EnrichConfig,
        deps: EnrichDeps,
        errors: ErrorSink,
    ) -> Result<Self, PipelineError> {
        deps.check(plan)?;
        Ok(Self {
            plan,
            networks: Arc::new(config.networks.clone()),
            keyword_limit: config.keyword_limit,
            share_concurrency: config.share_concurrency.max(1),
            content_concurrency: config.content_concurrency.max(1),
            deps,
            errors,
        })
    }

    /// Run the planned steps in order over `items`.
    ///
    /// Items whose content fetch fails are dropped (and reported); every
    /// other failure leaves the item in the stream.
    pub fn apply(&self, items: BoxStream<Item>) -> BoxStream<Item> {
        let mut out = items;

        if self.plan.timestamp {
            out = Box::pin(out.map(refresh_timestamp));
        }

        if self.plan.shares {
            let this = self.clone();
            out = Box::pin(
                out.map(move |item| {
                    let this = this.clone();
                    async move { this.with_shares(item).await }
                })
                .buffer_unordered(self.share_concurrency),
            );
        }

        if self.plan.content {
            let this = self.clone();
            out = Box::pin(
                out.map(move |item| {
                    let this = this.clone();
                    async move { this.with_content(item).await }
                })
                .buffer_unordered(self.content_concurrency)
                .filter_map(ready),
            );
        }

        if self.plan.keywords {
            let this = self.clone();
            out = Box::pin(out.map(move |item| this.with_keywords(item)));
        }

        out
    }

    /// Fetch a count for every network concurrently. A failing network is
    /// reported and left out of the map; the others still land.
    pub async fn with_shares(&self, mut item: Item) -> Item {
        let Some(counter) = &self.deps.shares else {
            return item;
        };
        if item.has_shares() {
            return item;
        }

        let url = item.url.clone();
        let lookups = self.networks.iter().map(|network| {
            let url = &url;
            async move { (network, counter.count(network, url).await) }
        });

        let mut shares = Shares::new();
        for (network, result) in join_all(lookups).await {
            match result {
                Ok(n) => {
                    shares.insert(network.clone(), n);
                }
                Err(e) => self.errors.item(
                    Stage::Enrich(EnrichStep::Shares),
                    &item.guid,
                    format!("{network}: {e}"),
                ),
            }
        }

        if !shares.is_empty() {
            item.shares = Some(shares);
        }
        debug!(guid = %item.guid, stage = "enrich:shares", "enriched");
        item
    }

    /// Fill `content` from the page. `None` means the fetch failed.
    pub async fn with_content(&self, mut item: Item) -> Option<Item> {
        let Some(fetcher) = &self.deps.content else {
            return Some(item);
        };
        if item.has_content() {
            return Some(item);
        }

        match fetcher.fetch(&item.url).await {
            Ok(text) => {
                item.content = Some(text);
                debug!(guid = %item.guid, stage = "enrich:content", "enriched");
                Some(item)
            }
            Err(e) => {
                self.errors
                    .item(Stage::Enrich(EnrichStep::Content), &item.guid, e);
                None
            }
        }
    }

    /// Derive keywords from `content` when there is some and none are set.
    pub fn with_keywords(&self, mut item: Item) -> Item {
        if item.has_keywords() || !item.has_content() {
            return item;
        }
        let text = item.content.as_deref().unwrap_or_default();
        let keywords = self.deps.keywords.extract(text, self.keyword_limit);
        if !keywords.is_empty() {
            item.keywords = Some(keywords);
        }
        item
    }
}

fn refresh_timestamp(mut item: Item) -> Item {
    item.created_at = Some(Utc::now());
    item
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use collectify_core::StageError;
    use futures::stream;

    use super::*;
    use crate::error::FetchError;

    struct FixedShares;

    #[async_trait]
    impl ShareCounter for FixedShares {
        async fn count(&self, network: &str, _url: &str) -> Result<u64, FetchError> {
            match network {
                "twitter" => Err(FetchError::Decode("rate limited".into())),
                _ => Ok(network.len() as u64),
            }
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(FetchError::Status {
                    url: url.into(),
                    status: 500,
                });
            }
            Ok("Borrow checker explained. The borrow checker keeps Rust safe.".into())
        }
    }

    fn item(guid: &str, url: &str) -> Item {
        Item::new(guid, url, "T", Utc::now())
    }

    fn enricher(
        plan: EnrichPlan,
        fetcher: Arc<CountingFetcher>,
    ) -> (Enricher, BoxStream<StageError>) {
        let (sink, errors) = ErrorSink::channel(16);
        let deps = EnrichDeps {
            shares: Some(Arc::new(FixedShares)),
            content: Some(fetcher),
            ..Default::default()
        };
        let enricher = Enricher::new(plan, &EnrichConfig::default(), deps, sink).unwrap();
        (enricher, errors)
    }

    #[tokio::test]
    async fn failing_network_does_not_block_the_others() {
        let (enricher, mut errors) = enricher(EnrichPlan::refresh(), Arc::default());
        let out = enricher.with_shares(item("a", "http://x")).await;

        let shares = out.shares.unwrap();
        assert_eq!(shares.get("facebook"), Some(&8));
        assert_eq!(shares.get("linkedin"), Some(&8));
        assert!(!shares.contains_key("twitter"));

        let err = errors.next().await.unwrap();
        assert_eq!(err.stage, Stage::Enrich(EnrichStep::Shares));
        assert!(err.cause.starts_with("twitter:"));
    }

    #[tokio::test]
    async fn existing_content_is_never_refetched() {
        let fetcher = Arc::new(CountingFetcher::default());
        let (enricher, _errors) = enricher(EnrichPlan::backfill(), fetcher.clone());

        let mut with_body = item("a", "http://x");
        with_body.content = Some("already here".into());
        let out = enricher.with_content(with_body).await.unwrap();

        assert_eq!(out.content.as_deref(), Some("already here"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_content_fetch_drops_the_item() {
        let fetcher = Arc::new(CountingFetcher::default());
        let (enricher, mut errors) = enricher(EnrichPlan::backfill(), fetcher);

        let input = stream::iter(vec![item("bad", "http://broken"), item("ok", "http://fine")]);
        let out: Vec<Item> = enricher.apply(Box::pin(input)).collect().await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].guid, "ok");
        assert_eq!(out[0].keywords.as_ref().unwrap()[..2], ["borrow", "checker"]);

        let err = errors.next().await.unwrap();
        assert_eq!(err.stage, Stage::Enrich(EnrichStep::Content));
        assert_eq!(err.guid.as_deref(), Some("bad"));
    }

    #[tokio::test]
    async fn timestamp_is_always_refreshed() {
        let (enricher, _errors) = enricher(EnrichPlan::refresh(), Arc::default());
        let mut stale = item("a", "http://x");
        stale.created_at = Some(Utc::now() - chrono::Duration::hours(3));

        let out: Vec<Item> = enricher
            .apply(Box::pin(stream::iter(vec![stale])))
            .collect()
            .await;
        assert!(out[0].created_at.unwrap() > Utc::now() - chrono::Duration::minutes(1));
    }

    #[tokio::test]
    async fn keywords_need_content() {
        let (enricher, _errors) = enricher(EnrichPlan::default(), Arc::default());
        assert!(enricher.with_keywords(item("a", "http://x")).keywords.is_none());
    }

    #[test]
    fn plan_without_collaborator_is_rejected() {
        let (sink, _errors) = ErrorSink::channel(1);
        let result = Enricher::new(
            EnrichPlan::backfill(),
            &EnrichConfig::default(),
            EnrichDeps::default(),
            sink,
        );
        assert!(matches!(
            result,
            Err(PipelineError::MissingCollaborator("content fetcher"))
        ));
    }
}
