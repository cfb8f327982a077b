//! Extractor collaborators, one per source kind.

mod feed;
mod json;
pub mod template;

pub use feed::FeedExtractor;
pub use json::JsonExtractor;

use std::sync::Arc;

use async_trait::async_trait;
use collectify_core::{Item, SourceDescriptor, SourceKind};

use crate::error::ExtractError;

/// Turns one source descriptor into candidate items.
///
/// Implementations own the format-specific rules; the router only decides
/// which extractor to call and bounds how many calls run at once.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, source: &SourceDescriptor) -> Result<Vec<Item>, ExtractError>;
}

/// Registered extractors indexed by [`SourceKind`].
#[derive(Clone, Default)]
pub struct ExtractorSet {
    slots: [Option<Arc<dyn Extractor>>; 3],
}

impl ExtractorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `extractor` for `kind`, replacing any previous one.
    pub fn insert(&mut self, kind: SourceKind, extractor: Arc<dyn Extractor>) {
        self.slots[kind.index()] = Some(extractor);
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn Extractor>> {
        self.slots[kind.index()].as_ref()
    }

    /// Kinds with a registered extractor.
    pub fn kinds(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }
}
