use std::future::ready;
use std::time::Duration;

use collectify_core::{Item, SourceDescriptor, SourceKind, Stage, StageError};
use futures::stream::{self, select_all};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

use crate::config::ExtractConfig;
use crate::error::ExtractError;
use crate::extract::ExtractorSet;
use crate::sink::ErrorSink;
use crate::stream::BoxStream;

/// Splits descriptors by kind, extracts each branch with bounded
/// concurrency and merges the results into one item stream.
///
/// Branches are merged first-ready-first-out, so items from different
/// kinds interleave in no particular order.
pub struct Router {
    extractors: ExtractorSet,
    concurrency: usize,
    timeout: Duration,
    errors: ErrorSink,
}

impl Router {
    pub fn new(extractors: ExtractorSet, config: &ExtractConfig, errors: ErrorSink) -> Self {
        Self {
            extractors,
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
            errors,
        }
    }

    /// Must be called inside a tokio runtime.
    pub fn route(self, descriptors: BoxStream<SourceDescriptor>) -> BoxStream<Item> {
        let mut senders = Vec::with_capacity(SourceKind::ALL.len());
        let mut branches = Vec::with_capacity(SourceKind::ALL.len());

        for kind in SourceKind::ALL {
            let (tx, rx) = mpsc::channel::<SourceDescriptor>(self.concurrency);
            senders.push(tx);

            let extractors = self.extractors.clone();
            let errors = self.errors.clone();
            let timeout = self.timeout;
            let branch = ReceiverStream::new(rx)
                .map(move |source| {
                    extract_one(extractors.clone(), source, timeout, errors.clone())
                })
                .buffer_unordered(self.concurrency);
            trace!(%kind, "branch ready");
            branches.push(Box::pin(branch) as BoxStream<Vec<Item>>);
        }

        tokio::spawn(dispatch(descriptors, senders));

        let items = select_all(branches)
            .flat_map(stream::iter)
            .filter(|item| ready(!item.guid.is_empty()));
        Box::pin(items)
    }
}

/// Feed each descriptor to its kind's branch. Stops once every branch
/// has gone away or upstream ends.
async fn dispatch(
    mut descriptors: BoxStream<SourceDescriptor>,
    senders: Vec<mpsc::Sender<SourceDescriptor>>,
) {
    let mut open = senders.len();
    let mut senders: Vec<Option<mpsc::Sender<SourceDescriptor>>> =
        senders.into_iter().map(Some).collect();

    while open > 0 {
        let Some(source) = descriptors.next().await else {
            break;
        };
        let slot = &mut senders[source.kind.index()];
        let Some(tx) = slot else {
            continue;
        };
        if tx.send(source).await.is_err() {
            *slot = None;
            open -= 1;
        }
    }
    trace!("router dispatch finished");
}

async fn extract_one(
    extractors: ExtractorSet,
    source: SourceDescriptor,
    timeout: Duration,
    errors: ErrorSink,
) -> Vec<Item> {
    let kind = source.kind;
    let result = match extractors.get(kind) {
        None => Err(ExtractError::Unsupported(kind)),
        Some(extractor) => tokio::time::timeout(timeout, extractor.extract(&source))
            .await
            .unwrap_or(Err(ExtractError::Timeout(timeout))),
    };

    match result {
        Ok(items) => {
            debug!(source = %source.name, items = items.len(), stage = %Stage::Extract(kind), "extracted");
            items
        }
        Err(e) => {
            errors.report(StageError::new(
                Stage::Extract(kind),
                format!("{}: {e}", source.name),
            ));
            Vec::new()
        }
    }
}
