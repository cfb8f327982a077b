use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use collectify_core::{Stage, StageError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{trace, warn};

use crate::stream::BoxStream;

/// Shared emission point for stage failures.
///
/// Every stage gets a clone. Reporting never blocks: when the error
/// channel is full the record is dropped and counted in
/// [`ErrorSink::dropped`], so a burst of failures cannot stall item flow.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<StageError>,
    dropped: Arc<AtomicU64>,
}

impl ErrorSink {
    /// A sink plus the stream of everything reported to it.
    pub fn channel(buffer: usize) -> (Self, BoxStream<StageError>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, Box::pin(ReceiverStream::new(rx)))
    }

    /// Records lost to a full channel, across all clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn report(&self, err: StageError) {
        warn!(
            stage = %err.stage,
            cause = %err.cause,
            guid = err.guid.as_deref().unwrap_or(""),
            "stage error"
        );
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(err)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(stage = %err.stage, dropped, "error channel full, dropping record");
            }
            // Nobody is consuming errors any more.
            Err(mpsc::error::TrySendError::Closed(_)) => trace!("error channel closed"),
        }
    }

    /// Report a failure tied to one item.
    pub fn item(&self, stage: Stage, guid: &str, cause: impl fmt::Display) {
        self.report(StageError::new(stage, cause).with_guid(guid));
    }
}
