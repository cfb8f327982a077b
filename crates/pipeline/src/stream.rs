//! Stream plumbing shared by the stages.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Owned, sendable stream used between stages.
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Copy every upstream value into `branches` independent streams.
///
/// A pump task pulls upstream only when every live branch has room, so
/// the slowest branch sets the pace. A branch whose receiver is dropped is
/// left behind; once all are gone the pump stops pulling. Values already
/// handed to a branch are not recalled.
///
/// Must be called inside a tokio runtime.
pub fn fork<T>(upstream: BoxStream<T>, branches: usize, buffer: usize) -> Vec<BoxStream<T>>
where
    T: Clone + Send + 'static,
{
    let (senders, outputs): (Vec<_>, Vec<_>) = (0..branches).map(|_| branch(buffer)).unzip();
    spawn_pump(upstream, senders);
    outputs
}

/// [`fork`] into exactly two branches.
pub fn fork2<T>(upstream: BoxStream<T>, buffer: usize) -> (BoxStream<T>, BoxStream<T>)
where
    T: Clone + Send + 'static,
{
    let (tx_a, a) = branch(buffer);
    let (tx_b, b) = branch(buffer);
    spawn_pump(upstream, vec![tx_a, tx_b]);
    (a, b)
}

/// Drive `upstream` on its own task and hand its values over a bounded
/// channel.
///
/// The stage makes progress as soon as input arrives instead of waiting
/// for the consumer to poll; a full channel still holds it back. Must be
/// called inside a tokio runtime.
pub fn detach<T>(upstream: BoxStream<T>, buffer: usize) -> BoxStream<T>
where
    T: Send + 'static,
{
    let (tx, out) = branch(buffer);
    tokio::spawn(async move {
        let mut upstream = upstream;
        while let Some(value) = upstream.next().await {
            if tx.send(value).await.is_err() {
                break;
            }
        }
    });
    out
}

fn branch<T: Send + 'static>(buffer: usize) -> (mpsc::Sender<T>, BoxStream<T>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (tx, Box::pin(ReceiverStream::new(rx)))
}

fn spawn_pump<T>(mut upstream: BoxStream<T>, mut senders: Vec<mpsc::Sender<T>>)
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        while !senders.is_empty() {
            let Some(value) = upstream.next().await else {
                break;
            };
            let mut open = Vec::with_capacity(senders.len());
            for tx in senders {
                if tx.send(value.clone()).await.is_ok() {
                    open.push(tx);
                }
            }
            senders = open;
        }
        tracing::trace!("fork pump finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn every_branch_sees_every_value() {
        let (a, b) = fork2(Box::pin(stream::iter(vec![1, 2, 3])), 4);
        let (a, b) = tokio::join!(a.collect::<Vec<_>>(), b.collect::<Vec<_>>());
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(b, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn dropped_branch_does_not_stall_the_other() {
        let (a, b) = fork2(Box::pin(stream::iter(0..100)), 1);
        drop(b);
        let got = tokio::time::timeout(Duration::from_secs(2), a.collect::<Vec<_>>())
            .await
            .expect("surviving branch stalled");
        assert_eq!(got.len(), 100);
    }

    #[tokio::test]
    async fn stops_pulling_when_all_branches_close() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let upstream = stream::iter(0..).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            i
        });
        let branches = fork(Box::pin(upstream), 2, 1);
        drop(branches);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_close = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), after_close);
        assert!(after_close <= 2);
    }

    #[tokio::test]
    async fn detached_stage_runs_ahead_of_its_consumer() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let upstream = stream::iter(0..10).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            i
        });
        let out = detach(Box::pin(upstream), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pulled.load(Ordering::SeqCst) >= 4);
        assert_eq!(out.collect::<Vec<_>>().await, (0..10).collect::<Vec<_>>());
    }
}
