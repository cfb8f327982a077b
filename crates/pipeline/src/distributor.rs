use std::sync::Arc;

use collectify_relay::{EventPublisher, Message};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::stream::BoxStream;

/// Hands finished values to the publish transport, one queue per channel.
///
/// Stages never wait on the transport: a value is queued and the next one
/// is processed while a background task publishes. Publish failures are
/// logged and the message is lost (at-most-once).
pub struct Distributor {
    publisher: Arc<dyn EventPublisher>,
    buffer: usize,
}

impl Distributor {
    pub fn new(publisher: Arc<dyn EventPublisher>, buffer: usize) -> Self {
        Self {
            publisher,
            buffer: buffer.max(1),
        }
    }

    /// Start the publish task for `channel`. Must be called inside a
    /// tokio runtime; the task ends once every sink clone is dropped.
    pub fn open(&self, channel: &str) -> ChannelSink {
        let (tx, mut rx) = mpsc::channel::<Message>(self.buffer);
        let publisher = self.publisher.clone();
        let name: Arc<str> = Arc::from(channel);

        let task_channel = name.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = publisher.publish(message).await {
                    warn!(channel = %task_channel, error = %e, "publish failed");
                }
            }
            trace!(channel = %task_channel, "publish task finished");
        });

        ChannelSink { channel: name, tx }
    }
}

/// Write end of one output channel.
#[derive(Clone)]
pub struct ChannelSink {
    channel: Arc<str>,
    tx: mpsc::Sender<Message>,
}

impl ChannelSink {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Queue one value. Returns false when it could not be encoded or the
    /// publish task is gone.
    pub async fn send<T: Serialize>(&self, value: &T) -> bool {
        let message = match Message::new(self.channel.as_ref(), value) {
            Ok(m) => m,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "could not encode payload");
                return false;
            }
        };
        self.tx.send(message).await.is_ok()
    }

    /// Send everything from `values`; returns how many were queued.
    pub async fn drain<T: Serialize + Send>(self, mut values: BoxStream<T>) -> u64 {
        let mut sent = 0;
        while let Some(value) = values.next().await {
            if self.send(&value).await {
                sent += 1;
                debug!(channel = %self.channel, "distributed");
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use collectify_relay::{EventSubscriber, MemoryBus, RelayError};
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn values_arrive_on_their_channel() {
        let bus = MemoryBus::new(16);
        let sub = bus.subscriber();
        sub.subscribe("articles:").await.unwrap();

        let distributor = Distributor::new(Arc::new(bus.clone()), 8);
        let sink = distributor.open("articles:new");
        let values = Box::pin(stream::iter(vec![
            serde_json::json!({ "guid": "a" }),
            serde_json::json!({ "guid": "b" }),
        ]));
        assert_eq!(sink.drain(values).await, 2);

        for want in ["a", "b"] {
            let msg = tokio::time::timeout(Duration::from_secs(2), sub.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg.channel, "articles:new");
            assert_eq!(msg.json().unwrap()["guid"], want);
        }
    }

    struct FailingPublisher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _message: Message) -> Result<(), RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::Transport("broker down".into()))
        }
    }

    #[tokio::test]
    async fn publish_failures_do_not_stop_the_channel() {
        let publisher = Arc::new(FailingPublisher {
            calls: AtomicUsize::new(0),
        });
        let distributor = Distributor::new(publisher.clone(), 8);
        let sink = distributor.open("errors");

        let values = Box::pin(stream::iter(vec![1, 2, 3]));
        assert_eq!(sink.drain(values).await, 3);

        tokio::time::timeout(Duration::from_secs(2), async {
            while publisher.calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("publish task stalled");
    }
}
