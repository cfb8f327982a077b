use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::error::RelayError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};

/// In-process pub/sub over a tokio broadcast channel.
///
/// Used when the collector runs without a broker and in tests. Same
/// semantics as the ZeroMQ path: publishing with no subscribers drops the
/// message, slow subscribers lose the oldest messages.
#[derive(Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<Message>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// A new subscriber with no prefixes; call `subscribe` before `recv`.
    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            rx: Mutex::new(self.tx.subscribe()),
            prefixes: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        // An Err here only means nobody is listening.
        let _ = self.tx.send(message);
        Ok(())
    }
}

pub struct MemorySubscriber {
    rx: Mutex<broadcast::Receiver<Message>>,
    prefixes: Mutex<Vec<String>>,
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn subscribe(&self, prefix: &str) -> Result<(), RelayError> {
        self.prefixes.lock().await.push(prefix.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<Message, RelayError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    let prefixes = self.prefixes.lock().await;
                    if prefixes.iter().any(|p| msg.channel.starts_with(p.as_str())) {
                        return Ok(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "memory subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(RelayError::Closed),
            }
        }
    }
}
