use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::message::Message;

/// Broadcasts messages to every subscriber of their channel.
///
/// Delivery is fire-and-forget: a message with no current subscriber is
/// simply lost.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), RelayError>;
}

/// Blanket implementation so `Arc<dyn EventPublisher>` can be used directly.
#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        (**self).publish(message).await
    }
}

/// Receives messages whose channel starts with one of the subscribed prefixes.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Add a channel prefix. An empty string matches every channel.
    async fn subscribe(&self, prefix: &str) -> Result<(), RelayError>;

    /// Receive the next matching message.
    async fn recv(&self) -> Result<Message, RelayError>;
}
