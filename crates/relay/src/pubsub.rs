//! ZeroMQ transport for collectify channels.
//!
//! A message travels as two frames, `[channel, envelope]`. SUB sockets
//! filter on the first frame, so a consumer following `articles:` never
//! decodes an `errors` envelope.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::RelayError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// How a publisher reaches its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// Connect to a relay broker's frontend.
    Broker,
    /// Bind the endpoint; subscribers connect straight to the collector.
    Direct,
}

/// Frame a message for the wire.
pub fn to_frames(message: &Message) -> Result<ZmqMessage, RelayError> {
    let mut frames = ZmqMessage::from(message.channel.as_str());
    frames.push_back(message.to_bytes()?.into());
    Ok(frames)
}

/// Decode `[channel, envelope]`. The channel frame must agree with the
/// channel inside the envelope.
pub fn from_frames(frames: &ZmqMessage) -> Result<Message, RelayError> {
    let frames: Vec<_> = frames.iter().collect();
    let [channel, envelope] = frames.as_slice() else {
        return Err(RelayError::Transport(format!(
            "expected 2 frames, got {}",
            frames.len()
        )));
    };
    let channel: &[u8] = channel.as_ref();
    let message = Message::from_bytes(envelope.as_ref())?;
    if message.channel.as_bytes() != channel {
        return Err(RelayError::Transport(format!(
            "channel frame '{}' does not match envelope channel '{}'",
            String::from_utf8_lossy(channel),
            message.channel
        )));
    }
    Ok(message)
}

/// The collector's PUB socket.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
    sent: AtomicU64,
}

impl ZmqPublisher {
    pub async fn open(transport: &Transport, attach: Attach) -> Result<Self, RelayError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        match attach {
            Attach::Broker => {
                socket.connect(&endpoint).await?;
            }
            Attach::Direct => {
                transport
                    .ensure_ipc_dir()
                    .map_err(|e| RelayError::Transport(e.to_string()))?;
                socket.bind(&endpoint).await?;
            }
        }
        info!(endpoint = %endpoint, ?attach, "publisher ready");
        Ok(Self {
            socket: Mutex::new(socket),
            sent: AtomicU64::new(0),
        })
    }

    /// Messages handed to the socket so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        let frames = to_frames(&message)?;
        self.socket.lock().await.send(frames).await?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(channel = %message.channel, "published");
        Ok(())
    }
}

/// A channel consumer's SUB socket.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    /// Connect and follow `prefixes`; an empty list follows every channel.
    pub async fn follow<S: AsRef<str>>(
        transport: &Transport,
        prefixes: &[S],
    ) -> Result<Self, RelayError> {
        let mut socket = SubSocket::new();
        socket.connect(&transport.endpoint()).await?;
        if prefixes.is_empty() {
            socket.subscribe("").await?;
        }
        for prefix in prefixes {
            socket.subscribe(prefix.as_ref()).await?;
        }
        info!(
            endpoint = %transport,
            prefixes = ?prefixes.iter().map(|p| p.as_ref()).collect::<Vec<&str>>(),
            "following channels"
        );
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, prefix: &str) -> Result<(), RelayError> {
        self.socket.lock().await.subscribe(prefix).await?;
        debug!(prefix = %prefix, "added channel prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, RelayError> {
        let frames = self.socket.lock().await.recv().await?;
        let message = from_frames(&frames)?;
        trace!(channel = %message.channel, "received");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels;
    use std::time::Duration;

    #[test]
    fn frames_carry_channel_then_envelope() {
        let msg = Message::new(channels::ARTICLES_NEW, &serde_json::json!({ "guid": "g" })).unwrap();
        let frames = to_frames(&msg).unwrap();

        let parts: Vec<_> = frames.iter().collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_ref(), b"articles:new");

        let back = from_frames(&frames).unwrap();
        assert_eq!(back.correlation_id, msg.correlation_id);
    }

    #[test]
    fn bare_envelope_is_rejected() {
        let msg = Message::new(channels::ERRORS, &"x").unwrap();
        let frames = ZmqMessage::from(msg.to_bytes().unwrap());
        assert!(matches!(from_frames(&frames), Err(RelayError::Transport(_))));
    }

    #[test]
    fn mismatched_channel_frame_is_rejected() {
        let msg = Message::new(channels::ERRORS, &"x").unwrap();
        let mut frames = ZmqMessage::from(channels::ARTICLES_NEW);
        frames.push_back(msg.to_bytes().unwrap().into());

        let err = from_frames(&frames).unwrap_err();
        assert!(err.to_string().contains("does not match"), "got: {err}");
    }

    #[tokio::test]
    async fn direct_attach_reaches_a_follower() {
        let transport = Transport::tcp("127.0.0.1", 15800);

        let publisher = ZmqPublisher::open(&transport, Attach::Direct).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let follower = ZmqSubscriber::follow(&transport, &["articles:"]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        publisher
            .publish(Message::new(channels::ERRORS, &"skipped").unwrap())
            .await
            .unwrap();
        publisher
            .publish(Message::new(channels::ARTICLES_NEW, &serde_json::json!({ "guid": "g-1" })).unwrap())
            .await
            .unwrap();
        assert_eq!(publisher.sent(), 2);

        let received = tokio::time::timeout(Duration::from_secs(2), follower.recv())
            .await
            .expect("timed out waiting for message")
            .unwrap();
        assert_eq!(received.channel, channels::ARTICLES_NEW);
        assert_eq!(received.json().unwrap()["guid"], "g-1");

        let nothing = tokio::time::timeout(Duration::from_millis(300), follower.recv()).await;
        assert!(nothing.is_err(), "errors channel leaked through the prefix");
    }
}
