use thiserror::Error;

/// Errors that can occur in the relay layer.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("envelope encode error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("envelope decode error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel closed")]
    Closed,
}
