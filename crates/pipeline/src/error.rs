use std::time::Duration;

use collectify_core::SourceKind;
use thiserror::Error;

/// Failures from the persisted store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query error: {0}")]
    Query(String),

    #[error("entry with guid '{0}' already exists")]
    Duplicate(String),

    #[error("could not decode stored record: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(e.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Failures from an HTTP collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP connection pool closed")]
    PoolClosed,
}

/// Failures from an extractor call.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("no extractor registered for '{0}' sources")]
    Unsupported(SourceKind),
}

/// Errors that stop the pipeline from being built or started.
///
/// Item-level failures never show up here; they go to the error sink.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("invalid environment override: {0}")]
    Env(#[from] collectify_core::CoreError),

    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Relay(#[from] collectify_relay::RelayError),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
