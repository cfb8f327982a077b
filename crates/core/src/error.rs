use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::source::SourceKind;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown source type: {0}")]
    UnknownSourceKind(String),

    #[error("unknown entry field: {0}")]
    UnknownField(String),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

// ── Pipeline stage identifiers ──────────────────────────────────

/// Enrichment step an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichStep {
    Shares,
    Content,
}

/// Store operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Create,
    Update,
    Find,
}

/// The pipeline step where a failure was observed.
///
/// Renders as `poll`, `extract:feed`, `dedup`, `enrich:shares`,
/// `write:update`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Poll,
    Extract(SourceKind),
    Dedup,
    Enrich(EnrichStep),
    Write(WriteOp),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Poll => f.write_str("poll"),
            Stage::Extract(kind) => write!(f, "extract:{kind}"),
            Stage::Dedup => f.write_str("dedup"),
            Stage::Enrich(EnrichStep::Shares) => f.write_str("enrich:shares"),
            Stage::Enrich(EnrichStep::Content) => f.write_str("enrich:content"),
            Stage::Write(WriteOp::Create) => f.write_str("write:create"),
            Stage::Write(WriteOp::Update) => f.write_str("write:update"),
            Stage::Write(WriteOp::Find) => f.write_str("write:find"),
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A failure observed at some stage, detached from the item stream.
///
/// Published on the errors channel; the item that caused it (if any)
/// is identified by guid only.
#[derive(Debug, Clone, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub cause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub at: DateTime<Utc>,
}

impl StageError {
    pub fn new(stage: Stage, cause: impl fmt::Display) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
            guid: None,
            at: Utc::now(),
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.guid {
            Some(guid) => write!(f, "[{}] {} ({})", self.stage, self.cause, guid),
            None => write!(f, "[{}] {}", self.stage, self.cause),
        }
    }
}
