//! Collector stream pipeline.
//!
//! Polls active sources, extracts candidate items, splits them into new
//! and already-seen by guid, enriches both sides, writes them to the
//! entry store and publishes the results on named channels. Stage
//! failures never stop the flow; they are reported to one error sink.

pub mod backfill;
pub mod config;
pub mod dedup;
pub mod distributor;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod http;
pub mod pipeline;
pub mod poller;
pub mod router;
pub mod sink;
pub mod store;
pub mod stream;
pub mod writer;

pub use config::PipelineConfig;
pub use error::{ExtractError, FetchError, PipelineError, StoreError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStreams};
pub use sink::ErrorSink;
pub use stream::BoxStream;
