//! collector: runs the collect pipeline and publishes to the relay.
//!
//! ```bash
//! # Postgres sources + entries, publish to the local relay broker
//! DATABASE_URL=postgres://localhost/collectify collector
//!
//! # No database: fixed sources, in-process entry store
//! collector --store memory --sources config/sources.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use collectify_core::SourceKind;
use collectify_pipeline::enrich::{HttpContentFetcher, HttpShareCounter};
use collectify_pipeline::extract::{FeedExtractor, JsonExtractor};
use collectify_pipeline::http::HttpClient;
use collectify_pipeline::store::{
    connect_postgres, EntryStore, MemoryStore, PgEntryStore, PgSourceFeed, SourceFeed,
    StaticSourceFeed,
};
use collectify_pipeline::{Pipeline, PipelineConfig};
use collectify_relay::{Attach, EventPublisher, Transport, ZmqPublisher};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "collector", version, about)]
struct Cli {
    /// Path to collectify.toml.
    #[arg(long, env = "COLLECTIFY_CONFIG", default_value = "config/collectify.toml")]
    config: PathBuf,

    /// Poll a fixed JSON list of source descriptors instead of the database.
    #[arg(long, env = "COLLECTIFY_SOURCES")]
    sources: Option<PathBuf>,

    /// Where entries are kept.
    #[arg(long, env = "COLLECTIFY_STORE", value_enum, default_value_t = StoreKind::Postgres)]
    store: StoreKind,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    collectify_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting collector");

    let config = PipelineConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.log_summary();

    let (sources, store, janitor) = open_stores(&cli, &config).await?;

    let transport = Transport::parse(&config.relay.frontend)?;
    let attach = if config.relay.bind {
        Attach::Direct
    } else {
        Attach::Broker
    };
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(ZmqPublisher::open(&transport, attach).await?);

    let http = HttpClient::new(&config.http)?;
    let pipeline = Pipeline::builder(config.clone())
        .source_feed(sources)
        .store(store)
        .extractor(SourceKind::Feed, Arc::new(FeedExtractor::new(http.clone())))
        .extractor(SourceKind::Json, Arc::new(JsonExtractor::new(http.clone())))
        .share_counter(Arc::new(HttpShareCounter::new(
            http.clone(),
            config.enrich.share_endpoints.clone(),
        )))
        .content_fetcher(Arc::new(HttpContentFetcher::new(http)))
        .publisher(publisher)
        .build()?;

    pipeline
        .run(async {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    janitor.abort();
    tracing::info!("collector exited cleanly");
    Ok(())
}

/// Source feed, entry store and the task that purges expired entries.
async fn open_stores(
    cli: &Cli,
    config: &PipelineConfig,
) -> anyhow::Result<(Arc<dyn SourceFeed>, Arc<dyn EntryStore>, JoinHandle<()>)> {
    let ttl = config.store.entry_ttl();
    let every = config.store.purge_interval();

    match cli.store {
        StoreKind::Memory => {
            let path = cli
                .sources
                .as_ref()
                .context("--store memory needs --sources <file>")?;
            let sources: Arc<dyn SourceFeed> = Arc::new(StaticSourceFeed::from_file(path)?);
            let store = Arc::new(MemoryStore::new(ttl));
            let janitor = spawn_memory_janitor(store.clone(), every);
            let store: Arc<dyn EntryStore> = store;
            Ok((sources, store, janitor))
        }
        StoreKind::Postgres => {
            let url = config
                .database_url()
                .context("no database URL: set store.database_url or DATABASE_URL")?;
            let pool = connect_postgres(&url, config.store.max_connections).await?;

            let sources: Arc<dyn SourceFeed> = match &cli.sources {
                Some(path) => Arc::new(StaticSourceFeed::from_file(path)?),
                None => Arc::new(PgSourceFeed::new(pool.clone())),
            };
            let store = Arc::new(PgEntryStore::new(pool, ttl));
            let janitor = store.clone().spawn_janitor(every);
            let store: Arc<dyn EntryStore> = store;
            Ok((sources, store, janitor))
        }
    }
}

fn spawn_memory_janitor(store: Arc<MemoryStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "expired entries removed");
            }
        }
    })
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting on ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
