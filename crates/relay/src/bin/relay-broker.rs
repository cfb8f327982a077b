//! relay-broker: forwards collector output to channel consumers.
//!
//! ```bash
//! # Local IPC (default)
//! relay-broker
//!
//! # TCP
//! relay-broker --frontend tcp://0.0.0.0:5555 --backend tcp://0.0.0.0:5556
//! ```

use std::time::Duration;

use clap::Parser;
use collectify_relay::{EventBroker, RelayEndpoints, Transport};

#[derive(Parser, Debug)]
#[command(name = "relay-broker", version, about)]
struct Cli {
    /// Collectors publish here.
    #[arg(
        long,
        env = "COLLECTIFY_RELAY_FRONTEND",
        default_value = "ipc:///tmp/collectify/relay-frontend.sock"
    )]
    frontend: String,

    /// Channel consumers subscribe here.
    #[arg(
        long,
        env = "COLLECTIFY_RELAY_BACKEND",
        default_value = "ipc:///tmp/collectify/relay-backend.sock"
    )]
    backend: String,

    /// Seconds between stats log lines (0 = off).
    #[arg(long, env = "COLLECTIFY_RELAY_REPORT_SECS", default_value_t = 30)]
    report_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting relay-broker");

    let broker = EventBroker::new(RelayEndpoints {
        publishers: Transport::parse(&cli.frontend)?,
        subscribers: Transport::parse(&cli.backend)?,
    })
    .report_every(Duration::from_secs(cli.report_secs));

    let stats = broker
        .run(async {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    tracing::info!(forwarded = stats.total(), dropped = stats.dropped, "relay-broker exited");
    Ok(())
}

/// SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
        tracing::warn!("SIGTERM handler unavailable, waiting on ctrl-c only");
    }
    let _ = tokio::signal::ctrl_c().await;
}
