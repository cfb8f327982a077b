//! channel-tail: print messages from one or more output channels.
//!
//! ```bash
//! channel-tail --endpoint tcp://127.0.0.1:5556 articles: errors
//! ```

use clap::Parser;
use collectify_relay::{EventSubscriber, Transport, ZmqSubscriber};

#[derive(Parser, Debug)]
#[command(name = "channel-tail", version, about)]
struct Cli {
    /// Relay backend (or a collector bound directly).
    #[arg(
        long,
        env = "COLLECTIFY_RELAY_BACKEND",
        default_value = "ipc:///tmp/collectify/relay-backend.sock"
    )]
    endpoint: String,

    /// Channel prefixes to follow; none means everything.
    prefixes: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let transport = Transport::parse(&cli.endpoint)?;
    let subscriber = ZmqSubscriber::follow(&transport, &cli.prefixes).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = subscriber.recv() => {
                let msg = received?;
                let payload = msg
                    .json()
                    .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&msg.payload).into_owned()));
                let line = serde_json::json!({
                    "channel": msg.channel,
                    "timestamp": msg.timestamp,
                    "payload": payload,
                });
                println!("{line}");
            }
        }
    }

    Ok(())
}
