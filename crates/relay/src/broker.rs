//! Relay broker between collector publishers and channel consumers.
//!
//! `zeromq` 0.4 has no XPUB/XSUB, so the relay is a SUB socket following
//! every channel feeding a PUB socket.

use std::collections::BTreeMap;
use std::future::{pending, Future};
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::RelayError;
use crate::transport::Transport;

/// The two sides of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoints {
    /// Collectors connect here.
    pub publishers: Transport,
    /// Channel consumers connect here.
    pub subscribers: Transport,
}

impl RelayEndpoints {
    /// `<prefix>-frontend` and `<prefix>-backend` IPC sockets.
    pub fn ipc(prefix: &str) -> Self {
        Self {
            publishers: Transport::ipc(&format!("{prefix}-frontend")),
            subscribers: Transport::ipc(&format!("{prefix}-backend")),
        }
    }

    pub fn tcp(host: &str, publisher_port: u16, subscriber_port: u16) -> Self {
        Self {
            publishers: Transport::tcp(host, publisher_port),
            subscribers: Transport::tcp(host, subscriber_port),
        }
    }
}

impl Default for RelayEndpoints {
    fn default() -> Self {
        Self::ipc("relay")
    }
}

/// Messages forwarded per channel over one broker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    forwarded: BTreeMap<String, u64>,
    /// Frames without a channel, or that the backend refused.
    pub dropped: u64,
}

impl ChannelStats {
    pub fn forwarded(&self, channel: &str) -> u64 {
        self.forwarded.get(channel).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.forwarded.values().sum()
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, u64)> {
        self.forwarded.iter().map(|(name, n)| (name.as_str(), *n))
    }

    fn record(&mut self, channel: &str) {
        *self.forwarded.entry(channel.to_string()).or_default() += 1;
    }

    fn log(&self) {
        info!(total = self.total(), dropped = self.dropped, "relay stats");
        for (channel, n) in self.channels() {
            debug!(channel, forwarded = n, "channel stats");
        }
    }
}

pub struct EventBroker {
    endpoints: RelayEndpoints,
    report_every: Option<Duration>,
}

impl EventBroker {
    pub fn new(endpoints: RelayEndpoints) -> Self {
        Self {
            endpoints,
            report_every: None,
        }
    }

    /// Log the running stats every `period`.
    pub fn report_every(mut self, period: Duration) -> Self {
        self.report_every = Some(period).filter(|p| !p.is_zero());
        self
    }

    async fn bind(&self) -> Result<(SubSocket, PubSocket), RelayError> {
        let RelayEndpoints {
            publishers,
            subscribers,
        } = &self.endpoints;
        for transport in [publishers, subscribers] {
            transport
                .ensure_ipc_dir()
                .and_then(|_| transport.remove_stale_socket())
                .map_err(|e| RelayError::Transport(e.to_string()))?;
        }

        let mut frontend = SubSocket::new();
        frontend.bind(&publishers.endpoint()).await?;
        frontend.subscribe("").await?;

        let mut backend = PubSocket::new();
        backend.bind(&subscribers.endpoint()).await?;

        info!(%publishers, %subscribers, "relay bound");
        Ok((frontend, backend))
    }

    /// Forward until `shutdown` resolves, then return what went through.
    pub async fn run<F>(&self, shutdown: F) -> Result<ChannelStats, RelayError>
    where
        F: Future<Output = ()>,
    {
        let (mut frontend, mut backend) = self.bind().await?;
        let mut report = self
            .report_every
            .map(|period| interval_at(Instant::now() + period, period));
        let mut stats = ChannelStats::default();
        tokio::pin!(shutdown);

        loop {
            let frames = tokio::select! {
                _ = &mut shutdown => break,
                _ = tick(&mut report) => {
                    stats.log();
                    continue;
                }
                received = frontend.recv() => match received {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "frontend recv error");
                        continue;
                    }
                },
            };

            let Some(channel) = channel_of(&frames) else {
                stats.dropped += 1;
                warn!("message without a channel frame, dropped");
                continue;
            };
            match backend.send(frames).await {
                Ok(()) => stats.record(&channel),
                Err(e) => {
                    stats.dropped += 1;
                    warn!(channel = %channel, error = %e, "backend send error");
                }
            }
        }

        stats.log();
        info!("relay stopped");
        Ok(stats)
    }
}

async fn tick(report: &mut Option<Interval>) {
    match report {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

fn channel_of(frames: &ZmqMessage) -> Option<String> {
    if frames.len() < 2 {
        return None;
    }
    frames
        .get(0)
        .map(|frame| String::from_utf8_lossy(frame.as_ref()).into_owned())
        .filter(|channel| !channel.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoints_share_a_prefix() {
        let endpoints = RelayEndpoints::ipc("relay");
        assert_eq!(endpoints, RelayEndpoints::default());
        assert!(endpoints.publishers.endpoint().ends_with("relay-frontend.sock"));
        assert!(endpoints.subscribers.endpoint().ends_with("relay-backend.sock"));
    }

    #[test]
    fn channel_needs_two_frames() {
        let mut frames = ZmqMessage::from("articles:new");
        assert_eq!(channel_of(&frames), None);

        frames.push_back(b"envelope".to_vec().into());
        assert_eq!(channel_of(&frames).as_deref(), Some("articles:new"));
    }

    #[test]
    fn stats_count_per_channel() {
        let mut stats = ChannelStats::default();
        stats.record("errors");
        stats.record("articles:new");
        stats.record("errors");

        assert_eq!(stats.forwarded("errors"), 2);
        assert_eq!(stats.forwarded("articles:updated"), 0);
        assert_eq!(stats.total(), 3);
        assert_eq!(
            stats.channels().collect::<Vec<_>>(),
            vec![("articles:new", 1), ("errors", 2)]
        );
    }

    #[tokio::test]
    async fn stops_on_shutdown_with_empty_stats() {
        let broker = EventBroker::new(RelayEndpoints::tcp("127.0.0.1", 16220, 16221))
            .report_every(Duration::from_millis(20));
        let stats = tokio::time::timeout(
            Duration::from_secs(2),
            broker.run(tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .expect("broker did not stop")
        .unwrap();
        assert_eq!(stats, ChannelStats::default());
    }
}
