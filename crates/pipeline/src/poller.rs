use std::future::ready;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use collectify_core::{SourceDescriptor, Stage, StageError};
use futures::{stream, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

use crate::config::PollConfig;
use crate::error::PipelineError;
use crate::sink::ErrorSink;
use crate::store::SourceFeed;
use crate::stream::BoxStream;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Periodically asks the source feed for active descriptors.
///
/// Fetches never overlap: the next tick is only taken once the previous
/// fetch has settled. A failed fetch is reported and yields nothing for
/// that cycle. Emitted descriptors pass a token bucket so one large batch
/// cannot flood the router.
pub struct Poller {
    feed: Arc<dyn SourceFeed>,
    interval: Duration,
    throttle: Arc<DirectLimiter>,
    errors: ErrorSink,
}

impl Poller {
    pub fn new(
        feed: Arc<dyn SourceFeed>,
        config: &PollConfig,
        errors: ErrorSink,
    ) -> Result<Self, PipelineError> {
        let rate = NonZeroU32::new(config.descriptor_rate)
            .ok_or_else(|| PipelineError::Config("poll.descriptor_rate must be > 0".into()))?;
        let period = config.descriptor_window() / rate.get();
        // No burst: one descriptor per `window / rate`, so no window ever
        // sees more than `rate`.
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                PipelineError::Config("poll.descriptor_window_ms too small for the rate".into())
            })?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            feed,
            interval: config.interval(),
            throttle: Arc::new(RateLimiter::direct(quota)),
            errors,
        })
    }

    /// Endless descriptor stream. Must be called inside a tokio runtime.
    pub fn stream(self) -> BoxStream<SourceDescriptor> {
        let Poller {
            feed,
            interval,
            throttle,
            errors,
        } = self;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let batches = IntervalStream::new(ticker).then(move |_| {
            let feed = feed.clone();
            let errors = errors.clone();
            async move {
                match feed.find_active().await {
                    Ok(batch) => batch,
                    Err(e) => {
                        errors.report(StageError::new(Stage::Poll, e));
                        Vec::new()
                    }
                }
            }
        });

        let descriptors = batches
            .filter(|batch| ready(!batch.is_empty()))
            .flat_map(stream::iter)
            .filter(|source| ready(source.active))
            .then(move |source| {
                let throttle = throttle.clone();
                async move {
                    throttle.until_ready().await;
                    debug!(source = %source.name, kind = %source.kind, stage = "poll", "descriptor");
                    source
                }
            });

        Box::pin(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use collectify_core::SourceKind;

    use super::*;
    use crate::error::StoreError;

    fn source(name: &str, active: bool) -> SourceDescriptor {
        SourceDescriptor {
            active,
            kind: SourceKind::Json,
            name: name.into(),
            url: format!("http://{name}.test"),
            listref: None,
            format: None,
            template: serde_json::Value::Null,
        }
    }

    /// Fails on the first call, then returns its sources. Ignores the
    /// active filter on purpose so the poller's own check is exercised.
    struct FlakyFeed {
        calls: AtomicUsize,
        sources: Vec<SourceDescriptor>,
    }

    #[async_trait]
    impl SourceFeed for FlakyFeed {
        async fn find_active(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Connection("refused".into()));
            }
            Ok(self.sources.clone())
        }
    }

    fn config(rate: u32, window_ms: u64) -> PollConfig {
        PollConfig {
            interval_secs: 1,
            descriptor_rate: rate,
            descriptor_window_ms: window_ms,
        }
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_polling_continues() {
        let feed = Arc::new(FlakyFeed {
            calls: AtomicUsize::new(0),
            sources: vec![source("a", true), source("off", false), source("b", true)],
        });
        let (sink, mut errors) = ErrorSink::channel(8);
        let poller = Poller::new(feed.clone(), &config(100, 1000), sink).unwrap();

        let names: Vec<String> = tokio::time::timeout(
            Duration::from_secs(5),
            poller.stream().take(2).map(|s| s.name).collect(),
        )
        .await
        .expect("poller stalled");

        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(errors.next().await.unwrap().stage, Stage::Poll);
        assert!(feed.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn throttle_spreads_a_large_batch() {
        let feed = Arc::new(FlakyFeed {
            calls: AtomicUsize::new(1),
            sources: (0..6).map(|i| source(&format!("s{i}"), true)).collect(),
        });
        let (sink, _errors) = ErrorSink::channel(8);
        // 2 per 200ms: one every 100ms.
        let poller = Poller::new(feed, &config(2, 200), sink).unwrap();

        let started = Instant::now();
        let got: Vec<_> = tokio::time::timeout(
            Duration::from_secs(5),
            poller.stream().take(6).collect::<Vec<_>>(),
        )
        .await
        .expect("poller stalled");

        assert_eq!(got.len(), 6);
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn one_window_never_exceeds_the_rate() {
        let feed = Arc::new(FlakyFeed {
            calls: AtomicUsize::new(1),
            sources: (0..30).map(|i| source(&format!("s{i}"), true)).collect(),
        });
        let (sink, _errors) = ErrorSink::channel(8);
        let mut stream = Poller::new(feed, &config(10, 1000), sink).unwrap().stream();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(950);
        let mut emitted = 0;
        while let Ok(Some(_)) = tokio::time::timeout_at(deadline, stream.next()).await {
            emitted += 1;
        }

        assert!(emitted <= 10, "{emitted} descriptors in one window");
        assert!(emitted >= 5, "throttle too strict: {emitted}");
    }

    /// Sleeps longer than the poll interval and tracks overlapping calls.
    struct SlowFeed {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFeed for SlowFeed {
        async fn find_active(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1500)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![source(&format!("c{call}"), true)])
        }
    }

    #[tokio::test]
    async fn slow_fetches_never_overlap() {
        let feed = Arc::new(SlowFeed {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let (sink, _errors) = ErrorSink::channel(8);
        // interval 1s, each fetch takes 1.5s
        let poller = Poller::new(feed.clone(), &config(100, 1000), sink).unwrap();

        let names: Vec<String> = tokio::time::timeout(
            Duration::from_secs(10),
            poller.stream().take(3).map(|s| s.name).collect(),
        )
        .await
        .expect("poller stalled");

        assert_eq!(names, vec!["c0", "c1", "c2"]);
        assert_eq!(feed.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let (sink, _errors) = ErrorSink::channel(1);
        let feed = Arc::new(FlakyFeed {
            calls: AtomicUsize::new(0),
            sources: Vec::new(),
        });
        assert!(Poller::new(feed, &config(0, 1000), sink).is_err());
    }
}
