use std::collections::BTreeMap;
use std::time::Duration;

use collectify_core::UpdateField;
use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full collector configuration.
///
/// Parsed from `collectify.toml`; every section and field has a default,
/// so an empty file is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub enrich: EnrichConfig,

    #[serde(default)]
    pub write: WriteConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

// ── Section configs ─────────────────────────────────────────────────

/// Source polling cadence and the descriptor throughput cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Minimum time between two source fetches.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Descriptors let through per window.
    #[serde(default = "default_descriptor_rate")]
    pub descriptor_rate: u32,

    #[serde(default = "default_descriptor_window")]
    pub descriptor_window_ms: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_descriptor_rate() -> u32 {
    10
}

fn default_descriptor_window() -> u64 {
    1000
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn descriptor_window(&self) -> Duration {
        Duration::from_millis(self.descriptor_window_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            descriptor_rate: default_descriptor_rate(),
            descriptor_window_ms: default_descriptor_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Concurrent extractions per source kind.
    #[serde(default = "default_extract_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_extract_concurrency() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

impl ExtractConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            concurrency: default_extract_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Outstanding existence lookups per sub-stream.
    #[serde(default = "default_ten")]
    pub concurrency: usize,
}

fn default_ten() -> usize {
    10
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            concurrency: default_ten(),
        }
    }
}

/// Which enrichment steps run on a sub-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichPlan {
    #[serde(default)]
    pub timestamp: bool,
    #[serde(default)]
    pub shares: bool,
    #[serde(default)]
    pub content: bool,
    #[serde(default)]
    pub keywords: bool,
}

impl EnrichPlan {
    /// Refresh the timestamp and fetch share counts.
    pub fn refresh() -> Self {
        Self {
            timestamp: true,
            shares: true,
            ..Default::default()
        }
    }

    /// Fill in missing content and derive keywords from it.
    pub fn backfill() -> Self {
        Self {
            content: true,
            keywords: true,
            ..Default::default()
        }
    }
}

/// How to read one network's share count for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEndpoint {
    /// Request URL; `{url}` is replaced with the percent-encoded page URL.
    pub url: String,
    /// JSON pointer to the count inside the response body.
    pub pointer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default = "default_ten")]
    pub share_concurrency: usize,

    #[serde(default = "default_ten")]
    pub content_concurrency: usize,

    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,

    #[serde(default = "default_networks")]
    pub networks: Vec<String>,

    #[serde(default = "default_share_endpoints")]
    pub share_endpoints: BTreeMap<String, ShareEndpoint>,

    /// Plan for items seen for the first time.
    #[serde(default)]
    pub new: EnrichPlan,

    /// Plan for items already in the store.
    #[serde(default = "EnrichPlan::refresh")]
    pub existing: EnrichPlan,

    /// Fill in content for updated entries that have none.
    #[serde(default = "default_true")]
    pub content_backfill: bool,
}

fn default_keyword_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_networks() -> Vec<String> {
    vec!["facebook".into(), "twitter".into(), "linkedin".into()]
}

fn default_share_endpoints() -> BTreeMap<String, ShareEndpoint> {
    BTreeMap::from([
        (
            "facebook".to_string(),
            ShareEndpoint {
                url: "https://graph.facebook.com/?id={url}&fields=engagement".into(),
                pointer: "/engagement/share_count".into(),
            },
        ),
        (
            "twitter".to_string(),
            ShareEndpoint {
                url: "https://opensharecount.com/count.json?url={url}".into(),
                pointer: "/count".into(),
            },
        ),
        (
            "linkedin".to_string(),
            ShareEndpoint {
                url: "https://www.linkedin.com/countserv/count/share?url={url}&format=json".into(),
                pointer: "/count".into(),
            },
        ),
    ])
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            share_concurrency: default_ten(),
            content_concurrency: default_ten(),
            keyword_limit: default_keyword_limit(),
            networks: default_networks(),
            share_endpoints: default_share_endpoints(),
            new: EnrichPlan::default(),
            existing: EnrichPlan::refresh(),
            content_backfill: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Ceiling on outstanding creates or updates.
    #[serde(default = "default_write_concurrency")]
    pub concurrency: usize,

    /// Fields an update may touch; everything else on the item is ignored.
    #[serde(default = "UpdateField::defaults")]
    pub update_fields: Vec<UpdateField>,
}

fn default_write_concurrency() -> usize {
    1000
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            concurrency: default_write_concurrency(),
            update_fields: UpdateField::defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Postgres URL; falls back to `DATABASE_URL` when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Entries expire this long after `created_at` was last set.
    #[serde(default = "default_entry_ttl")]
    pub entry_ttl_secs: i64,

    /// How often expired rows are deleted.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_entry_ttl() -> i64 {
    collectify_core::DEFAULT_ENTRY_TTL_SECS
}

fn default_purge_interval() -> u64 {
    60
}

impl StoreConfig {
    pub fn entry_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.entry_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            entry_ttl_secs: default_entry_ttl(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Global cap on simultaneous outbound requests.
    #[serde(default = "default_http_connections")]
    pub max_connections: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_connections() -> usize {
    50
}

fn default_user_agent() -> String {
    concat!("collectify/", env!("CARGO_PKG_VERSION")).into()
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_connections: default_http_connections(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Output channel names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_created")]
    pub created: String,

    #[serde(default = "default_updated")]
    pub updated: String,

    #[serde(default = "default_errors")]
    pub errors: String,

    /// Publish backfilled entries here; they are only logged when unset.
    #[serde(default)]
    pub backfilled: Option<String>,

    /// Per-channel queue in front of the publisher.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

fn default_created() -> String {
    collectify_relay::channels::ARTICLES_NEW.into()
}

fn default_updated() -> String {
    collectify_relay::channels::ARTICLES_UPDATED.into()
}

fn default_errors() -> String {
    collectify_relay::channels::ERRORS.into()
}

fn default_buffer() -> usize {
    1024
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            created: default_created(),
            updated: default_updated(),
            errors: default_errors(),
            backfilled: None,
            buffer: default_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Broker frontend, or our own endpoint when `bind` is set.
    #[serde(default = "default_frontend")]
    pub frontend: String,

    /// Bind the endpoint instead of connecting (no broker).
    #[serde(default)]
    pub bind: bool,
}

fn default_frontend() -> String {
    "ipc:///tmp/collectify/relay-frontend.sock".into()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            frontend: default_frontend(),
            bind: false,
        }
    }
}
