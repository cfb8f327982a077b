use std::path::Path;

use collectify_core::config::{
    apply_override, apply_override_list, apply_override_opt, env_opt,
};

use super::types::PipelineConfig;
use crate::error::PipelineError;

impl PipelineConfig {
    /// Parse, apply environment overrides, validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::from_toml("")
        }
    }

    /// Postgres URL from config or `DATABASE_URL`.
    pub fn database_url(&self) -> Option<String> {
        self.store
            .database_url
            .clone()
            .or_else(|| env_opt("DATABASE_URL"))
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Convention: `COLLECTIFY_SECTION_KEY` overrides `section.key`, e.g.
    /// - `COLLECTIFY_POLL_INTERVAL_SECS` -> `poll.interval_secs`
    /// - `COLLECTIFY_CHANNELS_CREATED` -> `channels.created`
    /// - `COLLECTIFY_STORE_DATABASE_URL` -> `store.database_url`
    /// - `COLLECTIFY_ENRICH_NETWORKS=facebook,twitter` -> `enrich.networks`
    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), PipelineError> {
        apply_override(&mut self.poll.interval_secs, "poll", "interval_secs")?;
        apply_override(&mut self.poll.descriptor_rate, "poll", "descriptor_rate")?;
        apply_override(&mut self.poll.descriptor_window_ms, "poll", "descriptor_window_ms")?;

        apply_override(&mut self.extract.concurrency, "extract", "concurrency")?;
        apply_override(&mut self.extract.timeout_secs, "extract", "timeout_secs")?;

        apply_override(&mut self.dedup.concurrency, "dedup", "concurrency")?;

        apply_override(&mut self.enrich.share_concurrency, "enrich", "share_concurrency")?;
        apply_override(&mut self.enrich.content_concurrency, "enrich", "content_concurrency")?;
        apply_override(&mut self.enrich.keyword_limit, "enrich", "keyword_limit")?;
        apply_override_list(&mut self.enrich.networks, "enrich", "networks")?;
        apply_override(&mut self.enrich.content_backfill, "enrich", "content_backfill")?;

        apply_override(&mut self.write.concurrency, "write", "concurrency")?;
        apply_override_list(&mut self.write.update_fields, "write", "update_fields")?;

        apply_override_opt(&mut self.store.database_url, "store", "database_url")?;
        apply_override(&mut self.store.max_connections, "store", "max_connections")?;
        apply_override(&mut self.store.entry_ttl_secs, "store", "entry_ttl_secs")?;
        apply_override(&mut self.store.purge_interval_secs, "store", "purge_interval_secs")?;

        apply_override(&mut self.http.max_connections, "http", "max_connections")?;
        apply_override(&mut self.http.timeout_secs, "http", "timeout_secs")?;
        apply_override(&mut self.http.user_agent, "http", "user_agent")?;

        apply_override(&mut self.channels.created, "channels", "created")?;
        apply_override(&mut self.channels.updated, "channels", "updated")?;
        apply_override(&mut self.channels.errors, "channels", "errors")?;
        apply_override_opt(&mut self.channels.backfilled, "channels", "backfilled")?;
        apply_override(&mut self.channels.buffer, "channels", "buffer")?;

        apply_override(&mut self.relay.frontend, "relay", "frontend")?;
        apply_override(&mut self.relay.bind, "relay", "bind")?;
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  poll:      every {}s, {} descriptors / {}ms",
            self.poll.interval_secs,
            self.poll.descriptor_rate,
            self.poll.descriptor_window_ms
        );
        tracing::info!(
            "  extract:   concurrency={}, timeout={}s",
            self.extract.concurrency,
            self.extract.timeout_secs
        );
        tracing::info!(
            "  enrich:    networks={:?}, new={:?}, existing={:?}, backfill={}",
            self.enrich.networks,
            self.enrich.new,
            self.enrich.existing,
            self.enrich.content_backfill
        );
        tracing::info!(
            "  store:     postgres={}, ttl={}s",
            if self.database_url().is_some() { "configured" } else { "(none)" },
            self.store.entry_ttl_secs
        );
        tracing::info!(
            "  channels:  created={}, updated={}, errors={}",
            self.channels.created,
            self.channels.updated,
            self.channels.errors
        );
        tracing::info!("  relay:     {} (bind={})", self.relay.frontend, self.relay.bind);
    }
}
