use std::collections::HashSet;

use super::types::PipelineConfig;
use crate::error::PipelineError;

impl PipelineConfig {
    /// Reject configs that would stall or misroute the pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.validate_rates()?;
        self.validate_concurrency()?;
        self.validate_channels()?;
        self.validate_update_fields()?;
        self.validate_networks()?;
        Ok(())
    }

    fn validate_rates(&self) -> Result<(), PipelineError> {
        if self.poll.interval_secs == 0 {
            return Err(config_err("poll.interval_secs must be > 0"));
        }
        if self.poll.descriptor_rate == 0 || self.poll.descriptor_window_ms == 0 {
            return Err(config_err(
                "poll.descriptor_rate and poll.descriptor_window_ms must be > 0",
            ));
        }
        // A zero timeout fails every request at once.
        if self.extract.timeout_secs == 0 {
            return Err(config_err("extract.timeout_secs must be > 0"));
        }
        if self.http.timeout_secs == 0 {
            return Err(config_err("http.timeout_secs must be > 0"));
        }
        if self.store.entry_ttl_secs <= 0 {
            return Err(config_err("store.entry_ttl_secs must be > 0"));
        }
        Ok(())
    }

    fn validate_concurrency(&self) -> Result<(), PipelineError> {
        let caps = [
            ("extract.concurrency", self.extract.concurrency),
            ("dedup.concurrency", self.dedup.concurrency),
            ("enrich.share_concurrency", self.enrich.share_concurrency),
            ("enrich.content_concurrency", self.enrich.content_concurrency),
            ("write.concurrency", self.write.concurrency),
            ("http.max_connections", self.http.max_connections),
            ("channels.buffer", self.channels.buffer),
        ];
        for (name, value) in caps {
            if value == 0 {
                return Err(config_err(&format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    fn validate_channels(&self) -> Result<(), PipelineError> {
        let mut names = vec![
            &self.channels.created,
            &self.channels.updated,
            &self.channels.errors,
        ];
        if let Some(backfilled) = &self.channels.backfilled {
            names.push(backfilled);
        }

        let mut seen = HashSet::new();
        for name in names {
            if name.trim().is_empty() {
                return Err(config_err("channel names must not be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(config_err(&format!("channel '{name}' is used twice")));
            }
        }
        Ok(())
    }

    fn validate_update_fields(&self) -> Result<(), PipelineError> {
        if self.write.update_fields.is_empty() {
            return Err(config_err("write.update_fields must not be empty"));
        }
        Ok(())
    }

    /// Every configured network needs an endpoint to query.
    fn validate_networks(&self) -> Result<(), PipelineError> {
        for network in &self.enrich.networks {
            if !self.enrich.share_endpoints.contains_key(network) {
                return Err(config_err(&format!(
                    "network '{network}' has no entry in enrich.share_endpoints"
                )));
            }
        }
        Ok(())
    }
}

fn config_err(msg: &str) -> PipelineError {
    PipelineError::Config(msg.to_string())
}
