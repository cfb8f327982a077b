//! Well-known output channel names.
//!
//! Channels are plain strings so deployments can rename them in config;
//! these are the defaults downstream consumers subscribe to.

/// Newly persisted entries.
pub const ARTICLES_NEW: &str = "articles:new";

/// Entries refreshed by a re-sighting.
pub const ARTICLES_UPDATED: &str = "articles:updated";

/// Entries whose missing content was filled in after an update.
pub const ARTICLES_BACKFILLED: &str = "articles:backfilled";

/// Stage errors from anywhere in the pipeline.
pub const ERRORS: &str = "errors";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_channels_share_prefix() {
        assert!(ARTICLES_NEW.starts_with("articles:"));
        assert!(ARTICLES_UPDATED.starts_with("articles:"));
        assert!(ARTICLES_BACKFILLED.starts_with("articles:"));
        assert!(!ERRORS.starts_with("articles:"));
    }
}
