use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::EntryView;

/// Share counts keyed by network name ("facebook", "twitter", ...).
pub type Shares = BTreeMap<String, u64>;

/// A candidate article produced by an extractor.
///
/// Items are transient pipeline values; they only become [`Entry`](crate::Entry) records
/// once the writer persists them. Enrichment targets are optional so each
/// step can check presence before deriving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable unique key across sightings.
    pub guid: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Shares>,
    pub posted: DateTime<Utc>,
    /// Set by the timestamp refresh; becomes the entry's `createdAt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Minimal item with only the required fields set.
    pub fn new(
        guid: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        posted: DateTime<Utc>,
    ) -> Self {
        Self {
            guid: guid.into(),
            url: url.into(),
            title: title.into(),
            image: None,
            content: None,
            keywords: None,
            shares: None,
            posted,
            created_at: None,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    pub fn has_keywords(&self) -> bool {
        self.keywords.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub fn has_shares(&self) -> bool {
        self.shares.as_ref().is_some_and(|s| !s.is_empty())
    }
}

impl From<EntryView> for Item {
    fn from(view: EntryView) -> Self {
        Self {
            guid: view.guid,
            url: view.url,
            title: view.title,
            image: view.image,
            content: view.content,
            keywords: view.keywords,
            shares: view.shares,
            posted: view.posted,
            created_at: Some(view.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_checks_ignore_empty_values() {
        let mut item = Item::new("a", "http://x", "T", Utc::now());
        assert!(!item.has_content());

        item.content = Some("   ".into());
        assert!(!item.has_content());

        item.content = Some("body".into());
        assert!(item.has_content());

        item.keywords = Some(vec![]);
        assert!(!item.has_keywords());

        item.shares = Some(Shares::new());
        assert!(!item.has_shares());
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let mut item = Item::new("a", "http://x", "T", Utc::now());
        item.created_at = Some(Utc::now());
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("content").is_none());
        assert!(json.get("shares").is_none());
    }
}
