use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which extractor a source is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON API endpoint.
    Json,
    /// RSS / Atom feed.
    Feed,
    /// Plain HTML page.
    Site,
}

impl SourceKind {
    /// Every kind, in routing order.
    pub const ALL: [SourceKind; 3] = [SourceKind::Json, SourceKind::Feed, SourceKind::Site];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Json => "json",
            SourceKind::Feed => "feed",
            SourceKind::Site => "site",
        }
    }

    /// Position of this kind in [`SourceKind::ALL`].
    pub fn index(&self) -> usize {
        match self {
            SourceKind::Json => 0,
            SourceKind::Feed => 1,
            SourceKind::Site => 2,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SourceKind::Json),
            "feed" | "rss" => Ok(SourceKind::Feed),
            "site" | "html" => Ok(SourceKind::Site),
            other => Err(CoreError::UnknownSourceKind(other.to_string())),
        }
    }
}

/// Describes one external source and how to extract items from it.
///
/// Maintained by an admin process; the pipeline only reads descriptors.
/// The extraction template is opaque here and handed to the extractor as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    pub url: String,
    /// Key of the item list inside a JSON response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listref: Option<String>,
    /// Page variant hint for site extractors (e.g. "desktop").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub template: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("RSS".parse::<SourceKind>().unwrap(), SourceKind::Feed);
        assert_eq!("html".parse::<SourceKind>().unwrap(), SourceKind::Site);
        assert_eq!(" json ".parse::<SourceKind>().unwrap(), SourceKind::Json);
        assert!("xml".parse::<SourceKind>().is_err());
    }

    #[test]
    fn kind_index_matches_all() {
        for (i, kind) in SourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn descriptor_reads_type_field() {
        let raw = r#"{
            "active": true,
            "type": "feed",
            "name": "TheWireCutter",
            "url": "http://feeds.feedburner.com/TheWirecutter",
            "template": { "elements": [] }
        }"#;
        let d: SourceDescriptor = serde_json::from_str(raw).unwrap();
        assert!(d.active);
        assert_eq!(d.kind, SourceKind::Feed);
        assert!(d.listref.is_none());
    }

    #[test]
    fn descriptor_defaults_to_inactive() {
        let raw = r#"{ "type": "site", "name": "x", "url": "http://x" }"#;
        let d: SourceDescriptor = serde_json::from_str(raw).unwrap();
        assert!(!d.active);
        assert!(d.template.is_null());
    }
}
