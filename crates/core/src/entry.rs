use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::item::{Item, Shares};

/// How long an entry lives after its `created_at` was last set, in seconds.
pub const DEFAULT_ENTRY_TTL_SECS: i64 = 86_400;

/// Persisted form of an [`Item`] plus store bookkeeping.
///
/// `id` and `version` are internal to the store and never leave the
/// process; use [`Entry::view`] for anything published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub version: i32,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub image: Option<String>,
    pub content: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub shares: Option<Shares>,
    pub posted: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Whether this entry has outlived `ttl` as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.created_at + ttl <= now
    }

    /// Serializable view with internal identifiers stripped.
    pub fn view(&self) -> EntryView {
        EntryView {
            guid: self.guid.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            image: self.image.clone(),
            content: self.content.clone(),
            keywords: self.keywords.clone(),
            shares: self.shares.clone(),
            posted: self.posted,
            created_at: self.created_at,
        }
    }
}

/// Wire shape of an entry on the output channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
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
    pub created_at: DateTime<Utc>,
}

/// Entry fields the writer may touch on an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateField {
    CreatedAt,
    Title,
    Image,
    Content,
    Keywords,
    Shares,
}

impl UpdateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateField::CreatedAt => "created_at",
            UpdateField::Title => "title",
            UpdateField::Image => "image",
            UpdateField::Content => "content",
            UpdateField::Keywords => "keywords",
            UpdateField::Shares => "shares",
        }
    }

    /// The allow-list used when a deployment does not configure one.
    pub fn defaults() -> Vec<UpdateField> {
        vec![
            UpdateField::CreatedAt,
            UpdateField::Shares,
            UpdateField::Content,
            UpdateField::Keywords,
        ]
    }
}

impl fmt::Display for UpdateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "created_at" | "createdAt" => Ok(UpdateField::CreatedAt),
            "title" => Ok(UpdateField::Title),
            "image" => Ok(UpdateField::Image),
            "content" => Ok(UpdateField::Content),
            "keywords" => Ok(UpdateField::Keywords),
            "shares" => Ok(UpdateField::Shares),
            other => Err(CoreError::UnknownField(other.to_string())),
        }
    }
}

/// A conditional update keyed by guid.
///
/// Only fields that are both allow-listed and present on the item are
/// `Some`; everything else is left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    pub guid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub image: Option<String>,
    pub content: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub shares: Option<Shares>,
}

impl EntryPatch {
    /// Pick the allow-listed fields off an item.
    pub fn from_item(item: &Item, allowed: &[UpdateField]) -> Self {
        let mut patch = EntryPatch {
            guid: item.guid.clone(),
            ..Default::default()
        };
        for field in allowed {
            match field {
                UpdateField::CreatedAt => patch.created_at = item.created_at,
                UpdateField::Title => patch.title = Some(item.title.clone()),
                UpdateField::Image => patch.image = item.image.clone(),
                UpdateField::Content => patch.content = item.content.clone(),
                UpdateField::Keywords => patch.keywords = item.keywords.clone(),
                UpdateField::Shares => patch.shares = item.shares.clone(),
            }
        }
        patch
    }

    /// True when the patch sets nothing beyond the guid.
    pub fn is_empty(&self) -> bool {
        self.created_at.is_none()
            && self.title.is_none()
            && self.image.is_none()
            && self.content.is_none()
            && self.keywords.is_none()
            && self.shares.is_none()
    }

    /// Names of the fields this patch sets.
    pub fn fields(&self) -> Vec<UpdateField> {
        let mut out = Vec::new();
        if self.created_at.is_some() {
            out.push(UpdateField::CreatedAt);
        }
        if self.title.is_some() {
            out.push(UpdateField::Title);
        }
        if self.image.is_some() {
            out.push(UpdateField::Image);
        }
        if self.content.is_some() {
            out.push(UpdateField::Content);
        }
        if self.keywords.is_some() {
            out.push(UpdateField::Keywords);
        }
        if self.shares.is_some() {
            out.push(UpdateField::Shares);
        }
        out
    }

    /// Apply this patch to an entry in place.
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(ts) = self.created_at {
            entry.created_at = ts;
        }
        if let Some(title) = &self.title {
            entry.title = title.clone();
        }
        if let Some(image) = &self.image {
            entry.image = Some(image.clone());
        }
        if let Some(content) = &self.content {
            entry.content = Some(content.clone());
        }
        if let Some(keywords) = &self.keywords {
            entry.keywords = Some(keywords.clone());
        }
        if let Some(shares) = &self.shares {
            entry.shares = Some(shares.clone());
        }
        entry.version += 1;
    }
}
