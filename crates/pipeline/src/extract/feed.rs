use async_trait::async_trait;
use chrono::Utc;
use collectify_core::{Item, SourceDescriptor};
use tracing::debug;

use super::template::Template;
use super::Extractor;
use crate::error::ExtractError;
use crate::http::HttpClient;

/// RSS / Atom extractor.
///
/// guid is the entry id, falling back to its link. The image comes from
/// an image enclosure or media thumbnail, else from the template's
/// `image` element `fallback`, if the descriptor has one.
pub struct FeedExtractor {
    http: HttpClient,
}

impl FeedExtractor {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Extractor for FeedExtractor {
    async fn extract(&self, source: &SourceDescriptor) -> Result<Vec<Item>, ExtractError> {
        let bytes = self.http.get_bytes(&source.url).await?;
        let feed =
            feed_rs::parser::parse(&bytes[..]).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let fallback = fallback_image(source);
        let items: Vec<Item> = feed
            .entries
            .into_iter()
            .filter_map(|entry| to_item(entry, fallback.as_deref()))
            .collect();

        debug!(source = %source.name, items = items.len(), "feed parsed");
        Ok(items)
    }
}

fn to_item(entry: feed_rs::model::Entry, fallback_image: Option<&str>) -> Option<Item> {
    let url = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

    let guid = if entry.id.trim().is_empty() {
        url.clone()
    } else {
        entry.id.clone()
    };

    let title = entry
        .title
        .as_ref()
        .map(|t| html_escape::decode_html_entities(t.content.trim()).into_owned())
        .filter(|t| !t.is_empty())?;

    let posted = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

    let mut item = Item::new(guid, url, title, posted);
    item.image = image_of(&entry).or_else(|| fallback_image.map(str::to_string));
    Some(item)
}

fn image_of(entry: &feed_rs::model::Entry) -> Option<String> {
    let enclosure = entry.links.iter().find(|l| {
        l.rel.as_deref() == Some("enclosure")
            && l.media_type.as_deref().is_some_and(|t| t.starts_with("image/"))
    });
    if let Some(link) = enclosure {
        return Some(link.href.clone());
    }

    let media_content = entry.media.iter().flat_map(|m| &m.content).find(|c| {
        c.content_type
            .as_ref()
            .is_some_and(|m| m.ty().as_str() == "image")
    });
    if let Some(url) = media_content.and_then(|c| c.url.as_ref()) {
        return Some(url.to_string());
    }

    entry
        .media
        .iter()
        .flat_map(|m| &m.thumbnails)
        .map(|t| t.image.uri.clone())
        .next()
}

/// `template.elements[name = "image"].fallback`
fn fallback_image(source: &SourceDescriptor) -> Option<String> {
    Template::parse(&source.template).ok()?.fallback("image")
}
