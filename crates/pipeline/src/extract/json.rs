use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collectify_core::{Item, SourceDescriptor};
use serde_json::Value;
use tracing::debug;

use super::template::{select, Template};
use super::Extractor;
use crate::error::ExtractError;
use crate::http::HttpClient;

/// JSON endpoint extractor.
///
/// The record list sits at the descriptor's `listref` path (or is the
/// document itself); each record is mapped through the template. Records
/// missing a `required` element are skipped. `posted` falls back to now
/// when the template has no usable date.
pub struct JsonExtractor {
    http: HttpClient,
}

impl JsonExtractor {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Extractor for JsonExtractor {
    async fn extract(&self, source: &SourceDescriptor) -> Result<Vec<Item>, ExtractError> {
        let template = Template::parse(&source.template)?;
        let document = self.http.get_json(&source.url).await?;
        let items = map_records(&document, source.listref.as_deref(), &template)?;
        debug!(source = %source.name, items = items.len(), "json mapped");
        Ok(items)
    }
}

fn map_records(
    document: &Value,
    listref: Option<&str>,
    template: &Template,
) -> Result<Vec<Item>, ExtractError> {
    let list = match listref {
        Some(path) => select(document, path)
            .ok_or_else(|| ExtractError::Parse(format!("listref '{path}' not found")))?,
        None => document,
    };
    let records = list
        .as_array()
        .ok_or_else(|| ExtractError::Parse("record list is not an array".into()))?;

    Ok(records
        .iter()
        .filter_map(|record| to_item(record, template))
        .collect())
}

fn to_item(record: &Value, template: &Template) -> Option<Item> {
    let mut fields = HashMap::new();
    for element in &template.elements {
        match element.resolve(record) {
            Some(value) => {
                fields.insert(element.name.as_str(), value);
            }
            None if element.required => {
                debug!(element = %element.name, "record skipped, required element missing");
                return None;
            }
            None => {}
        }
    }

    let url = fields.remove("url")?;
    let guid = fields.remove("guid").unwrap_or_else(|| url.clone());
    let title = fields.remove("title")?;
    let posted = fields
        .remove("posted")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map_or_else(Utc::now, |d| d.with_timezone(&Utc));

    let mut item = Item::new(guid, url, title, posted);
    item.image = fields.remove("image");
    item.content = fields.remove("content");
    Some(item)
}
