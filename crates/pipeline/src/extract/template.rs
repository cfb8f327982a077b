//! Extraction templates carried by source descriptors.
//!
//! ```json
//! { "elements": [
//!     { "name": "guid", "type": "url", "required": true, "items": [{ "selector": "link" }] },
//!     { "name": "image", "items": [{ "selector": "images[1].src" }], "fallback": "http://..." }
//! ] }
//! ```
//!
//! Each element names an item field and lists selectors tried in order;
//! the first one that yields a usable value wins, then `fallback`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ExtractError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Element {
    pub name: String,
    /// `url` values must parse as absolute URLs.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub items: Vec<Selector>,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Selector {
    pub selector: String,
    /// Decode HTML entities in the selected text.
    #[serde(default)]
    pub decode: bool,
}

impl Template {
    /// A missing or `null` template is an empty one.
    pub fn parse(raw: &Value) -> Result<Self, ExtractError> {
        if raw.is_null() {
            return Ok(Self::default());
        }
        Template::deserialize(raw).map_err(|e| ExtractError::Parse(format!("template: {e}")))
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|el| el.name == name)
    }

    pub fn fallback(&self, name: &str) -> Option<String> {
        self.element(name)?.fallback.clone()
    }
}

impl Element {
    /// First usable selector value from `record`, else the fallback.
    pub fn resolve(&self, record: &Value) -> Option<String> {
        self.items
            .iter()
            .filter_map(|sel| {
                let text = as_text(select(record, &sel.selector)?)?;
                let text = if sel.decode {
                    html_escape::decode_html_entities(&text).into_owned()
                } else {
                    text
                };
                Some(text.trim().to_string())
            })
            .find(|text| self.accepts(text))
            .or_else(|| self.fallback.clone())
    }

    fn accepts(&self, text: &str) -> bool {
        match self.kind.as_deref() {
            _ if text.is_empty() => false,
            Some("url") => url::Url::parse(text).is_ok(),
            _ => true,
        }
    }
}

/// Walk a dotted path with optional indexes, e.g. `data.items[0].title`.
pub fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indexes) = match segment.find('[') {
            Some(at) => segment.split_at(at),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        for index in indexes.split('[').filter(|s| !s.is_empty()) {
            let index: usize = index.strip_suffix(']')?.parse().ok()?;
            current = current.get(index)?;
        }
    }
    Some(current)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
