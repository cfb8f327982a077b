use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ShareEndpoint;
use crate::error::FetchError;
use crate::http::HttpClient;

/// Looks up how often a page was shared on one network.
#[async_trait]
pub trait ShareCounter: Send + Sync {
    async fn count(&self, network: &str, url: &str) -> Result<u64, FetchError>;
}

/// [`ShareCounter`] backed by public count endpoints.
pub struct HttpShareCounter {
    http: HttpClient,
    endpoints: BTreeMap<String, ShareEndpoint>,
}

impl HttpShareCounter {
    pub fn new(http: HttpClient, endpoints: BTreeMap<String, ShareEndpoint>) -> Self {
        Self { http, endpoints }
    }

    fn request_url(endpoint: &ShareEndpoint, page: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(page.as_bytes()).collect();
        endpoint.url.replace("{url}", &encoded)
    }
}

#[async_trait]
impl ShareCounter for HttpShareCounter {
    async fn count(&self, network: &str, url: &str) -> Result<u64, FetchError> {
        let endpoint = self
            .endpoints
            .get(network)
            .ok_or_else(|| FetchError::Decode(format!("no endpoint for network '{network}'")))?;

        let body = self.http.get_json(&Self::request_url(endpoint, url)).await?;
        body.pointer(&endpoint.pointer)
            .and_then(as_count)
            .ok_or_else(|| FetchError::Decode(format!("{network}: no count at {}", endpoint.pointer)))
    }
}

/// Counts come back as numbers or numeric strings depending on the network.
fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
