use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::config::HttpConfig;
use crate::error::FetchError;

/// Shared HTTP client with a global cap on simultaneous requests.
///
/// Cloning is cheap; every clone shares the same connection pool and the
/// same permit budget, so enrichment stages and extractors together never
/// exceed `max_connections` in-flight requests.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl HttpClient {
    #[instrument(skip_all, fields(max_connections = config.max_connections))]
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.max_connections)
            .build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            timeout: config.timeout(),
        })
    }

    /// Permits not currently held by a request.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// GET `url` and return the body. Non-2xx answers are errors.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| self.classify(e))?;
        debug!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(e)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::serve;
    use super::*;

    fn client(max: usize) -> HttpClient {
        HttpClient::new(&HttpConfig {
            max_connections: max,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn get_json_reads_body() {
        let server = serve(200, "application/json", r#"{"count": 7}"#.into()).await;
        let value = client(2).get_json(&server.base).await.unwrap();
        assert_eq!(value["count"], 7);
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = serve(404, "text/plain", "nope".into()).await;
        let err = client(2).get_text(&server.base).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn garbage_json_is_a_decode_error() {
        let server = serve(200, "application/json", "not json".into()).await;
        let err = client(2).get_json(&server.base).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn permits_are_returned_after_each_request() {
        let server = serve(200, "text/plain", "ok".into()).await;
        let http = client(3);
        for _ in 0..5 {
            http.get_text(&server.base).await.unwrap();
        }
        assert_eq!(http.available(), 3);
    }
}
