use async_trait::async_trait;

use crate::error::FetchError;
use crate::http::HttpClient;

/// Line width handed to the HTML renderer; lines are joined afterwards.
const TEXT_WIDTH: usize = 120;

/// Fetches the readable body of a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Render an HTML document to plain text on a single line.
pub fn page_text(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_default();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`ContentFetcher`] over the shared HTTP client.
pub struct HttpContentFetcher {
    http: HttpClient,
}

impl HttpContentFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let page = self.http.get_text(url).await?;
        let text = page_text(&page);
        if text.is_empty() {
            return Err(FetchError::Decode(format!("{url}: no readable text")));
        }
        Ok(text)
    }
}
