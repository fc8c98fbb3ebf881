use anyhow::{Context, Result};
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;
use tracing::{info, warn};

/// Fetches a web page and returns its readable text.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// `PageFetcher` backed by reqwest + readability.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        scrape_article_content(&self.client, url).await
    }
}

/// Scrapes the content of an article from the given URL.
/// Returns the extracted text content, or an empty string when no article body was found.
pub async fn scrape_article_content(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await.context("failed to fetch article page")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("article fetch failed with status: {}", status));
    }

    // Readability requires a Reader, so we fetch bytes
    let bytes = response.bytes().await.context("failed to read response body")?;
    let mut reader = Cursor::new(bytes);

    // Readability resolves relative links against the page URL
    let url_obj = url::Url::parse(url).context("failed to parse article URL")?;

    match readability::extractor::extract(&mut reader, &url_obj) {
        Ok(product) => {
            let html = product.content;
            match html2text::from_read(html.as_bytes(), 80) {
                Ok(text) => {
                    info!("scraping: readability extracted {} chars from {}", text.len(), url);
                    Ok(text)
                }
                Err(e) => {
                    warn!("scraping: failed to convert extracted HTML to text: {}", e);
                    Ok(product.text)
                }
            }
        }
        Err(e) => {
            warn!("scraping: readability failed for {}: {}", url, e);
            Ok(String::new())
        }
    }
}

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First `max_chars` characters of `s`.
pub fn take_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
        // 'é' is two bytes; cutting in the middle backs off
        assert_eq!(truncate_utf8("café", 4), "caf");
        assert_eq!(take_chars("café au lait", 4), "café");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/gone").with_status(410).create_async().await;

        let fetcher = HttpPageFetcher::new(5, "test-agent").expect("client");
        let result = fetcher.fetch_text(&format!("{}/gone", server.url())).await;
        assert!(result.unwrap_err().to_string().contains("410"));
    }
}
