use anyhow::{Context, Result};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;

/// Fetch options shared by every outbound feed request
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
    /// First retry delay; doubled on every further attempt
    pub backoff_base: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_retries: 3,
            user_agent: common::DEFAULT_USER_AGENT.to_string(),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Fetches a feed from the given URL and parses it.
/// Server errors, rate limiting and network failures are retried with exponential backoff;
/// other client errors are returned immediately.
pub async fn fetch_and_parse_feed(url: &str, opts: &FetchOptions) -> Result<Feed> {
    let client = Client::builder()
        .timeout(Duration::from_secs(opts.timeout_secs))
        .user_agent(opts.user_agent.as_str())
        .build()
        .context("failed to build reqwest client")?;

    let max_retries = opts.max_retries.max(1);
    let mut last_error = None;

    for attempt in 1..=max_retries {
        if attempt > 1 {
            let backoff = opts.backoff_base * 2u32.pow(attempt - 2); // 1s, 2s, 4s...
            tracing::info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, max_retries, backoff);
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                    return Ok(feed);
                } else if status.is_server_error() {
                    last_error = Some(anyhow::anyhow!("server error: {}", status));
                    continue;
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                    continue;
                } else {
                    // Client error (4xx) - likely permanent, don't retry
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

pub fn entry_title(entry: &Entry) -> String {
    entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default()
}

/// First link of the entry, the canonical URL used for deduplication.
pub fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Body carried by the feed itself (full content, else summary).
pub fn entry_body(entry: &Entry) -> String {
    entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>T</title><link>https://x</link><description>d</description>
<item><title> First </title><link>https://x/1</link><description>Summary one</description></item>
<item><title>No link</title><description>Summary two</description></item>
</channel></rss>"#;

    #[test]
    fn entry_helpers_read_title_link_and_summary() {
        let feed = parser::parse(RSS.as_bytes()).expect("parse rss");
        let first = &feed.entries[0];
        assert_eq!(entry_title(first), "First");
        assert_eq!(entry_link(first).as_deref(), Some("https://x/1"));
        assert_eq!(entry_body(first), "Summary one");
        assert!(entry_link(&feed.entries[1]).is_none());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let opts = FetchOptions {
            backoff_base: Duration::from_millis(1),
            ..FetchOptions::default()
        };
        let result = fetch_and_parse_feed(&format!("{}/feed", server.url()), &opts).await;
        assert!(result.unwrap_err().to_string().contains("404"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let opts = FetchOptions {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
            ..FetchOptions::default()
        };
        let result = fetch_and_parse_feed(&format!("{}/feed", server.url()), &opts).await;
        assert!(result.unwrap_err().to_string().contains("server error"));
        mock.assert_async().await;
    }
}
