use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A single keyword-search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Keyword web search returning the top `limit` hits.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Search against the DuckDuckGo HTML endpoint (no API key required).
pub struct DuckDuckGoSearch {
    endpoint: String,
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("search failed with status: {}", status));
        }

        let html = response.text().await.context("failed to read search response")?;
        let hits = parse_results(&html, limit)?;
        debug!("search '{}' returned {} hits", query, hits.len());
        Ok(hits)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

/// Parse a DuckDuckGo HTML result page.
pub fn parse_results(html: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let document = Html::parse_document(html);
    let result_sel = selector(".result")?;
    let title_sel = selector(".result__title")?;
    let link_sel = selector("a.result__a, .result__url")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        if hits.len() >= limit {
            break;
        }
        let Some(title_el) = result.select(&title_sel).next() else { continue };
        let Some(href) = result
            .select(&link_sel)
            .find_map(|el| el.value().attr("href"))
        else {
            continue;
        };

        let title = collapse_whitespace(&title_el.text().collect::<String>());
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        hits.push(SearchHit {
            title,
            url: resolve_redirect(href),
            snippet,
        });
    }
    Ok(hits)
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded target>`.
pub fn resolve_redirect(href: &str) -> String {
    if !href.contains("uddg=") {
        return href.to_string();
    }
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };
    url::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| href.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="result">
  <h2 class="result__title"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fnews%3Fid%3D1&amp;rut=abc">Example   News</a></h2>
  <a class="result__snippet">A snippet about the launch.</a>
</div>
<div class="result">
  <h2 class="result__title"><a class="result__a" href="https://direct.example.org/page">Direct</a></h2>
</div>
<div class="result">
  <h2 class="result__title"><a class="result__a" href="https://third.example.org/">Third</a></h2>
</div>
</body></html>"#;

    #[test]
    fn parses_titles_links_and_snippets() {
        let hits = parse_results(PAGE, 10).expect("parse");
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Example News");
        assert_eq!(hits[0].url, "https://example.com/news?id=1");
        assert_eq!(hits[0].snippet, "A snippet about the launch.");
        assert_eq!(hits[1].url, "https://direct.example.org/page");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn honours_result_limit() {
        assert_eq!(parse_results(PAGE, 2).expect("parse").len(), 2);
        assert!(parse_results(PAGE, 0).expect("parse").is_empty());
    }

    #[tokio::test]
    async fn searches_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/html/")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "rust llm".into()))
            .with_status(200)
            .with_body(PAGE)
            .create_async()
            .await;

        let search = DuckDuckGoSearch::new(format!("{}/html/", server.url()), 5, "test").expect("client");
        let hits = search.search("rust llm", 1).await.expect("search");
        assert_eq!(hits.len(), 1);
        mock.assert_async().await;
    }
}
