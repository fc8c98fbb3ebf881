use anyhow::Result;
use chrono::Utc;
use common::{Config, SourceConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::ingestion::{self, FetchOptions};
use crate::scraping::{take_chars, PageFetcher};
use crate::storage::Store;
use crate::types::Update;

/// Terms an entry must mention (title or body) to be accepted.
pub const AI_KEYWORDS: &[&str] = &[
    "ai",
    "artificial intelligence",
    "machine learning",
    "neural network",
    "deep learning",
    "llm",
    "large language model",
    "chatgpt",
    "gpt",
    "claude",
    "gemini",
    "openai",
    "anthropic",
];

const SNIPPET_CHARS: usize = 1000;

/// Anything that yields newly discovered updates.
#[async_trait::async_trait]
pub trait UpdateSource: Send + Sync {
    async fn check(&self) -> Result<Vec<Update>>;
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub sources: Vec<SourceConfig>,
    pub entries_per_source: usize,
    pub keywords: Vec<String>,
    pub seen_retention_days: i64,
    pub delay_between_sources: Duration,
    pub fetch: FetchOptions,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        let monitor = config.monitor.as_ref();
        let keywords = monitor
            .and_then(|m| m.keywords.clone())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| AI_KEYWORDS.iter().map(|k| k.to_string()).collect());

        Self {
            sources: config.sources(),
            entries_per_source: config.entries_per_source(),
            keywords,
            seen_retention_days: config.seen_retention_days(),
            delay_between_sources: Duration::from_secs(monitor.and_then(|m| m.delay_seconds).unwrap_or(1)),
            fetch: FetchOptions {
                timeout_secs: config.fetch_timeout_seconds(),
                max_retries: config.max_retries(),
                user_agent: config.user_agent(),
                ..FetchOptions::default()
            },
        }
    }
}

/// Polls the configured feeds and returns entries not seen before that match a keyword.
pub struct SourceMonitor {
    store: Store,
    pages: Arc<dyn PageFetcher>,
    settings: MonitorSettings,
}

impl SourceMonitor {
    pub fn new(store: Store, pages: Arc<dyn PageFetcher>, settings: MonitorSettings) -> Self {
        Self { store, pages, settings }
    }

    async fn check_source(&self, source: &SourceConfig) -> Result<Vec<Update>> {
        let feed = ingestion::fetch_and_parse_feed(&source.url, &self.settings.fetch).await?;
        info!("monitor: {} returned {} entries", source.name, feed.entries.len());

        let mut accepted = Vec::new();
        for entry in feed.entries.iter().take(self.settings.entries_per_source) {
            let title = ingestion::entry_title(entry);
            let Some(link) = ingestion::entry_link(entry) else {
                debug!("monitor: skipping entry without link: {}", title);
                continue;
            };

            if self.store.is_seen(&link).await? {
                debug!("monitor: already seen {}", link);
                continue;
            }

            let body = match self.pages.fetch_text(&link).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => feed_body_text(entry),
                Err(e) => {
                    warn!("monitor: failed to fetch {}: {:#}", link, e);
                    feed_body_text(entry)
                }
            };

            if !is_relevant(&self.settings.keywords, &title, &body) {
                info!("monitor: not relevant: {}", title);
                continue;
            }

            info!("monitor: relevant: {}", title);
            let published_date = entry.published.or(entry.updated).unwrap_or_else(Utc::now);
            let analysis = format!(
                "This article about '{}' contains AI-related content and appears to be significant news about AI technology or applications.",
                title
            );
            self.store.mark_seen(&link, &source.name).await?;

            accepted.push(Update {
                title,
                url: link,
                source: source.name.clone(),
                published_date,
                content_snippet: take_chars(&body, SNIPPET_CHARS),
                analysis,
            });
        }
        Ok(accepted)
    }
}

#[async_trait::async_trait]
impl UpdateSource for SourceMonitor {
    async fn check(&self) -> Result<Vec<Update>> {
        let cutoff = Utc::now() - chrono::Duration::days(self.settings.seen_retention_days);
        let pruned = self.store.prune_seen(cutoff).await?;
        if pruned > 0 {
            info!("monitor: forgot {} seen urls older than {} days", pruned, self.settings.seen_retention_days);
        }

        let mut updates = Vec::new();
        for (i, source) in self.settings.sources.iter().enumerate() {
            if i > 0 && !self.settings.delay_between_sources.is_zero() {
                tokio::time::sleep(self.settings.delay_between_sources).await;
            }

            info!("monitor: checking source {} ({})", source.name, source.url);
            match self.check_source(source).await {
                Ok(found) => updates.extend(found),
                Err(e) => error!("monitor: source {} failed: {:#}", source.name, e),
            }
        }

        info!("monitor: check finished, {} new updates", updates.len());
        Ok(updates)
    }
}

fn feed_body_text(entry: &feed_rs::model::Entry) -> String {
    let raw = ingestion::entry_body(entry);
    html2text::from_read(raw.as_bytes(), 120).unwrap_or(raw)
}

/// Case-insensitive keyword test over title and body.
pub fn is_relevant(keywords: &[String], title: &str, body: &str) -> bool {
    let title = title.to_lowercase();
    let body = body.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        contains_keyword(&title, &k) || contains_keyword(&body, &k)
    })
}

/// Endings a single-word keyword may carry and still match ("llms", "gpt's").
const KEYWORD_SUFFIXES: &[&str] = &["'s", "\u{2019}s", "s"];

fn ends_word(rest: &str) -> bool {
    !rest.chars().next().is_some_and(char::is_alphanumeric)
}

/// Phrases match as substrings; single words must stand alone so "ai" does not hit "said".
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    if keyword.contains(char::is_whitespace) {
        return haystack.contains(keyword);
    }

    let mut from = 0;
    while let Some(pos) = haystack[from..].find(keyword) {
        let start = from + pos;
        let end = start + keyword.len();
        let before = haystack[..start].chars().next_back();
        let rest = &haystack[end..];
        let ends = ends_word(rest)
            || KEYWORD_SUFFIXES
                .iter()
                .any(|suffix| rest.strip_prefix(suffix).is_some_and(ends_word));
        if !before.is_some_and(char::is_alphanumeric) && ends {
            return true;
        }
        from = end;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        AI_KEYWORDS.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn single_words_match_on_boundaries() {
        assert!(contains_keyword("the new ai model", "ai"));
        assert!(contains_keyword("ai-powered search", "ai"));
        assert!(!contains_keyword("she said so", "ai"));
        assert!(!contains_keyword("brain surgery", "ai"));
        assert!(contains_keyword("openai ships", "openai"));
    }

    #[test]
    fn plural_and_possessive_forms_match() {
        assert!(contains_keyword("why llms hallucinate", "llm"));
        assert!(contains_keyword("custom gpts, explained", "gpt"));
        assert!(contains_keyword("the ais", "ai"));
        assert!(contains_keyword("openai's new model", "openai"));
        assert!(contains_keyword("openai\u{2019}s new model", "openai"));
        assert!(!contains_keyword("walk down the aisle", "ai"));
        assert!(!contains_keyword("gptsx release", "gpt"));

        let keywords = defaults();
        assert!(is_relevant(&keywords, "Why LLMs still hallucinate", ""));
    }

    #[test]
    fn relevance_is_case_insensitive() {
        let keywords = defaults();
        assert!(is_relevant(&keywords, "NewCo launches LLM API", ""));
        assert!(is_relevant(&keywords, "Quarterly results", "Spending on Machine Learning grew"));
        assert!(!is_relevant(&keywords, "Gardening tips", "He said the tomatoes were ready"));
    }
}
