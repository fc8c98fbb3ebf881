use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use common::SourceConfig;
use pressroom::coordinator::{CheckOutcome, Coordinator};
use pressroom::ingestion::FetchOptions;
use pressroom::monitor::{MonitorSettings, SourceMonitor, UpdateSource, AI_KEYWORDS};
use pressroom::scraping::PageFetcher;
use pressroom::storage::Store;
use sqlx::sqlite::SqlitePoolOptions;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Tech</title><link>https://news.example</link><description>d</description>
<item><title>NewCo launches LLM API</title><link>https://news.example/1</link><description>An API.</description></item>
<item><title>Gardening tips</title><link>https://news.example/2</link><description>He said tomatoes</description></item>
<item><title>Quarterly report</title><link>https://news.example/3</link><description>The company invests in machine learning</description></item>
<item><title>OpenAI news</title><link>https://news.example/4</link><description>Too far down</description></item>
</channel></rss>"#;

/// Serves canned page text; unknown URLs fail.
struct StubPages(HashMap<&'static str, &'static str>);

#[async_trait::async_trait]
impl PageFetcher for StubPages {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.0
            .get(url)
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }
}

async fn memory_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = Store::new(pool);
    store.ensure_schema().await.expect("schema");
    store
}

fn settings(sources: Vec<SourceConfig>) -> MonitorSettings {
    MonitorSettings {
        sources,
        entries_per_source: 3,
        keywords: AI_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        seen_retention_days: 90,
        delay_between_sources: Duration::ZERO,
        fetch: FetchOptions {
            max_retries: 1,
            backoff_base: Duration::from_millis(1),
            ..FetchOptions::default()
        },
    }
}

fn pages() -> Arc<StubPages> {
    Arc::new(StubPages(HashMap::from([
        ("https://news.example/1", "NewCo today released a large language model API."),
        ("https://news.example/2", "Plant in spring."),
    ])))
}

async fn feed_server() -> (mockito::ServerGuard, mockito::Mock) {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(FEED)
        .create_async()
        .await;
    (server, mock)
}

#[tokio::test]
async fn monitor_filters_and_deduplicates() {
    let (server, _mock) = feed_server().await;
    let store = memory_store().await;
    let source = SourceConfig {
        name: "Tech".to_string(),
        url: format!("{}/feed", server.url()),
    };
    let monitor = SourceMonitor::new(store.clone(), pages(), settings(vec![source]));

    let updates = monitor.check().await.expect("first check");
    let urls: Vec<&str> = updates.iter().map(|u| u.url.as_str()).collect();
    assert_eq!(urls, vec!["https://news.example/1", "https://news.example/3"]);

    assert_eq!(updates[0].source, "Tech");
    assert!(updates[0].content_snippet.contains("large language model"));
    assert!(updates[0].analysis.contains("'NewCo launches LLM API'"));
    // page fetch failed, feed summary used instead
    assert!(updates[1].content_snippet.contains("machine learning"));

    let again = monitor.check().await.expect("second check");
    assert!(again.is_empty());
    assert_eq!(store.seen_count().await.unwrap(), 2);
}

#[tokio::test]
async fn failing_source_does_not_stop_the_others() {
    let (mut server, _mock) = feed_server().await;
    let _missing = server.mock("GET", "/missing").with_status(404).create_async().await;

    let store = memory_store().await;
    let sources = vec![
        SourceConfig {
            name: "Broken".to_string(),
            url: format!("{}/missing", server.url()),
        },
        SourceConfig {
            name: "Tech".to_string(),
            url: format!("{}/feed", server.url()),
        },
    ];
    let monitor = SourceMonitor::new(store, pages(), settings(sources));

    let updates = monitor.check().await.expect("check");
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|u| u.source == "Tech"));
}

#[tokio::test]
async fn coordinator_queues_one_plan_per_update() {
    let (server, _mock) = feed_server().await;
    let store = memory_store().await;
    let source = SourceConfig {
        name: "Tech".to_string(),
        url: format!("{}/feed", server.url()),
    };
    let monitor = SourceMonitor::new(store.clone(), pages(), settings(vec![source]));
    let coordinator = Coordinator::new(store.clone(), Arc::new(monitor));

    let outcome = coordinator.process_new_updates().await.expect("check");
    let ids = outcome.content_ids();
    match outcome {
        CheckOutcome::UpdatesProcessed { updates_found, content_plans } => {
            assert_eq!(updates_found, 2);
            assert!(content_plans.iter().all(|p| p.tasks.len() == 6));
        }
        CheckOutcome::NoUpdates => panic!("expected updates"),
    }

    let queue = coordinator.queue().await.expect("queue");
    let queued: Vec<String> = queue.iter().map(|p| p.content_id.clone()).collect();
    assert_eq!(queued, ids);

    // nothing new: no side effects
    let second = coordinator.process_new_updates().await.expect("second check");
    assert!(matches!(second, CheckOutcome::NoUpdates));
    assert_eq!(store.queued_ids().await.unwrap().len(), 2);
}
