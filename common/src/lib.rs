/*!
common/src/lib.rs

Shared configuration types and DB helper functions for Pressroom.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default config file with an optional override
- A helper to initialize the SQLite database pool
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/pressroom.db")
    pub path: String,
}

/// HTTP server bind settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// A syndication feed watched by the source monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
}

/// Source monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Most recent entries considered per feed on each check
    pub entries_per_source: Option<usize>,
    /// Replaces the built-in keyword list when set
    pub keywords: Option<Vec<String>>,
    /// Seen URLs older than this are forgotten at the start of a check
    pub seen_retention_days: Option<i64>,
    /// Pause between two sources
    pub delay_seconds: Option<u64>,
    /// Background worker check interval
    pub poll_interval_minutes: Option<u64>,
    /// Run the full pipeline on every plan created by the background worker
    pub auto_process: Option<bool>,
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub user_agent: Option<String>,
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// LLM top-level config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

/// Research stage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// HTML search endpoint queried with `?q=<query>`
    pub search_url: Option<String>,
    pub results_per_query: Option<usize>,
    /// Maximum bytes of page text kept per fetched result
    pub page_byte_budget: Option<usize>,
}

/// Publishing stage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishingConfig {
    pub output_dir: Option<String>,
    pub import_base_url: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: Option<ServerConfig>,
    pub monitor: Option<MonitorConfig>,
    pub politeness: Option<PolitenessConfig>,
    pub llm: Option<LlmConfig>,
    pub research: Option<ResearchConfig>,
    pub publishing: Option<PublishingConfig>,
}

pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_USER_AGENT: &str = "Pressroom/0.1.0";

/// Feeds watched when the configuration lists none.
pub fn default_sources() -> Vec<SourceConfig> {
    [
        ("TechCrunch AI", "https://techcrunch.com/category/artificial-intelligence/feed/"),
        ("VentureBeat AI", "https://venturebeat.com/category/ai/feed/"),
        ("MIT Technology Review AI", "https://www.technologyreview.com/topic/artificial-intelligence/feed"),
    ]
    .into_iter()
    .map(|(name, url)| SourceConfig {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (label, path) in [("default", default_path), ("override", override_path)] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn sources(&self) -> Vec<SourceConfig> {
        match self.monitor.as_ref() {
            Some(m) if !m.sources.is_empty() => m.sources.clone(),
            _ => default_sources(),
        }
    }

    pub fn entries_per_source(&self) -> usize {
        self.monitor.as_ref().and_then(|m| m.entries_per_source).unwrap_or(3)
    }

    pub fn seen_retention_days(&self) -> i64 {
        self.monitor.as_ref().and_then(|m| m.seen_retention_days).unwrap_or(90)
    }

    pub fn poll_interval_minutes(&self) -> u64 {
        self.monitor.as_ref().and_then(|m| m.poll_interval_minutes).unwrap_or(60)
    }

    pub fn fetch_timeout_seconds(&self) -> u64 {
        self.politeness.as_ref().and_then(|p| p.fetch_timeout_seconds).unwrap_or(20)
    }

    pub fn max_retries(&self) -> u32 {
        self.politeness.as_ref().and_then(|p| p.max_retries).unwrap_or(3)
    }

    pub fn user_agent(&self) -> String {
        self.politeness
            .as_ref()
            .and_then(|p| p.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn output_dir(&self) -> String {
        self.publishing
            .as_ref()
            .and_then(|p| p.output_dir.clone())
            .unwrap_or_else(|| "data".to_string())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and returns a WAL-mode pool. The pool size is
/// kept small: every writer goes through short per-key upserts.
///
/// Example:
///   let pool = init_db_pool("data/pressroom.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_from_string_and_db_pool() {
        let toml = r#"
            [database]
            path = "data/test.db"

            [monitor]
            entries_per_source = 5

            [[monitor.sources]]
            name = "Example"
            url = "https://example.com/feed"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.entries_per_source(), 5);
        assert_eq!(cfg.sources().len(), 1);
        assert_eq!(cfg.sources()[0].name, "Example");
        assert_eq!(cfg.fetch_timeout_seconds(), 20);

        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("pressroom.db");
        let pool = init_db_pool(&db_path.to_string_lossy()).await.expect("init pool");
        let conn = pool.acquire().await.expect("acquire conn");
        drop(conn);
    }

    #[test]
    fn missing_sources_fall_back_to_builtin_feeds() {
        let cfg: Config = toml::from_str("[database]\npath = \"x.db\"\n").expect("parse config");
        assert_eq!(cfg.sources(), default_sources());
        assert_eq!(cfg.output_dir(), "data");
        assert_eq!(cfg.user_agent(), DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        std::fs::write(
            &default_path,
            "[database]\npath = \"a.db\"\n[politeness]\nfetch_timeout_seconds = 10\nmax_retries = 2\n",
        )
        .expect("write default");
        std::fs::write(&override_path, "[politeness]\nfetch_timeout_seconds = 30\n")
            .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load config");
        assert_eq!(cfg.database.path, "a.db");
        assert_eq!(cfg.fetch_timeout_seconds(), 30);
        assert_eq!(cfg.max_retries(), 2);
    }
}
