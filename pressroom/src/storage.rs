use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{ContentPlan, PipelineStatus, Stage};

/// Kind of per-content record. Each maps to a logical object path `{prefix}/{content_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Plan,
    Classification,
    Research,
    Draft,
    FactCheck,
    Proofread,
    Publication,
    Status,
}

impl RecordKind {
    pub fn prefix(self) -> &'static str {
        match self {
            RecordKind::Plan => "plans",
            RecordKind::Classification => "classifications",
            RecordKind::Research => "research",
            RecordKind::Draft => "articles",
            RecordKind::FactCheck => "fact_checks",
            RecordKind::Proofread => "proofreads",
            RecordKind::Publication => "publications",
            RecordKind::Status => "status",
        }
    }

    pub fn key(self, content_id: &str) -> String {
        format!("{}/{}", self.prefix(), content_id)
    }

    /// Record written when `stage` completes.
    pub fn for_stage(stage: Stage) -> RecordKind {
        match stage {
            Stage::Classification => RecordKind::Classification,
            Stage::Research => RecordKind::Research,
            Stage::Writing => RecordKind::Draft,
            Stage::FactCheck => RecordKind::FactCheck,
            Stage::Proofreading => RecordKind::Proofread,
            Stage::Publishing => RecordKind::Publication,
        }
    }
}

/// One row of the persisted stage transition log
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Transition {
    pub content_id: String,
    pub stage: Option<String>,
    pub state: String,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Durable state: seen URLs, the task queue, per-content records and the transition log.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables if they do not exist. Idempotent and safe to call at startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        info!("storage: ensuring DB schema (CREATE TABLE IF NOT EXISTS ...)");
        let stmts = [
            r#"
            CREATE TABLE IF NOT EXISTS seen_urls (
                url TEXT PRIMARY KEY,
                source TEXT,
                first_seen_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS task_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id TEXT NOT NULL,
                enqueued_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS records (
                object_key TEXT PRIMARY KEY,
                content_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_records_content ON records(content_id)",
            r#"
            CREATE TABLE IF NOT EXISTS stage_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id TEXT NOT NULL,
                stage TEXT,
                state TEXT NOT NULL,
                message TEXT,
                at TIMESTAMP NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transitions_content ON stage_transitions(content_id)",
        ];

        for s in &stmts {
            sqlx::query(s)
                .execute(&self.pool)
                .await
                .with_context(|| "failed to ensure schema")?;
        }

        info!("storage: DB schema ensured");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Seen-set
    // ------------------------------------------------------------------

    pub async fn is_seen(&self, url: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_urls WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .context("failed to check seen url")?;
        Ok(count > 0)
    }

    /// Record a URL as processed. Returns false if it was already known.
    pub async fn mark_seen(&self, url: &str, source: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO seen_urls (url, source, first_seen_at) VALUES (?, ?, ?)",
        )
        .bind(url)
        .bind(source)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert seen url")?;
        Ok(result.rows_affected() > 0)
    }

    /// Forget seen URLs first recorded before `cutoff`. Returns the number removed.
    pub async fn prune_seen(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM seen_urls WHERE first_seen_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune seen urls")?;
        Ok(result.rows_affected())
    }

    pub async fn seen_count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_urls")
            .fetch_one(&self.pool)
            .await
            .context("failed to count seen urls")
    }

    // ------------------------------------------------------------------
    // Task queue
    // ------------------------------------------------------------------

    /// Persist the plan record and append its id to the task queue.
    pub async fn enqueue_plan(&self, plan: &ContentPlan) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to open transaction")?;
        let body = serde_json::to_string(plan).context("failed to serialize content plan")?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO records (object_key, content_id, kind, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(object_key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(RecordKind::Plan.key(&plan.content_id))
        .bind(&plan.content_id)
        .bind(RecordKind::Plan.prefix())
        .bind(&body)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to store content plan")?;

        sqlx::query("INSERT INTO task_queue (content_id, enqueued_at) VALUES (?, ?)")
            .bind(&plan.content_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("failed to append to task queue")?;

        tx.commit().await.context("failed to commit enqueue")?;
        debug!("Enqueued content plan {}", plan.content_id);
        Ok(())
    }

    /// Content ids in enqueue order.
    pub async fn queued_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT content_id FROM task_queue ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .context("failed to read task queue")?;
        Ok(rows.iter().map(|r| r.get::<String, _>("content_id")).collect())
    }

    /// Plans in enqueue order.
    pub async fn queued_plans(&self) -> Result<Vec<ContentPlan>> {
        let rows = sqlx::query(
            r#"
            SELECT r.body
            FROM task_queue q
            JOIN records r ON r.object_key = 'plans/' || q.content_id
            ORDER BY q.seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to read queued plans")?;

        rows.iter()
            .map(|r| {
                let body: String = r.get("body");
                serde_json::from_str(&body).context("failed to decode queued plan")
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Per-content records
    // ------------------------------------------------------------------

    /// Upsert a record. Re-running a stage overwrites its previous output.
    pub async fn put<T: Serialize>(&self, kind: RecordKind, content_id: &str, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize {}", kind.prefix()))?;
        sqlx::query(
            r#"
            INSERT INTO records (object_key, content_id, kind, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(object_key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.key(content_id))
        .bind(content_id)
        .bind(kind.prefix())
        .bind(&body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store {}", kind.key(content_id)))?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: RecordKind, content_id: &str) -> Result<Option<T>> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM records WHERE object_key = ?")
            .bind(kind.key(content_id))
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read {}", kind.key(content_id)))?;

        body.map(|b| {
            serde_json::from_str(&b).with_context(|| format!("failed to decode {}", kind.key(content_id)))
        })
        .transpose()
    }

    pub async fn plan(&self, content_id: &str) -> Result<Option<ContentPlan>> {
        self.get(RecordKind::Plan, content_id).await
    }

    pub async fn status(&self, content_id: &str) -> Result<Option<PipelineStatus>> {
        self.get(RecordKind::Status, content_id).await
    }

    // ------------------------------------------------------------------
    // Transition log
    // ------------------------------------------------------------------

    pub async fn log_transition(
        &self,
        content_id: &str,
        stage: Option<Stage>,
        state: &str,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO stage_transitions (content_id, stage, state, message, at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(content_id)
        .bind(stage.map(|s| s.as_str()))
        .bind(state)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to log stage transition")?;
        Ok(())
    }

    pub async fn transitions(&self, content_id: &str) -> Result<Vec<Transition>> {
        let rows = sqlx::query(
            "SELECT content_id, stage, state, message, at FROM stage_transitions WHERE content_id = ? ORDER BY id ASC",
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to read stage transitions")?;

        Ok(rows
            .into_iter()
            .map(|r| Transition {
                content_id: r.get("content_id"),
                stage: r.get("stage"),
                state: r.get("state"),
                message: r.get("message"),
                at: r.get("at"),
            })
            .collect())
    }
}
