use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use pressroom::coordinator::Coordinator;
use pressroom::monitor::UpdateSource;
use pressroom::pipeline::{ContentStages, PipelineDriver};
use pressroom::server::{build_rocket, AppState};
use pressroom::storage::Store;
use pressroom::types::*;
use rocket::http::Status;
use rocket::local::asynchronous::Client;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;

/// Yields one fixed update on the first check and nothing afterwards.
struct OneShotSource(std::sync::Mutex<Option<Update>>);

#[async_trait::async_trait]
impl UpdateSource for OneShotSource {
    async fn check(&self) -> Result<Vec<Update>> {
        Ok(self.0.lock().unwrap().take().into_iter().collect())
    }
}

/// Every run stops at classification.
struct BrokenStages;

#[async_trait::async_trait]
impl ContentStages for BrokenStages {
    async fn classify(&self, _plan: &ContentPlan) -> Result<ClassificationResult> {
        bail!("model unreachable")
    }

    async fn research(&self, _p: &ContentPlan, _c: &ClassificationResult) -> Result<ResearchResult> {
        unreachable!()
    }

    async fn write(&self, _p: &ContentPlan, _r: &ResearchResult, _c: &ClassificationResult) -> Result<ArticleDraft> {
        unreachable!()
    }

    async fn fact_check(&self, _d: &ArticleDraft, _r: &ResearchResult) -> Result<FactCheckResult> {
        unreachable!()
    }

    async fn proofread(&self, _d: &ArticleDraft, _f: &FactCheckResult) -> Result<ProofreadResult> {
        unreachable!()
    }

    async fn publish(&self, _p: &ProofreadResult) -> Result<PublicationPackage> {
        unreachable!()
    }
}

async fn client() -> (Client, Store) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = Store::new(pool);
    store.ensure_schema().await.expect("schema");

    let update = Update {
        title: "NewCo launches LLM API".to_string(),
        url: "https://news.example/newco".to_string(),
        source: "Tech".to_string(),
        published_date: Utc::now(),
        content_snippet: "NewCo released an API.".to_string(),
        analysis: "AI news".to_string(),
    };
    let source = Arc::new(OneShotSource(std::sync::Mutex::new(Some(update))));
    let state = AppState {
        store: store.clone(),
        coordinator: Arc::new(Coordinator::new(store.clone(), source)),
        driver: PipelineDriver::new(store.clone(), Arc::new(BrokenStages)),
    };

    let client = Client::tracked(build_rocket(state, None)).await.expect("rocket client");
    (client, store)
}

async fn json_body(response: rocket::local::asynchronous::LocalResponse<'_>) -> Value {
    let body = response.into_string().await.expect("body");
    serde_json::from_str(&body).expect("json body")
}

#[tokio::test]
async fn health_check() {
    let (client, _) = client().await;
    let response = client.get("/health").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().await.as_deref(), Some("OK"));
}

#[tokio::test]
async fn unknown_content_id() {
    let (client, _) = client().await;

    let status = json_body(client.get("/api/v1/status/nope").dispatch().await).await;
    assert_eq!(status["status"], "unknown");

    let process = client.post("/api/v1/content/nope/process").dispatch().await;
    assert_eq!(process.status(), Status::NotFound);

    let article = client.get("/api/v1/content/nope").dispatch().await;
    assert_eq!(article.status(), Status::NotFound);
}

#[tokio::test]
async fn check_updates_then_list_and_process() {
    let (client, store) = client().await;

    let check = json_body(client.post("/api/v1/check-updates").dispatch().await).await;
    assert_eq!(check["status"], "success");
    assert_eq!(check["details"]["updates_found"], 1);
    let content_id = check["details"]["content_ids"][0].as_str().expect("content id").to_string();

    let again = json_body(client.post("/api/v1/check-updates").dispatch().await).await;
    assert_eq!(again["details"]["updates_found"], 0);

    let queue = json_body(client.get("/api/v1/queue").dispatch().await).await;
    assert_eq!(queue["task_queue"].as_array().map(Vec::len), Some(1));
    assert_eq!(queue["task_queue"][0]["status"], "plan_created");

    let list = json_body(client.get("/api/v1/content").dispatch().await).await;
    assert_eq!(list["content_plans"][0]["content_id"], content_id.as_str());
    assert_eq!(list["content_plans"][0]["title"], "NewCo launches LLM API");
    assert_eq!(list["content_plans"][0]["status"], "unknown");

    let process = client
        .post(format!("/api/v1/content/{}/process", content_id))
        .dispatch()
        .await;
    assert_eq!(process.status(), Status::Accepted);
    let reply = json_body(process).await;
    assert_eq!(reply["status"], "processing");

    let mut final_status = None;
    for _ in 0..200 {
        let status = store.status(&content_id).await.unwrap().expect("status record");
        if status.status != RunStatus::Processing {
            final_status = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let final_status = final_status.expect("run finished");
    assert_eq!(final_status.status, RunStatus::Error);
    assert!(final_status.error.unwrap().contains("classification stage failed"));

    let status = json_body(client.get(format!("/api/v1/status/{}", content_id)).dispatch().await).await;
    assert_eq!(status["status"], "error");
    assert_eq!(status["details"]["stages"]["classification"], "pending");
}
