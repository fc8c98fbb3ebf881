use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, Rocket, State};
use serde::Serialize;
use serde_json::json;

use common::Config;

use crate::coordinator::{CheckOutcome, Coordinator};
use crate::pipeline::{PipelineDriver, SubmitError};
use crate::storage::{RecordKind, Store};
use crate::types::{ArticleDraft, ContentPlan, ProofreadResult};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub coordinator: Arc<Coordinator>,
    pub driver: PipelineDriver,
}

/// Envelope returned by the pipeline endpoints.
#[derive(Debug, Serialize)]
struct PipelineReply {
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// One row of the content listing.
#[derive(Debug, Serialize)]
struct ContentSummary {
    content_id: String,
    title: String,
    status: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ContentList {
    content_plans: Vec<ContentSummary>,
}

#[derive(Debug, Serialize)]
struct QueueReply {
    task_queue: Vec<ContentPlan>,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Run the source monitor and create a plan per new update.
#[post("/api/v1/check-updates")]
async fn check_updates(state: &State<AppState>) -> Result<Json<PipelineReply>, Status> {
    let outcome = state.coordinator.process_new_updates().await.map_err(|e| {
        tracing::error!("check-updates failed: {:#}", e);
        Status::InternalServerError
    })?;

    let reply = match &outcome {
        CheckOutcome::NoUpdates => PipelineReply {
            status: "success".to_string(),
            message: "No new updates found".to_string(),
            details: Some(json!({ "updates_found": 0 })),
        },
        CheckOutcome::UpdatesProcessed { updates_found, .. } => PipelineReply {
            status: "success".to_string(),
            message: format!("Found {} updates", updates_found),
            details: Some(json!({
                "updates_found": updates_found,
                "content_ids": outcome.content_ids(),
            })),
        },
    };
    Ok(Json(reply))
}

/// Start the pipeline for a content id; returns immediately.
#[post("/api/v1/content/<content_id>/process?<resume>")]
async fn process_content(
    state: &State<AppState>,
    content_id: &str,
    resume: Option<bool>,
) -> Result<(Status, Json<PipelineReply>), Status> {
    match state.driver.submit(content_id, resume.unwrap_or(false)).await {
        Ok(status) => Ok((
            Status::Accepted,
            Json(PipelineReply {
                status: status.status.as_str().to_string(),
                message: format!("Started content pipeline for ID: {}", content_id),
                details: Some(json!({ "content_id": content_id })),
            }),
        )),
        Err(SubmitError::NotFound(_)) => Err(Status::NotFound),
        Err(SubmitError::InFlight(_)) => Err(Status::Conflict),
        Err(SubmitError::Storage(e)) => {
            tracing::error!("process {} failed: {:#}", content_id, e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/api/v1/status/<content_id>")]
async fn content_status(state: &State<AppState>, content_id: &str) -> Result<Json<PipelineReply>, Status> {
    let status = state.store.status(content_id).await.map_err(|e| {
        tracing::error!("status lookup for {} failed: {:#}", content_id, e);
        Status::InternalServerError
    })?;

    let reply = match status {
        Some(status) => PipelineReply {
            status: status.status.as_str().to_string(),
            message: format!("Pipeline status for content ID: {}", content_id),
            details: serde_json::to_value(&status).ok(),
        },
        None => PipelineReply {
            status: "unknown".to_string(),
            message: format!("No status information for content ID: {}", content_id),
            details: Some(json!({ "content_id": content_id })),
        },
    };
    Ok(Json(reply))
}

/// Proofread article if present, else the draft.
#[get("/api/v1/content/<content_id>")]
async fn content_article(state: &State<AppState>, content_id: &str) -> Result<(ContentType, String), Status> {
    let store = &state.store;
    let internal = |e: anyhow::Error| {
        tracing::error!("article lookup for {} failed: {:#}", content_id, e);
        Status::InternalServerError
    };

    let proofread: Option<ProofreadResult> = store.get(RecordKind::Proofread, content_id).await.map_err(internal)?;
    if let Some(p) = proofread {
        return Ok((ContentType::Markdown, p.edited_article));
    }

    let draft: Option<ArticleDraft> = store.get(RecordKind::Draft, content_id).await.map_err(internal)?;
    match draft {
        Some(d) => Ok((ContentType::Markdown, d.article_content)),
        None => Err(Status::NotFound),
    }
}

#[get("/api/v1/content")]
async fn list_content(state: &State<AppState>) -> Result<Json<ContentList>, Status> {
    let internal = |e: anyhow::Error| {
        tracing::error!("content listing failed: {:#}", e);
        Status::InternalServerError
    };

    let plans = state.store.queued_plans().await.map_err(internal)?;
    let mut content_plans = Vec::with_capacity(plans.len());
    for plan in plans {
        let status = state
            .store
            .status(&plan.content_id)
            .await
            .map_err(internal)?
            .map(|s| s.status.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        content_plans.push(ContentSummary {
            content_id: plan.content_id,
            title: plan.original_update.title,
            status,
            created: plan.created_at,
        });
    }
    Ok(Json(ContentList { content_plans }))
}

#[get("/api/v1/queue")]
async fn queue(state: &State<AppState>) -> Result<Json<QueueReply>, Status> {
    state
        .coordinator
        .queue()
        .await
        .map(|task_queue| Json(QueueReply { task_queue }))
        .map_err(|e| {
            tracing::error!("queue listing failed: {:#}", e);
            Status::InternalServerError
        })
}

/// Build the Rocket instance. Bind address and port come from `[server]` when set.
pub fn build_rocket(state: AppState, config: Option<&Config>) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = config.and_then(|c| c.server.as_ref()) {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![
            health,
            check_updates,
            process_content,
            content_status,
            content_article,
            list_content,
            queue,
        ],
    )
}

/// Launch the HTTP server; returns when Rocket shuts down.
pub async fn launch_rocket(state: AppState, config: Option<&Config>) -> Result<()> {
    tracing::info!("Starting Rocket HTTP server");
    build_rocket(state, config)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
