use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::monitor::UpdateSource;
use crate::storage::Store;
use crate::types::{ContentPlan, PlanStatus, Stage, StageState, Task, Update};

/// Result of one source check
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    NoUpdates,
    UpdatesProcessed {
        updates_found: usize,
        content_plans: Vec<ContentPlan>,
    },
}

impl CheckOutcome {
    pub fn content_ids(&self) -> Vec<String> {
        match self {
            CheckOutcome::NoUpdates => Vec::new(),
            CheckOutcome::UpdatesProcessed { content_plans, .. } => {
                content_plans.iter().map(|p| p.content_id.clone()).collect()
            }
        }
    }
}

/// Turns monitor output into content plans and appends them to the task queue.
pub struct Coordinator {
    store: Store,
    source: Arc<dyn UpdateSource>,
}

impl Coordinator {
    pub fn new(store: Store, source: Arc<dyn UpdateSource>) -> Self {
        Self { store, source }
    }

    pub async fn process_new_updates(&self) -> Result<CheckOutcome> {
        let updates = self.source.check().await?;
        if updates.is_empty() {
            info!("coordinator: no new updates");
            return Ok(CheckOutcome::NoUpdates);
        }

        let mut content_plans = Vec::with_capacity(updates.len());
        for update in updates {
            let plan = create_plan(update);
            self.store.enqueue_plan(&plan).await?;
            info!("coordinator: created plan {} for '{}'", plan.content_id, plan.original_update.title);
            content_plans.push(plan);
        }

        Ok(CheckOutcome::UpdatesProcessed {
            updates_found: content_plans.len(),
            content_plans,
        })
    }

    /// Task queue in enqueue order.
    pub async fn queue(&self) -> Result<Vec<ContentPlan>> {
        self.store.queued_plans().await
    }
}

/// Build a fresh plan for `update` with a new content id and all six tasks pending.
pub fn create_plan(update: Update) -> ContentPlan {
    let content_id = uuid::Uuid::new_v4().to_string();
    let outline = plan_outline(&update.title);
    ContentPlan {
        content_id,
        original_update: update,
        content_plan: outline,
        status: PlanStatus::PlanCreated,
        tasks: Stage::ORDER
            .iter()
            .map(|s| Task {
                task_type: *s,
                status: StageState::Pending,
            })
            .collect(),
        created_at: Utc::now(),
    }
}

fn plan_outline(title: &str) -> String {
    let image_subject = title.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
    format!(
        "Content Plan for: {title}

Headline: {title}

Subtopics to cover:
1. Overview of the announcement/development
2. Technical details and capabilities
3. Industry impact and significance
4. Expert opinions and analysis
5. Future implications

Multimedia elements:
- Feature image related to {image_subject}
- Infographic showing key points
- Related technology comparison if applicable

Target audience:
- Primary: Tech professionals and AI enthusiasts
- Secondary: Business decision-makers interested in AI implementation

Key points to emphasize:
- What makes this development unique or noteworthy
- How it compares to existing technologies
- Practical applications and use cases
- Future development roadmap
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> Update {
        Update {
            title: "NewCo launches LLM API".to_string(),
            url: "https://x/1".to_string(),
            source: "test".to_string(),
            published_date: Utc::now(),
            content_snippet: "...".to_string(),
            analysis: String::new(),
        }
    }

    #[test]
    fn plans_start_with_six_pending_tasks() {
        let plan = create_plan(update());
        assert_eq!(plan.status, PlanStatus::PlanCreated);
        assert_eq!(plan.tasks.len(), 6);
        assert!(plan.tasks.iter().all(|t| t.status == StageState::Pending));
        assert_eq!(plan.tasks[0].task_type, Stage::Classification);
        assert!(plan.content_plan.contains("Headline: NewCo launches LLM API"));
        assert!(plan.content_plan.contains("Feature image related to NewCo launches LLM"));
    }

    #[test]
    fn content_ids_are_unique() {
        let a = create_plan(update());
        let b = create_plan(update());
        assert_ne!(a.content_id, b.content_id);
    }
}
