//! Per-content stage sequencer.
//!
//! A run moves `processing -> completed | error`. The six stages execute strictly in order;
//! every completed stage persists its record, flips its entry in the status map and the plan's
//! task list, and appends to the transition log. The first failing stage ends the run with
//! `error`, leaving earlier records in place. With `resume`, stages already marked completed
//! reuse their stored record until the first stage that has to run again.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::storage::{RecordKind, Store};
use crate::types::{
    ArticleDraft, ClassificationResult, ContentPlan, FactCheckResult, PipelineStatus, PlanStatus,
    ProofreadResult, PublicationPackage, ResearchResult, RunStatus, Stage, StageState,
};

/// The six stage operations, in execution order.
#[async_trait::async_trait]
pub trait ContentStages: Send + Sync {
    async fn classify(&self, plan: &ContentPlan) -> Result<ClassificationResult>;

    async fn research(&self, plan: &ContentPlan, classification: &ClassificationResult) -> Result<ResearchResult>;

    async fn write(
        &self,
        plan: &ContentPlan,
        research: &ResearchResult,
        classification: &ClassificationResult,
    ) -> Result<ArticleDraft>;

    async fn fact_check(&self, draft: &ArticleDraft, research: &ResearchResult) -> Result<FactCheckResult>;

    async fn proofread(&self, draft: &ArticleDraft, fact_check: &FactCheckResult) -> Result<ProofreadResult>;

    async fn publish(&self, proofread: &ProofreadResult) -> Result<PublicationPackage>;
}

#[derive(Debug)]
pub enum SubmitError {
    /// No content plan exists for the id
    NotFound(String),
    /// A run for the id is already in progress
    InFlight(String),
    Storage(anyhow::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::NotFound(id) => write!(f, "content id {} not found", id),
            SubmitError::InFlight(id) => write!(f, "content id {} is already being processed", id),
            SubmitError::Storage(e) => write!(f, "storage error: {:#}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<anyhow::Error> for SubmitError {
    fn from(e: anyhow::Error) -> Self {
        SubmitError::Storage(e)
    }
}

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Releases the content id when the run ends, however it ends.
struct RunGuard {
    set: InFlightSet,
    content_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.content_id);
    }
}

struct Run {
    plan: ContentPlan,
    status: PipelineStatus,
    /// Still allowed to reuse stored records of completed stages
    reuse: bool,
}

#[derive(Clone)]
pub struct PipelineDriver {
    store: Store,
    stages: Arc<dyn ContentStages>,
    in_flight: InFlightSet,
}

impl PipelineDriver {
    pub fn new(store: Store, stages: Arc<dyn ContentStages>) -> Self {
        Self {
            store,
            stages,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, content_id: &str) -> bool {
        let set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(content_id)
    }

    fn claim(&self, content_id: &str) -> Result<RunGuard, SubmitError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(content_id.to_string()) {
            return Err(SubmitError::InFlight(content_id.to_string()));
        }
        Ok(RunGuard {
            set: self.in_flight.clone(),
            content_id: content_id.to_string(),
        })
    }

    /// Start a run in the background and return the initial `processing` status.
    pub async fn submit(&self, content_id: &str, resume: bool) -> Result<PipelineStatus, SubmitError> {
        let guard = self.claim(content_id)?;
        let run = self.prepare(content_id, resume).await?;
        let initial = run.status.clone();

        let driver = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let content_id = run.plan.content_id.clone();
            if let Err(e) = driver.execute(run).await {
                error!("pipeline {}: failed to record final state: {:#}", content_id, e);
            }
        });
        Ok(initial)
    }

    /// Run to completion and return the final status.
    pub async fn run(&self, content_id: &str, resume: bool) -> Result<PipelineStatus, SubmitError> {
        let _guard = self.claim(content_id)?;
        let run = self.prepare(content_id, resume).await?;
        Ok(self.execute(run).await?)
    }

    async fn prepare(&self, content_id: &str, resume: bool) -> Result<Run, SubmitError> {
        let mut plan = self
            .store
            .plan(content_id)
            .await?
            .ok_or_else(|| SubmitError::NotFound(content_id.to_string()))?;

        let mut status = if resume {
            self.store
                .status(content_id)
                .await?
                .unwrap_or_else(|| PipelineStatus::new(content_id))
        } else {
            PipelineStatus::new(content_id)
        };
        status.status = RunStatus::Processing;
        status.error = None;
        status.updated_at = Utc::now();

        plan.status = PlanStatus::Processing;
        if !resume {
            for task in plan.tasks.iter_mut() {
                task.status = StageState::Pending;
            }
        }

        self.store.put(RecordKind::Status, content_id, &status).await?;
        self.store.put(RecordKind::Plan, content_id, &plan).await?;
        self.store
            .log_transition(content_id, None, RunStatus::Processing.as_str(), resume.then_some("resume"))
            .await?;
        info!("pipeline {}: started (resume: {})", content_id, resume);

        Ok(Run {
            plan,
            status,
            reuse: resume,
        })
    }

    async fn execute(&self, mut run: Run) -> Result<PipelineStatus> {
        let snapshot = run.plan.clone();
        let content_id = snapshot.content_id.as_str();

        let message = match self.run_stages(&mut run, &snapshot).await {
            Ok(()) => {
                info!("pipeline {}: completed", content_id);
                run.status.status = RunStatus::Completed;
                run.plan.status = PlanStatus::Completed;
                None
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("pipeline {}: {}", content_id, message);
                run.status.status = RunStatus::Error;
                run.status.error = Some(message.clone());
                run.plan.status = PlanStatus::Error;
                Some(message)
            }
        };
        run.status.updated_at = Utc::now();

        self.store.put(RecordKind::Status, content_id, &run.status).await?;
        self.store.put(RecordKind::Plan, content_id, &run.plan).await?;
        self.store
            .log_transition(content_id, None, run.status.status.as_str(), message.as_deref())
            .await?;
        Ok(run.status)
    }

    async fn run_stages(&self, run: &mut Run, plan: &ContentPlan) -> Result<()> {
        let stages = &self.stages;

        let classification = self.stage(run, Stage::Classification, stages.classify(plan)).await?;
        let research = self
            .stage(run, Stage::Research, stages.research(plan, &classification))
            .await?;
        let draft = self
            .stage(run, Stage::Writing, stages.write(plan, &research, &classification))
            .await?;
        let fact_check = self
            .stage(run, Stage::FactCheck, stages.fact_check(&draft, &research))
            .await?;
        let proofread = self
            .stage(run, Stage::Proofreading, stages.proofread(&draft, &fact_check))
            .await?;
        self.stage(run, Stage::Publishing, stages.publish(&proofread)).await?;
        Ok(())
    }

    /// Reuse the stored output of a completed stage, or await `work` and record its output.
    async fn stage<T, F>(&self, run: &mut Run, stage: Stage, work: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = Result<T>> + Send,
    {
        let content_id = run.plan.content_id.clone();
        let kind = RecordKind::for_stage(stage);

        if run.reuse && run.status.stage(stage) == StageState::Completed {
            match self.store.get::<T>(kind, &content_id).await? {
                Some(existing) => {
                    info!("pipeline {}: reusing completed {} output", content_id, stage);
                    return Ok(existing);
                }
                None => warn!("pipeline {}: {} marked completed but has no record", content_id, stage),
            }
        }
        if run.reuse {
            run.reuse = false;
            for later in Stage::ORDER.iter().copied().skip_while(|s| *s != stage) {
                run.status.stages.insert(later, StageState::Pending);
                run.plan.set_task(later, StageState::Pending);
            }
        }

        info!("pipeline {}: running {}", content_id, stage);
        let output = work.await.with_context(|| format!("{} stage failed", stage))?;

        self.store.put(kind, &content_id, &output).await?;
        run.status.stages.insert(stage, StageState::Completed);
        run.status.updated_at = Utc::now();
        self.store.put(RecordKind::Status, &content_id, &run.status).await?;
        run.plan.set_task(stage, StageState::Completed);
        self.store.put(RecordKind::Plan, &content_id, &run.plan).await?;
        self.store
            .log_transition(&content_id, Some(stage), "completed", None)
            .await?;
        Ok(output)
    }
}
