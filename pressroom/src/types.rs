use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A topic-relevant feed entry accepted by the source monitor. Identified by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_date: DateTime<Utc>,
    pub content_snippet: String,
    pub analysis: String,
}

/// The nine article categories a classification may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    ProductLaunch,
    ResearchPaper,
    LegalCase,
    BusinessNews,
    TechnicalUpdate,
    OpinionPiece,
    EventAnnouncement,
    TutorialGuide,
    Other,
}

impl ContentType {
    pub const ALL: [ContentType; 9] = [
        ContentType::ProductLaunch,
        ContentType::ResearchPaper,
        ContentType::LegalCase,
        ContentType::BusinessNews,
        ContentType::TechnicalUpdate,
        ContentType::OpinionPiece,
        ContentType::EventAnnouncement,
        ContentType::TutorialGuide,
        ContentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::ProductLaunch => "product_launch",
            ContentType::ResearchPaper => "research_paper",
            ContentType::LegalCase => "legal_case",
            ContentType::BusinessNews => "business_news",
            ContentType::TechnicalUpdate => "technical_update",
            ContentType::OpinionPiece => "opinion_piece",
            ContentType::EventAnnouncement => "event_announcement",
            ContentType::TutorialGuide => "tutorial_guide",
            ContentType::Other => "other",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ContentType::ProductLaunch => "New AI product or service announcement",
            ContentType::ResearchPaper => "Academic or scientific research about AI",
            ContentType::LegalCase => "Legal news, lawsuits, regulations related to AI",
            ContentType::BusinessNews => "Business developments, mergers, investments in AI companies",
            ContentType::TechnicalUpdate => "Technical advancements or improvements in AI",
            ContentType::OpinionPiece => "Commentary or analysis about AI trends",
            ContentType::EventAnnouncement => "Conferences, webinars, competitions related to AI",
            ContentType::TutorialGuide => "How-to content or educational material about AI",
            ContentType::Other => "Miscellaneous AI news",
        }
    }

    /// Lenient label parsing; anything unrecognised becomes `Other`.
    pub fn parse_label(label: &str) -> ContentType {
        let normalized = label
            .trim()
            .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'' | '`' | '*' | '.'))
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(ContentType::Other)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Research,
    Writing,
    FactCheck,
    Proofreading,
    Publishing,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Classification,
        Stage::Research,
        Stage::Writing,
        Stage::FactCheck,
        Stage::Proofreading,
        Stage::Publishing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classification => "classification",
            Stage::Research => "research",
            Stage::Writing => "writing",
            Stage::FactCheck => "fact_check",
            Stage::Proofreading => "proofreading",
            Stage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: Stage,
    pub status: StageState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    PlanCreated,
    Processing,
    Completed,
    Error,
}

/// One end-to-end article production run, created once per update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPlan {
    pub content_id: String,
    pub original_update: Update,
    pub content_plan: String,
    pub status: PlanStatus,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
}

impl ContentPlan {
    pub fn set_task(&mut self, stage: Stage, state: StageState) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.task_type == stage) {
            task.status = state;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub content_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub key_entities: Vec<String>,
    pub subject_matter: String,
    pub target_audience: String,
    pub reasoning: String,
    /// Unparsed model reply
    pub raw_reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchMaterial {
    pub source: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub content_id: String,
    pub research_report: String,
    pub sources: Vec<String>,
    pub materials: Vec<ResearchMaterial>,
    pub status: ResearchStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub content_id: String,
    pub article_content: String,
    pub content_type: ContentType,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCheckStatus {
    Passed,
    NeedsRevision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCheckResult {
    pub content_id: String,
    pub fact_check_report: String,
    pub findings: Vec<String>,
    pub status: FactCheckStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofreadResult {
    pub content_id: String,
    pub original_article: String,
    pub edited_article: String,
    pub editing_notes: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Blog,
    Medium,
    Linkedin,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Blog, Platform::Medium, Platform::Linkedin];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Blog => "blog",
            Platform::Medium => "medium",
            Platform::Linkedin => "linkedin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformVariant {
    pub format: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub social_post: String,
    /// Model reply kept verbatim when it was not structured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationPackage {
    pub content_id: String,
    pub title: String,
    pub article_content: String,
    pub metadata: PublicationMetadata,
    pub publication_date: DateTime<Utc>,
    pub platforms: BTreeMap<Platform, PlatformVariant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Processing,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

/// Externally visible progress of one content run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub content_id: String,
    pub status: RunStatus,
    pub stages: BTreeMap<Stage, StageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineStatus {
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            status: RunStatus::Processing,
            stages: Stage::ORDER.iter().map(|s| (*s, StageState::Pending)).collect(),
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn stage(&self, stage: Stage) -> StageState {
        self.stages.get(&stage).copied().unwrap_or(StageState::Pending)
    }
}
