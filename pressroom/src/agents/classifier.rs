use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::{parse_structured, ModelGateway, Role};
use crate::scraping::take_chars;
use crate::types::{ClassificationResult, ContentType};

const DEFAULT_SUBJECT: &str = "AI technology";
const DEFAULT_AUDIENCE: &str = "AI professionals and enthusiasts";

/// Fields recovered from a classification reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClassification {
    pub content_type: ContentType,
    pub key_entities: Vec<String>,
    pub subject_matter: String,
    pub target_audience: String,
    pub reasoning: String,
}

impl Default for ParsedClassification {
    fn default() -> Self {
        Self {
            content_type: ContentType::Other,
            key_entities: Vec::new(),
            subject_matter: DEFAULT_SUBJECT.to_string(),
            target_audience: DEFAULT_AUDIENCE.to_string(),
            reasoning: String::new(),
        }
    }
}

#[derive(Deserialize)]
struct StructuredReply {
    content_type: String,
    #[serde(default)]
    key_entities: Vec<String>,
    subject_matter: Option<String>,
    target_audience: Option<String>,
    reasoning: Option<String>,
}

pub struct Classifier {
    gateway: Arc<ModelGateway>,
}

impl Classifier {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn classify(&self, content_id: &str, title: &str, snippet: &str) -> ClassificationResult {
        info!("[{}] analyzing: {}", Role::Classifier.name(), title);

        let prompt = classification_prompt(title, snippet);
        let generation = self.gateway.generate(Role::Classifier, &prompt).await;
        let parsed = if generation.fallback {
            ParsedClassification::default()
        } else {
            parse_reply(&generation.text)
        };
        debug!("classification for {}: {:?}", content_id, parsed.content_type);

        ClassificationResult {
            content_id: content_id.to_string(),
            title: title.to_string(),
            content_type: parsed.content_type,
            key_entities: parsed.key_entities,
            subject_matter: parsed.subject_matter,
            target_audience: parsed.target_audience,
            reasoning: parsed.reasoning,
            raw_reply: generation.text,
        }
    }
}

fn classification_prompt(title: &str, snippet: &str) -> String {
    let categories = ContentType::ALL
        .iter()
        .map(|t| format!("- {}: {}", t.as_str(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Please analyze this news article and classify it according to its type:

TITLE: {title}

CONTENT SNIPPET:
{snippet}...

Classify this article into ONE of the following categories:
{categories}

Also identify:
1. Key entities (people, companies, technologies) mentioned
2. Main subject matter or focus of the article
3. Target audience

Reply with a single JSON object and nothing else, using exactly these keys:
content_type (one category from the list), key_entities (array of strings),
subject_matter, target_audience, reasoning (short explanation of the classification).",
        snippet = take_chars(snippet, 1000)
    )
}

/// Structured reply first, then `LABEL: value` lines, then defaults.
pub fn parse_reply(reply: &str) -> ParsedClassification {
    if let Some(structured) = parse_structured::<StructuredReply>(reply) {
        let defaults = ParsedClassification::default();
        return ParsedClassification {
            content_type: ContentType::parse_label(&structured.content_type),
            key_entities: structured
                .key_entities
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            subject_matter: non_empty(structured.subject_matter).unwrap_or(defaults.subject_matter),
            target_audience: non_empty(structured.target_audience).unwrap_or(defaults.target_audience),
            reasoning: structured.reasoning.unwrap_or_default(),
        };
    }
    parse_labeled_lines(reply)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_labeled_lines(reply: &str) -> ParsedClassification {
    let mut parsed = ParsedClassification::default();
    for line in reply.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("CONTENT_TYPE:") {
            parsed.content_type = ContentType::parse_label(value);
        } else if let Some(value) = line.strip_prefix("KEY_ENTITIES:") {
            parsed.key_entities = value
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        } else if let Some(value) = line.strip_prefix("SUBJECT_MATTER:") {
            parsed.subject_matter = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("TARGET_AUDIENCE:") {
            parsed.target_audience = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("REASONING:") {
            parsed.reasoning = value.trim().to_string();
        }
    }
    parsed
}
