use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::llm::{parse_structured, ModelGateway, Role};
use crate::types::{ArticleDraft, FactCheckResult, FactCheckStatus, ProofreadResult, ResearchResult};

const PASS_PHRASES: &[&str] = &["no significant issues", "no factual inaccuracies"];
const EDITED_MARKER: &str = "EDITED ARTICLE";
const NOTES_MARKER: &str = "EDITING NOTES";

#[derive(Deserialize)]
struct StructuredVerdict {
    verdict: String,
    #[serde(default)]
    findings: Vec<String>,
}

/// Verdict and findings of a fact-check reply.
pub fn assess_fact_check(reply: &str) -> (FactCheckStatus, Vec<String>) {
    if let Some(structured) = parse_structured::<StructuredVerdict>(reply) {
        let verdict = structured.verdict.trim().to_lowercase();
        let status = if verdict == "passed" || verdict == "pass" {
            FactCheckStatus::Passed
        } else {
            FactCheckStatus::NeedsRevision
        };
        return (status, structured.findings);
    }

    let lower = reply.to_lowercase();
    let status = if PASS_PHRASES.iter().any(|p| lower.contains(p)) {
        FactCheckStatus::Passed
    } else {
        FactCheckStatus::NeedsRevision
    };
    (status, list_items(reply))
}

fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let digits = line.find(|c: char| !c.is_ascii_digit())?;
                    (digits > 0).then(|| line[digits..].strip_prefix(". ")).flatten()
                })
        })
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[derive(Deserialize)]
struct StructuredEdit {
    edited_article: String,
    #[serde(default)]
    editing_notes: String,
}

/// Split a proofreading reply into (edited article, notes).
/// Replies without a usable edit leave the article untouched and keep the whole reply as notes.
pub fn split_proofread(reply: &str, original: &str) -> (String, String) {
    if let Some(edit) = parse_structured::<StructuredEdit>(reply) {
        let edited = edit.edited_article.trim();
        if !edited.is_empty() {
            return (edited.to_string(), edit.editing_notes);
        }
    }

    if reply.contains(EDITED_MARKER) {
        if let Some((article_part, notes_part)) = reply.split_once(NOTES_MARKER) {
            let edited = tidy_edited(article_part);
            if !edited.is_empty() {
                return (edited, format!("{}{}", NOTES_MARKER, notes_part));
            }
        }
    }

    (original.to_string(), reply.to_string())
}

/// Drop the marker and the decoration lines around it (`**:**`, `##`, `---`).
fn tidy_edited(part: &str) -> String {
    let text = part.replace(EDITED_MARKER, "");
    let noise = |line: &str| {
        line.trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '*' | '#' | '-' | '='))
            .is_empty()
    };

    let mut lines: Vec<&str> = text.lines().collect();
    while lines.first().is_some_and(|l| noise(l)) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| noise(l)) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

pub struct FactChecker {
    gateway: Arc<ModelGateway>,
}

impl FactChecker {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn review(&self, draft: &ArticleDraft, research: &ResearchResult) -> FactCheckResult {
        info!("[{}] reviewing article {}", Role::FactChecker.name(), draft.content_id);

        let prompt = format!(
            "Please fact-check this article against the research report.

ARTICLE:
{article}

RESEARCH REPORT:
{report}

Review the article for:
1. Any factual inaccuracies or claims not supported by the research
2. Misleading statements or exaggerations
3. Missing important context or qualifications
4. Incorrect attribution of opinions or statements

Reply with a single JSON object with two keys: \"verdict\" (\"passed\" when there are no
significant issues, otherwise \"needs_revision\") and \"findings\" (array of strings, each a
specific correction or suggestion).",
            article = draft.article_content,
            report = research.research_report,
        );

        let generation = self.gateway.generate(Role::FactChecker, &prompt).await;
        let (status, findings) = if generation.fallback {
            (FactCheckStatus::NeedsRevision, Vec::new())
        } else {
            assess_fact_check(&generation.text)
        };
        info!("fact check for {}: {:?} ({} findings)", draft.content_id, status, findings.len());

        FactCheckResult {
            content_id: draft.content_id.clone(),
            fact_check_report: generation.text,
            findings,
            status,
        }
    }
}

pub struct Proofreader {
    gateway: Arc<ModelGateway>,
}

impl Proofreader {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn review(&self, draft: &ArticleDraft, fact_check: &FactCheckResult) -> ProofreadResult {
        info!("[{}] reviewing article {}", Role::Proofreader.name(), draft.content_id);

        let corrections = if fact_check.status == FactCheckStatus::NeedsRevision && !fact_check.findings.is_empty() {
            format!(
                "\nFACT-CHECK FINDINGS TO ADDRESS:\n{}\n",
                fact_check
                    .findings
                    .iter()
                    .map(|f| format!("- {}", f))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        } else {
            String::new()
        };

        let prompt = format!(
            "Please proofread and edit this article for grammar, style, clarity, and readability:

ARTICLE:
{article}
{corrections}
Review for:
1. Grammar and spelling errors
2. Awkward or unclear phrasing
3. Consistency in tone and style
4. Appropriate transitions between sections
5. Overall readability and flow

Reply with a single JSON object with two keys: \"edited_article\" (the full improved article in
markdown, starting with its \"# \" title) and \"editing_notes\" (explanations of major changes).",
            article = draft.article_content,
        );

        let generation = self.gateway.generate(Role::Proofreader, &prompt).await;
        let (edited_article, editing_notes) = if generation.fallback {
            (draft.article_content.clone(), generation.text)
        } else {
            split_proofread(&generation.text, &draft.article_content)
        };

        ProofreadResult {
            content_id: draft.content_id.clone(),
            original_article: draft.article_content.clone(),
            edited_article,
            editing_notes,
            status: "completed".to_string(),
        }
    }
}
