use std::sync::Arc;
use tracing::info;

use crate::llm::{ModelGateway, Role};
use crate::types::{ArticleDraft, ClassificationResult, ContentPlan, ContentType, ResearchResult};

/// Outline requested for one content type
#[derive(Debug)]
pub struct OutlineTemplate {
    pub brief: &'static str,
    pub sections: [&'static str; 7],
}

impl OutlineTemplate {
    pub fn render(&self) -> String {
        let mut out = format!("{} with these sections:\n", self.brief);
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, section));
        }
        out
    }
}

static TEMPLATES: &[(ContentType, OutlineTemplate)] = &[
    (
        ContentType::ProductLaunch,
        OutlineTemplate {
            brief: "Write an article about a new AI product or service launch",
            sections: [
                "Introduction to the new product/service",
                "Key features and capabilities",
                "How it compares to existing solutions",
                "Target markets and use cases",
                "Expert opinions on its potential impact",
                "Availability and pricing details (if available)",
                "Conclusion with future outlook",
            ],
        },
    ),
    (
        ContentType::ResearchPaper,
        OutlineTemplate {
            brief: "Write an article summarizing AI research findings",
            sections: [
                "Overview of the research and its significance",
                "Key findings and methodology",
                "Technical innovations presented",
                "Potential applications of the research",
                "Expert perspectives on the research",
                "Limitations and future work",
                "Conclusion on the research's impact on the field",
            ],
        },
    ),
    (
        ContentType::LegalCase,
        OutlineTemplate {
            brief: "Write an article about a legal development in AI",
            sections: [
                "Summary of the legal case or development",
                "Background on the parties involved",
                "Key legal issues or questions at stake",
                "Potential precedents or implications for AI",
                "Expert legal opinions",
                "Timeline of next steps in the case",
                "Broader impact on AI regulation and industry",
            ],
        },
    ),
    (
        ContentType::BusinessNews,
        OutlineTemplate {
            brief: "Write an article about a business development in AI",
            sections: [
                "Overview of the business announcement",
                "Key details about the companies involved",
                "Financial or strategic implications",
                "Market analysis and competitive context",
                "Expert opinions on the business move",
                "Future outlook for the companies involved",
                "Broader impact on the AI industry",
            ],
        },
    ),
    (
        ContentType::TechnicalUpdate,
        OutlineTemplate {
            brief: "Write an article about a technical advancement in AI",
            sections: [
                "Introduction to the technical update or improvement",
                "Technical details and advancements",
                "Performance improvements or new capabilities",
                "Development process and challenges overcome",
                "Potential applications and use cases",
                "Expert technical perspectives",
                "Future development roadmap",
            ],
        },
    ),
    (
        ContentType::OpinionPiece,
        OutlineTemplate {
            brief: "Write an analytical article about AI trends",
            sections: [
                "Introduction to the key opinion or analysis",
                "Context and background of the topic",
                "Main arguments or insights",
                "Supporting evidence or examples",
                "Counter-perspectives or considerations",
                "Implications for stakeholders",
                "Conclusion with forward-looking thoughts",
            ],
        },
    ),
    (
        ContentType::EventAnnouncement,
        OutlineTemplate {
            brief: "Write an article about an AI-related event",
            sections: [
                "Introduction to the event and its significance",
                "Key details (time, location, format)",
                "Notable speakers or participants",
                "Main themes or topics to be covered",
                "Target audience and benefits of attending",
                "How to participate or register",
                "Context of the event within the broader AI landscape",
            ],
        },
    ),
    (
        ContentType::TutorialGuide,
        OutlineTemplate {
            brief: "Write an informative article about using AI",
            sections: [
                "Introduction to the AI technique or tool",
                "Why this approach is useful or important",
                "Step-by-step guidance or explanation",
                "Best practices and recommendations",
                "Common challenges and solutions",
                "Examples or use cases",
                "Resources for further learning",
            ],
        },
    ),
];

static DEFAULT_TEMPLATE: OutlineTemplate = OutlineTemplate {
    brief: "Write an informative article about this AI-related topic",
    sections: [
        "Introduction to the topic",
        "Key information and details",
        "Context and significance",
        "Relevant stakeholders and perspectives",
        "Implications and impact",
        "Future outlook",
        "Conclusion",
    ],
};

pub fn template_for(content_type: ContentType) -> &'static OutlineTemplate {
    TEMPLATES
        .iter()
        .find(|(t, _)| *t == content_type)
        .map(|(_, template)| template)
        .unwrap_or(&DEFAULT_TEMPLATE)
}

/// Openers some models put before the article itself.
const PREAMBLE_MARKERS: &[&str] = &[
    "Here's an engaging article based on the research",
    "I'll create an engaging article",
    "CONTENT TYPE:",
    "SUBJECT MATTER:",
    "KEY ENTITIES:",
];

/// Strip a known preamble and make sure the article opens with a `#` title.
pub fn clean_article(reply: &str, fallback_title: &str) -> String {
    let mut article = reply.trim();

    if PREAMBLE_MARKERS.iter().any(|m| article.starts_with(m)) {
        if let Some(idx) = article.find('#') {
            article = &article[idx..];
        }
    }

    if article.starts_with('#') {
        return article.to_string();
    }

    let title = article
        .find("Title:")
        .map(|idx| {
            let rest = &article[idx + "Title:".len()..];
            rest.lines().next().unwrap_or_default().trim()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title);

    format!("# {}\n\n{}", title, article)
}

pub struct Writer {
    gateway: Arc<ModelGateway>,
}

impl Writer {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn write(
        &self,
        plan: &ContentPlan,
        research: &ResearchResult,
        classification: &ClassificationResult,
    ) -> ArticleDraft {
        let content_type = classification.content_type;
        info!("[{}] creating {} article with id {}", Role::Writer.name(), content_type, plan.content_id);

        let prompt = format!(
            "Write an engaging article based on this research and classification:

CONTENT TYPE: {content_type}

SUBJECT MATTER: {subject}

KEY ENTITIES: {entities}

TARGET AUDIENCE: {audience}

CONTENT PLAN:
{outline}

RESEARCH REPORT:
{report}

ARTICLE STRUCTURE:
{structure}
Create a well-structured article that:
1. Has an appropriate headline for this type of content
2. Accurately represents the subject matter and entities involved
3. Uses language and style appropriate for the target audience
4. Follows the structure provided for this content type
5. Incorporates information from the research report

The article should be informative yet accessible, and approximately 800-1000 words.

IMPORTANT: Start your response with the title preceded by \"# \" for markdown formatting.",
            subject = classification.subject_matter,
            entities = classification.key_entities.join(", "),
            audience = classification.target_audience,
            outline = plan.content_plan,
            report = research.research_report,
            structure = template_for(content_type).render(),
        );

        let generation = self.gateway.generate(Role::Writer, &prompt).await;
        ArticleDraft {
            content_id: plan.content_id.clone(),
            article_content: clean_article(&generation.text, &plan.original_update.title),
            content_type,
            status: "completed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_a_seven_section_outline() {
        for t in ContentType::ALL {
            let rendered = template_for(t).render();
            assert!(rendered.contains("7. "), "{t}");
        }
        assert!(template_for(ContentType::LegalCase).render().starts_with("Write an article about a legal development"));
        assert!(std::ptr::eq(template_for(ContentType::Other), &DEFAULT_TEMPLATE));
    }

    #[test]
    fn strips_known_preamble() {
        let reply = "Here's an engaging article based on the research:\n\n# Real Title\n\nBody";
        assert_eq!(clean_article(reply, "x"), "# Real Title\n\nBody");
    }

    #[test]
    fn title_line_becomes_heading() {
        let reply = "Title: NewCo Opens Its API\n\nBody text";
        assert!(clean_article(reply, "fallback").starts_with("# NewCo Opens Its API\n\n"));
    }

    #[test]
    fn update_title_is_last_resort() {
        let cleaned = clean_article("Just a body.", "NewCo launches LLM API");
        assert_eq!(cleaned, "# NewCo launches LLM API\n\nJust a body.");
    }
}
