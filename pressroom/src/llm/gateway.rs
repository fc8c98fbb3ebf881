//! Model gateway shared by every pipeline stage.
//!
//! The gateway prepends the stage's system prompt, retries transient provider failures with
//! exponential backoff, and degrades to deterministic canned text when no provider is
//! configured or every attempt failed. Callers never see a provider error.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{LlmProvider, LlmRequest};

/// Pipeline role issuing a prompt. Selects the system prompt and the fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Classifier,
    Researcher,
    Writer,
    FactChecker,
    Proofreader,
    Publisher,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Classifier => "Content Classification Agent",
            Role::Researcher => "Research Agent",
            Role::Writer => "Writing Agent",
            Role::FactChecker => "Fact Check Agent",
            Role::Proofreader => "Proofreading Agent",
            Role::Publisher => "Publishing Agent",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Role::Classifier => "You are a specialized content classification agent in a content creation \
                pipeline. Your task is to analyze news articles and determine their type and subject \
                matter to ensure appropriate content creation strategies are used.",
            Role::Researcher => "You are a specialized research agent in a content creation pipeline. \
                Your task is to analyze a topic and the material gathered from multiple sources. \
                Organize the information into key findings, relevant background, statistics, and \
                expert opinions. Be thorough but concise.",
            Role::Writer => "You are a specialized writing agent in a content creation pipeline. Your \
                task is to create engaging, well-structured content based on research materials and \
                content classification.",
            Role::FactChecker => "You are a specialized fact-checking agent in a content creation \
                pipeline. Review article content against research materials, identify any \
                inaccuracies, and ensure all claims are supported by evidence.",
            Role::Proofreader => "You are a specialized proofreading agent in a content creation \
                pipeline. Review article content for grammar, style, clarity, and readability while \
                maintaining the original voice and tone.",
            Role::Publisher => "You are a specialized publishing agent in a content creation pipeline. \
                Prepare content for publication by creating metadata, formatting for different \
                platforms, and generating promotion materials.",
        }
    }

    /// Deterministic reply used when the endpoint cannot answer.
    pub fn fallback_text(self, prompt: &str) -> String {
        let preview: Vec<&str> = prompt.split_whitespace().take(100).collect();
        match self {
            Role::Researcher => format!(
                "Key Facts and Findings:\n\
                 - This is a fallback research response\n\
                 - The topic appears to be about {}\n\
                 - Multiple sources were consulted\n\n\
                 Background and Context:\n\
                 - This technology is part of recent developments\n\
                 - Several organizations are involved in this space\n\n\
                 Expert Opinions:\n\
                 - Experts generally view this development as significant\n\
                 - There are differing perspectives on implementation\n\n\
                 Statistics and Data:\n\
                 - Limited quantitative data is available\n\
                 - Early metrics suggest promising results\n\n\
                 Potential Implications:\n\
                 - This could affect the industry in several ways\n\
                 - Users may see new capabilities in related applications\n",
                preview.iter().take(5).copied().collect::<Vec<_>>().join(" ")
            ),
            Role::Writer => FALLBACK_ARTICLE.to_string(),
            _ => format!(
                "This is a fallback response from {} regarding: {}...",
                self.name(),
                preview.join(" ")
            ),
        }
    }
}

const FALLBACK_ARTICLE: &str = "# Breaking News: Important Development in AI Technology

## Introduction
A significant development has recently emerged in the AI landscape, drawing attention from industry experts and users alike. This article explores the key aspects of this development and what it means for the future.

## Key Features
The technology represents an important step forward in how AI systems can be implemented and utilized. While still in its early stages, the technology shows promising capabilities that could transform several industries.

## Expert Analysis
Industry experts have weighed in on this development, with many noting its potential significance. \"This could represent a shift in how we approach certain AI problems,\" noted one researcher familiar with the technology.

## Implications
For users and businesses, this development may lead to more powerful and accessible AI tools. The technology's ability to handle complex tasks offers new possibilities for innovation.

## Conclusion
As this technology continues to evolve, we'll be monitoring its progress and impact. The coming months will likely reveal more about its practical applications and long-term significance.
";

/// Bounded retry with exponential backoff and jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (2-based: the first retry waits `base_delay`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)));
        let jitter_cap = exp.as_millis() as u64 / 4;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Text produced by the gateway
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// True when `text` is canned fallback rather than a model reply
    pub fallback: bool,
}

pub struct ModelGateway {
    provider: Option<Arc<dyn LlmProvider>>,
    retry: RetryPolicy,
}

impl ModelGateway {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        if provider.is_none() {
            warn!("No model credential configured; stages will use fallback responses");
        }
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    /// Gateway with no provider: every call answers with fallback text.
    pub fn offline() -> Self {
        Self::new(None)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn generate(&self, role: Role, prompt: &str) -> Generation {
        let Some(provider) = &self.provider else {
            info!("[{}] no model credential, using fallback response", role.name());
            return Generation {
                text: role.fallback_text(prompt),
                fallback: true,
            };
        };

        let full_prompt = format!("{}\n\n{}", role.system_prompt(), prompt);
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = self.retry.delay_for(attempt);
                info!(
                    "[{}] retrying model request (attempt {}/{}) after {:?}",
                    role.name(),
                    attempt,
                    attempts,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            match provider.generate(LlmRequest::new(full_prompt.clone())).await {
                Ok(response) => {
                    info!(
                        "[{}] model reply received: {} chars, {} tokens",
                        role.name(),
                        response.content.len(),
                        response.usage.total_tokens
                    );
                    return Generation {
                        text: response.content,
                        fallback: false,
                    };
                }
                Err(e) => {
                    warn!("[{}] model request failed (attempt {}/{}): {:#}", role.name(), attempt, attempts, e);
                }
            }
        }

        warn!("[{}] model unavailable after {} attempts, using fallback response", role.name(), attempts);
        Generation {
            text: role.fallback_text(prompt),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_fallback_starts_with_title() {
        assert!(Role::Writer.fallback_text("anything").starts_with("# "));
    }

    #[test]
    fn generic_fallback_names_the_role() {
        let text = Role::FactChecker.fallback_text("check this article please");
        assert!(text.starts_with("This is a fallback response from Fact Check Agent"));
        assert!(text.contains("check this article please"));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        let second = policy.delay_for(2);
        let fourth = policy.delay_for(4);
        assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(125));
        assert!(fourth >= Duration::from_millis(400) && fourth <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn offline_gateway_reports_fallback() {
        let gateway = ModelGateway::offline();
        let generation = gateway.generate(Role::Classifier, "classify").await;
        assert!(generation.fallback);
        assert!(!gateway.is_available());
    }
}
