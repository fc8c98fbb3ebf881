//! The six content stages, each a thin prompt/parse wrapper around the model gateway.

use anyhow::Result;
use std::sync::Arc;

use crate::llm::ModelGateway;
use crate::pipeline::ContentStages;
use crate::scraping::{HttpPageFetcher, PageFetcher};
use crate::search::{DuckDuckGoSearch, SearchProvider};
use crate::types::{
    ArticleDraft, ClassificationResult, ContentPlan, FactCheckResult, ProofreadResult, PublicationPackage,
    ResearchResult,
};

pub mod classifier;
pub mod publisher;
pub mod researcher;
pub mod review;
pub mod writer;

pub use classifier::Classifier;
pub use publisher::{PublishSettings, Publisher};
pub use researcher::{ResearchSettings, Researcher};
pub use review::{FactChecker, Proofreader};
pub use writer::Writer;

/// Production stage set
pub struct Agents {
    pub classifier: Classifier,
    pub researcher: Researcher,
    pub writer: Writer,
    pub fact_checker: FactChecker,
    pub proofreader: Proofreader,
    pub publisher: Publisher,
}

impl Agents {
    pub fn new(
        gateway: Arc<ModelGateway>,
        search: Arc<dyn SearchProvider>,
        pages: Arc<dyn PageFetcher>,
        research: ResearchSettings,
        publishing: PublishSettings,
    ) -> Self {
        Self {
            classifier: Classifier::new(gateway.clone()),
            researcher: Researcher::new(gateway.clone(), search, pages, research),
            writer: Writer::new(gateway.clone()),
            fact_checker: FactChecker::new(gateway.clone()),
            proofreader: Proofreader::new(gateway.clone()),
            publisher: Publisher::new(gateway, publishing),
        }
    }

    /// Agents backed by the DuckDuckGo search adapter and the readability page fetcher.
    pub fn from_config(config: &common::Config, gateway: Arc<ModelGateway>) -> Result<Self> {
        let timeout = config.fetch_timeout_seconds();
        let user_agent = config.user_agent();
        let search_url = config
            .research
            .as_ref()
            .and_then(|r| r.search_url.clone())
            .unwrap_or_else(|| common::DEFAULT_SEARCH_URL.to_string());

        let search = DuckDuckGoSearch::new(search_url, timeout, &user_agent)?;
        let pages = HttpPageFetcher::new(timeout, &user_agent)?;
        Ok(Self::new(
            gateway,
            Arc::new(search),
            Arc::new(pages),
            ResearchSettings::from_config(config),
            PublishSettings::from_config(config),
        ))
    }
}

#[async_trait::async_trait]
impl ContentStages for Agents {
    async fn classify(&self, plan: &ContentPlan) -> Result<ClassificationResult> {
        let update = &plan.original_update;
        Ok(self
            .classifier
            .classify(&plan.content_id, &update.title, &update.content_snippet)
            .await)
    }

    async fn research(&self, plan: &ContentPlan, classification: &ClassificationResult) -> Result<ResearchResult> {
        Ok(self.researcher.research(plan, classification).await)
    }

    async fn write(
        &self,
        plan: &ContentPlan,
        research: &ResearchResult,
        classification: &ClassificationResult,
    ) -> Result<ArticleDraft> {
        Ok(self.writer.write(plan, research, classification).await)
    }

    async fn fact_check(&self, draft: &ArticleDraft, research: &ResearchResult) -> Result<FactCheckResult> {
        Ok(self.fact_checker.review(draft, research).await)
    }

    async fn proofread(&self, draft: &ArticleDraft, fact_check: &FactCheckResult) -> Result<ProofreadResult> {
        Ok(self.proofreader.review(draft, fact_check).await)
    }

    async fn publish(&self, proofread: &ProofreadResult) -> Result<PublicationPackage> {
        let publication = self
            .publisher
            .publish(&proofread.content_id, &proofread.edited_article)
            .await?;
        Ok(publication.package)
    }
}
