use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::llm::{parse_structured, ModelGateway, Role};
use crate::scraping::take_chars;
use crate::types::{Platform, PlatformVariant, PublicationMetadata, PublicationPackage};

pub const DEFAULT_TITLE: &str = "AI Technology Update";
const DEFAULT_IMPORT_BASE_URL: &str = "https://example.com";

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub output_dir: PathBuf,
    pub import_base_url: String,
}

impl PublishSettings {
    pub fn from_config(config: &common::Config) -> Self {
        Self {
            output_dir: PathBuf::from(config.output_dir()),
            import_base_url: config
                .publishing
                .as_ref()
                .and_then(|p| p.import_base_url.clone())
                .unwrap_or_else(|| DEFAULT_IMPORT_BASE_URL.to_string()),
        }
    }
}

/// Files written for one publication
#[derive(Debug, Clone, Serialize)]
pub struct PublishedFiles {
    pub json: PathBuf,
    pub platforms: BTreeMap<Platform, PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Publication {
    pub package: PublicationPackage,
    pub files: PublishedFiles,
}

/// Text after the first `# ` heading line, or the default title.
pub fn extract_title(article: &str) -> String {
    article
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string()
}

/// Structured metadata, or the raw reply when it carries none.
pub fn parse_metadata(reply: &str) -> PublicationMetadata {
    match parse_structured::<PublicationMetadata>(reply) {
        Some(metadata) if !metadata.tags.is_empty() || !metadata.description.is_empty() => PublicationMetadata {
            raw: None,
            ..metadata
        },
        _ => PublicationMetadata {
            raw: Some(reply.to_string()),
            ..PublicationMetadata::default()
        },
    }
}

pub struct Publisher {
    gateway: Arc<ModelGateway>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(gateway: Arc<ModelGateway>, settings: PublishSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn publish(&self, content_id: &str, article: &str) -> Result<Publication> {
        let title = extract_title(article);
        info!("[{}] preparing article for publication: {}", Role::Publisher.name(), title);

        let metadata_prompt = format!(
            "Generate appropriate metadata for this article:

TITLE: {title}

ARTICLE SNIPPET:
{snippet}...

Reply with a single JSON object with these keys:
\"tags\" (array of 5-7 relevant tags/keywords), \"description\" (at most 150 characters),
\"social_post\" (suggested social media post, at most 280 characters).",
            snippet = take_chars(article, 500),
        );
        let metadata_reply = self.gateway.generate(Role::Publisher, &metadata_prompt).await;
        let metadata = if metadata_reply.fallback {
            PublicationMetadata {
                raw: Some(metadata_reply.text),
                ..PublicationMetadata::default()
            }
        } else {
            parse_metadata(&metadata_reply.text)
        };

        let mut platforms = BTreeMap::new();
        for platform in Platform::ALL {
            let variant = match platform {
                Platform::Blog => PlatformVariant {
                    format: "markdown".to_string(),
                    content: article.to_string(),
                    import_url: None,
                },
                Platform::Medium => PlatformVariant {
                    format: "markdown".to_string(),
                    content: article.to_string(),
                    import_url: Some(format!(
                        "{}/articles/{}",
                        self.settings.import_base_url.trim_end_matches('/'),
                        content_id
                    )),
                },
                Platform::Linkedin => PlatformVariant {
                    format: "text".to_string(),
                    content: self.linkedin_summary(&title, article).await,
                    import_url: None,
                },
            };
            platforms.insert(platform, variant);
        }

        let package = PublicationPackage {
            content_id: content_id.to_string(),
            title,
            article_content: article.to_string(),
            metadata,
            publication_date: Utc::now(),
            platforms,
        };

        let files = self.write_files(&package).await?;
        info!("publication {} written to {}", content_id, files.json.display());
        Ok(Publication { package, files })
    }

    async fn linkedin_summary(&self, title: &str, article: &str) -> String {
        let prompt = format!(
            "Create a shortened version of this article suitable for LinkedIn:

ORIGINAL ARTICLE TITLE: {title}

ORIGINAL ARTICLE:
{excerpt}...

Create a 300-500 word professional summary that highlights the key points
while maintaining a tone appropriate for a professional network.",
            excerpt = take_chars(article, 1000),
        );
        self.gateway.generate(Role::Publisher, &prompt).await.text
    }

    async fn write_files(&self, package: &PublicationPackage) -> Result<PublishedFiles> {
        let dir = self.settings.output_dir.join("publications");
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let json_path = dir.join(format!("publication_{}.json", package.content_id));
        let body = serde_json::to_string_pretty(package).context("failed to serialize publication")?;
        tokio::fs::write(&json_path, body)
            .await
            .with_context(|| format!("failed to write {}", json_path.display()))?;

        let mut platforms = BTreeMap::new();
        for (platform, variant) in &package.platforms {
            let platform_dir = dir.join(platform.as_str());
            tokio::fs::create_dir_all(&platform_dir)
                .await
                .with_context(|| format!("failed to create {}", platform_dir.display()))?;

            let ext = if *platform == Platform::Linkedin { "txt" } else { "md" };
            let path = platform_dir.join(format!("{}.{}", package.content_id, ext));
            tokio::fs::write(&path, &variant.content)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            platforms.insert(*platform, path);
        }

        Ok(PublishedFiles {
            json: json_path,
            platforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_comes_from_first_heading() {
        assert_eq!(extract_title("# NewCo Opens Up \n\nBody\n# Second"), "NewCo Opens Up");
        assert_eq!(extract_title("Intro\n## Sub\n# Late Title"), "Late Title");
        assert_eq!(extract_title("No heading at all"), DEFAULT_TITLE);
        assert_eq!(extract_title("#NoSpace"), DEFAULT_TITLE);
    }

    #[test]
    fn metadata_keeps_raw_reply_when_unstructured() {
        let parsed = parse_metadata(r#"{"tags": ["ai", "api"], "description": "NewCo API", "social_post": "Out now"}"#);
        assert_eq!(parsed.tags, vec!["ai", "api"]);
        assert!(parsed.raw.is_none());

        let raw = parse_metadata("Tags: ai, api");
        assert!(raw.tags.is_empty());
        assert_eq!(raw.raw.as_deref(), Some("Tags: ai, api"));
    }

    #[tokio::test]
    async fn offline_publication_writes_every_platform() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = Publisher::new(
            Arc::new(ModelGateway::offline()),
            PublishSettings {
                output_dir: dir.path().to_path_buf(),
                import_base_url: "https://news.example.org/".to_string(),
            },
        );

        let publication = publisher.publish("id1", "# Title\n\nBody").await.expect("publish");
        let package = &publication.package;
        assert_eq!(package.title, "Title");
        assert_eq!(package.platforms.len(), 3);
        assert_eq!(
            package.platforms[&Platform::Medium].import_url.as_deref(),
            Some("https://news.example.org/articles/id1")
        );
        assert!(!package.platforms[&Platform::Linkedin].content.is_empty());
        assert!(publication.files.json.exists());
        assert!(dir.path().join("publications/linkedin/id1.txt").exists());
        assert!(dir.path().join("publications/blog/id1.md").exists());
    }
}
