//! Load step: make `markdown_content` available from a file or URL.

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::PipelineContext;
use super::executor::Step;
use crate::error::DeepReadError;
use crate::retry::RetryPolicy;

/// Uses, in order, existing `markdown_content` (no-op), `markdown_path`, or
/// `markdown_url`. Produces `markdown_content` and `markdown_length`.
pub struct MarkdownLoadStep {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl MarkdownLoadStep {
    pub const NAME: &'static str = "load Markdown";

    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn fetch(&self, url: &str) -> Result<String, DeepReadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeepReadError::transport("Markdown download", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeepReadError::HttpStatus {
                operation: "Markdown download".into(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| DeepReadError::transport("Markdown download", e))
    }
}

#[async_trait]
impl Step for MarkdownLoadStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError> {
        if context.get_str("markdown_content").is_some() {
            debug!("Markdown already loaded");
            return Ok(PipelineContext::new());
        }

        let markdown = if let Some(path) = context.get_path("markdown_path") {
            if !path.is_file() {
                return Err(DeepReadError::FileNotFound { path });
            }
            info!("Reading Markdown from {}", path.display());
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| DeepReadError::io(&path, e))?
        } else if let Some(url) = context.get_str("markdown_url") {
            info!("Fetching Markdown from {}", url);
            self.retry
                .execute("Markdown download", || self.fetch(url))
                .await?
        } else {
            return Err(DeepReadError::missing_key(Self::NAME, "markdown_path"));
        };

        let length = markdown.chars().count();
        Ok(PipelineContext::new()
            .with("markdown_content", markdown)
            .with("markdown_length", length))
    }
}
