//! Parse step: run the uploaded PDF through the extraction service.

use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

use super::context::PipelineContext;
use super::executor::Step;
use crate::error::DeepReadError;
use crate::extract::ExtractionClient;

/// Requires `pdf_raw_url`; reads `original_filename` when present.
///
/// Always produces `task_id`. When the task yielded an archive it also
/// produces `extract_dir`, `markdown_path`, `markdown_content` and
/// `markdown_length`.
pub struct DocumentParseStep {
    client: ExtractionClient,
}

impl DocumentParseStep {
    pub const NAME: &'static str = "parse PDF";

    pub fn new(client: ExtractionClient) -> Self {
        Self { client }
    }
}

/// Name for the extraction folder: the original file stem, else the URL stem.
fn document_name(context: &PipelineContext, raw_url: &str) -> String {
    if let Some(name) = context.get_str("original_filename") {
        return name.to_string();
    }
    let last = raw_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Step for DocumentParseStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError> {
        let raw_url = context.require_str(Self::NAME, "pdf_raw_url")?;
        let name = document_name(context, raw_url);

        let artifact = self.client.extract(raw_url, &name).await?;
        let mut output = PipelineContext::new().with("task_id", artifact.task_id.clone());

        let (Some(extract_dir), Some(markdown_path)) =
            (artifact.extract_dir, artifact.markdown_path)
        else {
            warn!("Task {} produced no archive; no Markdown available", artifact.task_id);
            return Ok(output);
        };

        let markdown = tokio::fs::read_to_string(&markdown_path)
            .await
            .map_err(|e| DeepReadError::io(&markdown_path, e))?;
        let length = markdown.chars().count();
        info!("Markdown: {} ({} chars)", markdown_path.display(), length);

        output.insert("extract_dir", extract_dir.to_string_lossy().to_string());
        output.insert("markdown_path", markdown_path.to_string_lossy().to_string());
        output.insert("markdown_content", markdown);
        output.insert("markdown_length", length);
        Ok(output)
    }
}
