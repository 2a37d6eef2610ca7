//! Save step: persist the summary next to its source.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::context::PipelineContext;
use super::executor::Step;
use crate::error::DeepReadError;

const SUMMARY_FILENAME: &str = "summary.md";

/// Requires `summary`; reads `output_path` and `markdown_path`.
///
/// Without an explicit `output_path` the summary lands beside the Markdown
/// (`<dir of markdown_path>/summary.md`), else in `<output_dir>/summary.md`.
/// Produces `output_path`.
pub struct SaveSummaryStep {
    output_dir: PathBuf,
}

impl SaveSummaryStep {
    pub const NAME: &'static str = "save summary";

    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn target(&self, context: &PipelineContext) -> PathBuf {
        if let Some(path) = context.get_path("output_path") {
            return path;
        }
        context
            .get_path("markdown_path")
            .and_then(|md| md.parent().map(|dir| dir.join(SUMMARY_FILENAME)))
            .unwrap_or_else(|| self.output_dir.join(SUMMARY_FILENAME))
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, contents: String) -> Result<(), DeepReadError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let fail = |source| DeepReadError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(fail)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".summary")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(fail)?;
        tmp.write_all(contents.as_bytes()).map_err(fail)?;
        tmp.flush().map_err(fail)?;
        tmp.persist(&path).map_err(|e| fail(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| DeepReadError::Internal(format!("write task panicked: {e}")))?
}

#[async_trait]
impl Step for SaveSummaryStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError> {
        let summary = context.require_str(Self::NAME, "summary")?;
        let target = self.target(context);

        write_atomic(&target, summary.to_string()).await?;
        info!("Summary saved to {}", target.display());

        Ok(PipelineContext::new().with("output_path", target.to_string_lossy().to_string()))
    }
}
