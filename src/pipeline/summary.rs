//! Summary step: turn `markdown_content` into a summary via the generator.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::context::PipelineContext;
use super::executor::Step;
use crate::error::DeepReadError;
use crate::generate::TextGenerator;
use crate::prompts::{self, DEFAULT_STYLE};

/// Requires `markdown_content`; reads `style` and `custom_prompt`.
/// Produces `summary`, `summary_length`, `input_tokens` and `output_tokens`.
pub struct SummaryGenerateStep {
    generator: Arc<dyn TextGenerator>,
    prompts_dir: PathBuf,
}

impl SummaryGenerateStep {
    pub const NAME: &'static str = "generate summary";

    pub fn new(generator: Arc<dyn TextGenerator>, prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            prompts_dir: prompts_dir.into(),
        }
    }
}

#[async_trait]
impl Step for SummaryGenerateStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError> {
        let markdown = context.require_str(Self::NAME, "markdown_content")?;
        if markdown.trim().is_empty() {
            return Err(DeepReadError::missing_key(Self::NAME, "markdown_content"));
        }

        let style = context.get_str("style").unwrap_or(DEFAULT_STYLE);
        let custom = context.get_str("custom_prompt");
        let system = prompts::resolve_system_prompt(&self.prompts_dir, style, custom).await;
        info!("Generating summary (style: {}, {} chars in)", style, markdown.chars().count());

        let generation = self
            .generator
            .generate(&system, &prompts::document_message(markdown))
            .await?;

        let length = generation.text.chars().count();
        info!(
            "Summary: {} chars ({} input / {} output tokens)",
            length, generation.input_tokens, generation.output_tokens
        );

        Ok(PipelineContext::new()
            .with("summary", generation.text)
            .with("summary_length", length)
            .with("input_tokens", generation.input_tokens)
            .with("output_tokens", generation.output_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::Generation;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Capture {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextGenerator for Capture {
        async fn generate(
            &self,
            system: &str,
            document: &str,
        ) -> Result<Generation, DeepReadError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), document.to_string()));
            Ok(Generation {
                text: "## Summary".into(),
                input_tokens: 120,
                output_tokens: 8,
            })
        }
    }

    #[tokio::test]
    async fn sends_prompt_and_wrapped_document() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("detailed.md"), "DETAILED").unwrap();
        let capture = Arc::new(Capture::default());
        let step = SummaryGenerateStep::new(capture.clone(), tmp.path());

        let out = step
            .execute(&PipelineContext::new().with("markdown_content", "# Doc"))
            .await
            .unwrap();

        assert_eq!(out.get_str("summary"), Some("## Summary"));
        assert_eq!(out.get_u64("summary_length"), Some(10));
        assert_eq!(out.get_u64("input_tokens"), Some(120));
        assert_eq!(out.get_u64("output_tokens"), Some(8));
        let calls = capture.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            [("DETAILED".to_string(), "Document content:\n\n# Doc".to_string())]
        );
    }

    #[tokio::test]
    async fn custom_prompt_is_forwarded() {
        let tmp = TempDir::new().unwrap();
        let capture = Arc::new(Capture::default());
        let step = SummaryGenerateStep::new(capture.clone(), tmp.path());

        step.execute(
            &PipelineContext::new()
                .with("markdown_content", "# Doc")
                .with("custom_prompt", "Three bullets only"),
        )
        .await
        .unwrap();

        assert_eq!(capture.calls.lock().unwrap()[0].0, "Three bullets only");
    }

    #[tokio::test]
    async fn blank_markdown_is_rejected_before_generation() {
        let tmp = TempDir::new().unwrap();
        let capture = Arc::new(Capture::default());
        let step = SummaryGenerateStep::new(capture.clone(), tmp.path());

        let err = step
            .execute(&PipelineContext::new().with("markdown_content", "  \n "))
            .await
            .unwrap_err();

        assert!(matches!(err, DeepReadError::MissingContextKey { .. }));
        assert!(capture.calls.lock().unwrap().is_empty());
    }
}
