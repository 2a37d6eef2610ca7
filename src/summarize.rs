//! Pipeline factories and the top-level [`process`] entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::DeepReadConfig;
use crate::error::DeepReadError;
use crate::extract::ExtractionClient;
use crate::generate::{LlmTextGenerator, TextGenerator};
use crate::pipeline::{
    DocumentParseStep, MarkdownLoadStep, PdfUploadStep, Pipeline, PipelineContext, PipelineRun,
    SaveSummaryStep, SummaryGenerateStep,
};
use crate::prompts::DEFAULT_STYLE;
use crate::upload::ContentAddressedUploader;

/// What a run should do with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Choose by extension: `.pdf` runs the full pipeline, `.md` only summarises.
    #[default]
    Full,
    /// Upload and extract a PDF, stop before summarising.
    Parse,
    /// Summarise an existing Markdown file.
    Summarize,
}

/// Per-run summary settings.
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    /// Prompt style. `None` means `detailed`.
    pub style: Option<String>,
    /// Replaces the style prompt entirely.
    pub custom_prompt: Option<String>,
    /// Where to write the summary instead of the default location.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Full,
    Parse,
    Summary,
}

/// upload → parse → summary → save
pub fn full_pipeline(
    config: &DeepReadConfig,
    client: &reqwest::Client,
    generator: Arc<dyn TextGenerator>,
) -> Pipeline {
    Pipeline::new("full")
        .add_step(PdfUploadStep::new(ContentAddressedUploader::new(config, client.clone())))
        .add_step(DocumentParseStep::new(ExtractionClient::new(config, client.clone())))
        .add_step(SummaryGenerateStep::new(generator, config.prompts_dir.clone()))
        .add_step(SaveSummaryStep::new(config.output_dir.clone()))
        .with_progress(config.progress_callback.clone())
}

/// upload → parse
pub fn parse_pipeline(config: &DeepReadConfig, client: &reqwest::Client) -> Pipeline {
    Pipeline::new("parse")
        .add_step(PdfUploadStep::new(ContentAddressedUploader::new(config, client.clone())))
        .add_step(DocumentParseStep::new(ExtractionClient::new(config, client.clone())))
        .with_progress(config.progress_callback.clone())
}

/// load Markdown → summary → save
pub fn summary_pipeline(
    config: &DeepReadConfig,
    client: &reqwest::Client,
    generator: Arc<dyn TextGenerator>,
) -> Pipeline {
    Pipeline::new("summary")
        .add_step(MarkdownLoadStep::new(client.clone(), config.retry_policy()))
        .add_step(SummaryGenerateStep::new(generator, config.prompts_dir.clone()))
        .add_step(SaveSummaryStep::new(config.output_dir.clone()))
        .with_progress(config.progress_callback.clone())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn route(input: &Path, mode: Mode) -> Result<Route, DeepReadError> {
    if !input.is_file() {
        return Err(DeepReadError::FileNotFound {
            path: input.to_path_buf(),
        });
    }
    let unsupported = |expected: &str| DeepReadError::UnsupportedInput {
        path: input.to_path_buf(),
        expected: expected.to_string(),
    };
    let is_pdf = has_extension(input, "pdf");
    let is_md = has_extension(input, "md");

    match mode {
        Mode::Full if is_pdf => Ok(Route::Full),
        Mode::Full if is_md => Ok(Route::Summary),
        Mode::Full => Err(unsupported("a .pdf or .md file")),
        Mode::Parse if is_pdf => Ok(Route::Parse),
        Mode::Parse => Err(unsupported("a .pdf file")),
        Mode::Summarize if is_md => Ok(Route::Summary),
        Mode::Summarize => Err(unsupported("a .md file")),
    }
}

fn initial_context(input: &Path, route: Route, options: &SummaryOptions) -> PipelineContext {
    let input = input.to_string_lossy().to_string();
    let mut ctx = match route {
        Route::Full | Route::Parse => PipelineContext::new().with("pdf_path", input),
        Route::Summary => PipelineContext::new().with("markdown_path", input),
    };
    if route != Route::Parse {
        ctx.insert("style", options.style.as_deref().unwrap_or(DEFAULT_STYLE));
        if let Some(prompt) = &options.custom_prompt {
            ctx.insert("custom_prompt", prompt.as_str());
        }
        if let Some(path) = &options.output_path {
            ctx.insert("output_path", path.to_string_lossy().to_string());
        }
    }
    ctx
}

/// Run the pipeline that fits `input` and `mode`.
///
/// The text generator is resolved from `config` only when the chosen
/// pipeline summarises.
pub async fn process(
    input: impl AsRef<Path>,
    mode: Mode,
    options: &SummaryOptions,
    config: &DeepReadConfig,
) -> Result<PipelineRun, DeepReadError> {
    let input = input.as_ref();
    let generator: Option<Arc<dyn TextGenerator>> = match route(input, mode)? {
        Route::Parse => None,
        _ => Some(Arc::new(LlmTextGenerator::from_config(config)?)),
    };
    run_route(input, mode, options, config, generator).await
}

/// Like [`process`], with a caller-supplied text generator.
pub async fn process_with_generator(
    input: impl AsRef<Path>,
    mode: Mode,
    options: &SummaryOptions,
    config: &DeepReadConfig,
    generator: Arc<dyn TextGenerator>,
) -> Result<PipelineRun, DeepReadError> {
    run_route(input.as_ref(), mode, options, config, Some(generator)).await
}

async fn run_route(
    input: &Path,
    mode: Mode,
    options: &SummaryOptions,
    config: &DeepReadConfig,
    generator: Option<Arc<dyn TextGenerator>>,
) -> Result<PipelineRun, DeepReadError> {
    let route = route(input, mode)?;
    let client = config.http_client()?;
    let missing_generator =
        || DeepReadError::Internal("summary pipeline built without a text generator".into());

    let pipeline = match route {
        Route::Parse => parse_pipeline(config, &client),
        Route::Full => {
            let generator = generator.ok_or_else(missing_generator)?;
            full_pipeline(config, &client, generator)
        }
        Route::Summary => {
            let generator = generator.ok_or_else(missing_generator)?;
            summary_pipeline(config, &client, generator)
        }
    };
    info!("Processing {} with the '{}' pipeline", input.display(), pipeline.name());

    pipeline
        .run_with_report(initial_context(input, route, options))
        .await
}
