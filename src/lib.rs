//! # deepread
//!
//! Summarise PDF documents with an LLM.
//!
//! ## Why this crate?
//!
//! High-quality PDF text extraction is best left to a dedicated remote
//! service, but such services only accept documents by URL and work
//! asynchronously. This crate handles the plumbing around that: it publishes
//! the PDF to a content store under a hash-derived path (so re-running on the
//! same file never uploads twice), drives the extraction task to completion,
//! unpacks the resulting Markdown locally and hands it to an LLM for a
//! summary.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload   SHA-256 → <root>/<YYYY>/<MM>/<sha>.pdf, lookup first, base64 POST
//!  ├─ 2. Parse    submit raw URL, poll pending → running → done, fetch + unpack zip
//!  ├─ 3. Summary  style prompt + "Document content:\n\n<markdown>" → LLM
//!  └─ 4. Save     <extraction dir>/summary.md, written atomically
//! ```
//!
//! Every network call that can fail transiently goes through one
//! [`RetryPolicy`]; every failure surfaces as a [`DeepReadError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deepread::{process, DeepReadConfig, Mode, SummaryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeepReadConfig::builder()
//!         .extraction_api_key(std::env::var("MINERU_API_KEY")?)
//!         .store_token(std::env::var("GITEE_ACCESS_TOKEN")?)
//!         .store_owner("alice")
//!         .store_repo("papers")
//!         .build()?;
//!     config.validate_credentials()?;
//!
//!     let run = process("paper.pdf", Mode::Full, &SummaryOptions::default(), &config).await?;
//!     println!("summary: {}", run.context.get_str("output_path").unwrap_or("-"));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Builds the `deepread` binary (clap, anyhow, indicatif, logging) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deepread = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod summarize;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeepReadConfig, DeepReadConfigBuilder};
pub use error::{DeepReadError, Transient};
pub use extract::{ExtractProgress, ExtractionClient, Job, JobState, ResultArtifact, TaskStatus};
pub use generate::{Generation, LlmTextGenerator, TextGenerator};
pub use pipeline::{Pipeline, PipelineContext, PipelineRun, Step, StepTiming};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use retry::RetryPolicy;
pub use summarize::{
    full_pipeline, parse_pipeline, process, process_with_generator, summary_pipeline, Mode,
    SummaryOptions,
};
pub use upload::{ContentAddressedUploader, UploadRecord};
