//! Step-based pipeline: context, executor and the concrete steps.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ parse ──▶ (load) ──▶ summary ──▶ save
//! (store)    (extract)  (md)      (LLM)       (file)
//! ```
//!
//! 1. [`upload`]   — put the local PDF into the content store, reusing an
//!    identical object if one exists
//! 2. [`parse`]    — submit the raw URL for extraction, poll, download and
//!    unpack the result, read its Markdown
//! 3. [`markdown`] — load Markdown from a path or URL when the run did not
//!    start from a PDF
//! 4. [`summary`]  — resolve the prompt and call the text generator
//! 5. [`save`]     — write the summary atomically
//!
//! Steps talk to each other only through [`PipelineContext`] keys.

pub mod context;
pub mod executor;
pub mod markdown;
pub mod parse;
pub mod save;
pub mod summary;
pub mod upload;

pub use context::PipelineContext;
pub use executor::{Pipeline, PipelineRun, Step, StepTiming};
pub use markdown::MarkdownLoadStep;
pub use parse::DocumentParseStep;
pub use save::SaveSummaryStep;
pub use summary::SummaryGenerateStep;
pub use upload::PdfUploadStep;
