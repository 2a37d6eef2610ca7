//! Progress-callback trait for pipeline, job and download events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::DeepReadConfigBuilder::progress_callback`] to receive
//! events as a run moves through its steps, as the extraction task changes
//! state, and as the result archive downloads.
//!
//! # Example
//!
//! ```rust
//! use deepread::{DeepReadConfig, PipelineProgressCallback};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct StepPrinter;
//!
//! impl PipelineProgressCallback for StepPrinter {
//!     fn on_step_complete(&self, index: usize, total: usize, name: &str, elapsed: Duration) {
//!         eprintln!("[{index}/{total}] {name} done in {:.2}s", elapsed.as_secs_f64());
//!     }
//! }
//!
//! let config = DeepReadConfig::builder()
//!     .progress_callback(Arc::new(StepPrinter))
//!     .build()
//!     .unwrap();
//! ```

use crate::extract::{ExtractProgress, JobState};
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline executor and the extraction client.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. A run is strictly sequential, so calls never overlap
/// within one run; the `Send + Sync` bound lets independent runs share one
/// callback.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first step.
    fn on_pipeline_start(&self, name: &str, total_steps: usize) {
        let _ = (name, total_steps);
    }

    /// Called before a step executes. `index` is 1-based.
    fn on_step_start(&self, index: usize, total_steps: usize, name: &str) {
        let _ = (index, total_steps, name);
    }

    /// Called after a step's output was merged into the context.
    fn on_step_complete(&self, index: usize, total_steps: usize, name: &str, elapsed: Duration) {
        let _ = (index, total_steps, name, elapsed);
    }

    /// Called when a step fails; the run aborts right after.
    fn on_step_error(&self, index: usize, total_steps: usize, name: &str, error: &str) {
        let _ = (index, total_steps, name, error);
    }

    /// Called after every step succeeded.
    fn on_pipeline_complete(&self, name: &str, elapsed: Duration) {
        let _ = (name, elapsed);
    }

    /// Called on every successful status poll of an extraction task.
    fn on_job_update(&self, task_id: &str, state: &JobState, progress: Option<&ExtractProgress>) {
        let _ = (task_id, state, progress);
    }

    /// Called as result-archive bytes arrive. `total` is `None` when the
    /// server sent no content length.
    fn on_download_progress(&self, downloaded: u64, total: Option<u64>) {
        let _ = (downloaded, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DeepReadConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
