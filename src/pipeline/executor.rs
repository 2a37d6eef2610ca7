use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Instrument};

use super::context::PipelineContext;
use crate::error::DeepReadError;
use crate::progress::ProgressCallback;

/// One unit of work in a [`Pipeline`].
///
/// A step reads its inputs from the accumulated context and returns only the
/// keys it produced. It never mutates the context it is given.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable name used in logs and progress events.
    fn name(&self) -> &str;

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError>;
}

/// Wall-clock cost of one completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    pub name: String,
    pub elapsed: Duration,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub pipeline: String,
    pub context: PipelineContext,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
    pub steps: Vec<StepTiming>,
}

/// An ordered list of steps executed strictly one after another.
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            progress: None,
        }
    }

    pub fn add_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step and return the final context.
    pub async fn run(&self, initial: PipelineContext) -> Result<PipelineContext, DeepReadError> {
        Ok(self.run_with_report(initial).await?.context)
    }

    /// Run every step, aborting on the first failure.
    ///
    /// On failure the step's error is returned unchanged and no partial
    /// context escapes.
    pub async fn run_with_report(
        &self,
        initial: PipelineContext,
    ) -> Result<PipelineRun, DeepReadError> {
        let total = self.steps.len();
        let started_at = Local::now();
        let run_start = Instant::now();
        let mut context = initial;
        let mut timings = Vec::with_capacity(total);

        info!("Starting pipeline '{}' ({} steps)", self.name, total);
        if let Some(cb) = &self.progress {
            cb.on_pipeline_start(&self.name, total);
        }

        for (i, step) in self.steps.iter().enumerate() {
            let index = i + 1;
            let name = step.name().to_string();
            if let Some(cb) = &self.progress {
                cb.on_step_start(index, total, &name);
            }
            info!("Step {}/{}: {}", index, total, name);

            let step_start = Instant::now();
            let span = info_span!("step", pipeline = %self.name, step = %name, index);
            match step.execute(&context).instrument(span).await {
                Ok(output) => {
                    context.merge(output);
                    let elapsed = step_start.elapsed();
                    info!("Step '{}' finished in {:.2}s", name, elapsed.as_secs_f64());
                    if let Some(cb) = &self.progress {
                        cb.on_step_complete(index, total, &name, elapsed);
                    }
                    timings.push(StepTiming { name, elapsed });
                }
                Err(e) => {
                    error!("Step '{}' failed: {}", name, e);
                    if let Some(cb) = &self.progress {
                        cb.on_step_error(index, total, &name, &e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        let elapsed = run_start.elapsed();
        info!(
            "Pipeline '{}' completed in {:.2}s",
            self.name,
            elapsed.as_secs_f64()
        );
        if let Some(cb) = &self.progress {
            cb.on_pipeline_complete(&self.name, elapsed);
        }

        Ok(PipelineRun {
            pipeline: self.name.clone(),
            context,
            started_at,
            finished_at: Local::now(),
            elapsed,
            steps: timings,
        })
    }
}
