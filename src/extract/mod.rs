//! Client for the remote document-extraction service.
//!
//! A document reachable by URL is submitted as an asynchronous task, polled
//! at a fixed interval until it reaches a terminal state, and on success its
//! result archive is downloaded and unpacked locally:
//!
//! ```text
//!  submit ──► pending ──► running ──► converting ──► done ──► download + unpack
//!                 │           │            │
//!                 └───────────┴────────────┴──────► failed (fatal)
//! ```
//!
//! Submission goes through the [`RetryPolicy`]. Polling does not: a failed
//! status request is logged and the loop simply waits for the next tick. Only
//! the overall deadline bounds it.

mod archive;

use crate::config::DeepReadConfig;
use crate::error::{DeepReadError, Transient};
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SERVICE: &str = "extraction";

/// Lifecycle state reported by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Converting,
    Done,
    Failed,
    /// A state string this client does not know. Treated as in-flight.
    Unknown(String),
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => JobState::Pending,
            "running" => JobState::Running,
            "converting" => JobState::Converting,
            "done" => JobState::Done,
            "failed" => JobState::Failed,
            other => JobState::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => f.write_str("pending"),
            JobState::Running => f.write_str("running"),
            JobState::Converting => f.write_str("converting"),
            JobState::Done => f.write_str("done"),
            JobState::Failed => f.write_str("failed"),
            JobState::Unknown(s) if s.is_empty() => f.write_str("unknown"),
            JobState::Unknown(s) => f.write_str(s),
        }
    }
}

/// Page counters reported while a task is running. Missing or null counters read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractProgress {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub extracted_pages: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_pages: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

/// One decoded status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: JobState,
    pub progress: Option<ExtractProgress>,
    pub archive_url: Option<String>,
    pub error_message: Option<String>,
}

/// Local view of a remote task. Once terminal, further updates are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task_id: String,
    pub state: JobState,
    pub progress: Option<ExtractProgress>,
    pub archive_url: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: JobState::Pending,
            progress: None,
            archive_url: None,
            error_message: None,
        }
    }

    /// Apply a status update. Returns `false` if the job was already terminal.
    pub fn apply(&mut self, status: TaskStatus) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = status.state;
        if status.progress.is_some() {
            self.progress = status.progress;
        }
        self.archive_url = status.archive_url;
        self.error_message = status.error_message;
        true
    }
}

/// Outcome of a finished extraction.
///
/// `extract_dir` and `markdown_path` are `None` when the service reported
/// success without an archive URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArtifact {
    pub task_id: String,
    pub archive_url: Option<String>,
    pub extract_dir: Option<PathBuf>,
    pub markdown_path: Option<PathBuf>,
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Anything but an explicit `code: 0` is an application error.
    fn api_error(&self) -> Option<DeepReadError> {
        let fallback = match self.code {
            Some(0) => return None,
            Some(code) => format!("error code {code}"),
            None => "response carries no status code".to_string(),
        };
        Some(DeepReadError::ApiError {
            service: SERVICE.into(),
            message: self.msg.clone().unwrap_or(fallback),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    task_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusData {
    state: Option<String>,
    extract_progress: Option<ExtractProgress>,
    full_zip_url: Option<String>,
    err_msg: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Submits documents to the extraction service and collects their results.
pub struct ExtractionClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    api_url: String,
    api_key: String,
    poll_interval: Duration,
    poll_request_timeout: Duration,
    request_timeout: Duration,
    job_timeout: Duration,
    output_dir: PathBuf,
    markdown_filename: String,
    progress: Option<ProgressCallback>,
}

impl ExtractionClient {
    pub fn new(config: &DeepReadConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            retry: config.retry_policy(),
            api_url: config.extraction_api_url.clone(),
            api_key: config.extraction_api_key.clone().unwrap_or_default(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_request_timeout: Duration::from_secs(config.poll_request_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            output_dir: config.output_dir.clone(),
            markdown_filename: config.markdown_filename.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Submit the document at `source_url` and return the new task id.
    pub async fn submit(&self, source_url: &str) -> Result<String, DeepReadError> {
        let body = json!({
            "url": source_url,
            "is_ocr": false,
            "enable_formula": true,
        });
        let envelope: Envelope<SubmitData> = self
            .retry
            .execute("extraction submit", || self.post_submit(&body))
            .await?;

        let task_id = envelope
            .data
            .and_then(|d| d.task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DeepReadError::UnexpectedResponse {
                context: "extraction submit".into(),
                payload: "response carries no task_id".into(),
            })?;

        info!("Extraction task submitted: {}", task_id);
        Ok(task_id)
    }

    async fn post_submit(&self, body: &Value) -> Result<Envelope<SubmitData>, DeepReadError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| DeepReadError::transport("extraction submit", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeepReadError::transport("extraction submit", e))?;

        match serde_json::from_str::<Envelope<SubmitData>>(&text) {
            Ok(envelope) => {
                if status.is_success() || envelope.code.is_some() {
                    if let Some(err) = envelope.api_error() {
                        return Err(err);
                    }
                }
                if !status.is_success() {
                    return Err(DeepReadError::HttpStatus {
                        operation: "extraction submit".into(),
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Ok(envelope)
            }
            Err(_) if !status.is_success() => Err(DeepReadError::HttpStatus {
                operation: "extraction submit".into(),
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(DeepReadError::UnexpectedResponse {
                context: "extraction submit".into(),
                payload: format!("{e}: {text}"),
            }),
        }
    }

    /// Fetch the current status of `task_id` once.
    pub async fn status(&self, task_id: &str) -> Result<TaskStatus, DeepReadError> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_url, task_id))
            .bearer_auth(&self.api_key)
            .timeout(self.poll_request_timeout)
            .send()
            .await
            .map_err(|e| DeepReadError::transport("status poll", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeepReadError::transport("status poll", e))?;

        let envelope: Envelope<StatusData> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DeepReadError::HttpStatus {
                    operation: "status poll".into(),
                    status: status.as_u16(),
                    body: text,
                })
            }
            // Undecodable bodies are treated like a dropped connection.
            Err(e) => {
                return Err(DeepReadError::Transport {
                    operation: "status poll".into(),
                    reason: format!("undecodable body: {e}"),
                })
            }
        };

        // A non-2xx reply without an envelope code stays a transport failure.
        if status.is_success() || envelope.code.is_some() {
            if let Some(err) = envelope.api_error() {
                return Err(err);
            }
        }
        if !status.is_success() {
            return Err(DeepReadError::HttpStatus {
                operation: "status poll".into(),
                status: status.as_u16(),
                body: text,
            });
        }

        let data = envelope.data.unwrap_or_default();
        Ok(TaskStatus {
            state: JobState::parse(data.state.as_deref().unwrap_or_default()),
            progress: data.extract_progress,
            archive_url: data.full_zip_url.filter(|u| !u.is_empty()),
            error_message: data.err_msg.filter(|m| !m.is_empty()),
        })
    }

    /// Poll `task_id` to completion, then download and unpack its archive.
    ///
    /// `document_name` names the extraction folder. Polling gives up with
    /// [`DeepReadError::Timeout`] once `deadline` has elapsed.
    pub async fn await_completion(
        &self,
        task_id: &str,
        document_name: &str,
        deadline: Duration,
    ) -> Result<ResultArtifact, DeepReadError> {
        let job = poll_until_terminal(
            task_id,
            self.poll_interval,
            deadline,
            self.progress.as_ref(),
            || self.status(task_id),
        )
        .await?;

        let Some(url) = job.archive_url else {
            warn!("Task {} finished without a result archive URL", task_id);
            return Ok(ResultArtifact {
                task_id: task_id.to_string(),
                archive_url: None,
                extract_dir: None,
                markdown_path: None,
            });
        };

        let extract_dir = archive::retrieve(
            &self.client,
            &url,
            &self.output_dir,
            task_id,
            document_name,
            self.progress.as_ref(),
        )
        .await?;

        let markdown_path = extract_dir.join(&self.markdown_filename);
        if !markdown_path.is_file() {
            if let Err(e) = tokio::fs::remove_dir_all(&extract_dir).await {
                warn!("Could not remove {}: {}", extract_dir.display(), e);
            }
            return Err(DeepReadError::CorruptArchive {
                path: extract_dir,
                detail: format!("archive contains no '{}'", self.markdown_filename),
            });
        }

        Ok(ResultArtifact {
            task_id: task_id.to_string(),
            archive_url: Some(url),
            extract_dir: Some(extract_dir),
            markdown_path: Some(markdown_path),
        })
    }

    /// Submit and await in one call, bounded by the configured job timeout.
    pub async fn extract(
        &self,
        source_url: &str,
        document_name: &str,
    ) -> Result<ResultArtifact, DeepReadError> {
        let task_id = self.submit(source_url).await?;
        self.await_completion(&task_id, document_name, self.job_timeout).await
    }
}

/// Drive the polling state machine with `fetch` until the job is terminal.
///
/// Transient fetch failures are logged and the loop waits for the next tick.
/// A semantic error from the service ends the loop immediately.
pub(crate) async fn poll_until_terminal<F, Fut>(
    task_id: &str,
    interval: Duration,
    timeout: Duration,
    progress: Option<&ProgressCallback>,
    mut fetch: F,
) -> Result<Job, DeepReadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TaskStatus, DeepReadError>>,
{
    let start = Instant::now();
    let mut job = Job::new(task_id);
    let mut consecutive_failures: u32 = 0;

    loop {
        if start.elapsed() > timeout {
            return Err(DeepReadError::Timeout {
                task_id: task_id.to_string(),
                secs: timeout.as_secs(),
            });
        }

        match fetch().await {
            Ok(status) => {
                consecutive_failures = 0;
                job.apply(status);
                if let Some(cb) = progress {
                    cb.on_job_update(task_id, &job.state, job.progress.as_ref());
                }

                let state = job.state.clone();
                match &state {
                    JobState::Done => {
                        info!("Task {} done", task_id);
                        return Ok(job);
                    }
                    JobState::Failed => {
                        return Err(DeepReadError::TaskFailed {
                            task_id: task_id.to_string(),
                            message: job
                                .error_message
                                .clone()
                                .unwrap_or_else(|| "unknown error".into()),
                        });
                    }
                    JobState::Running => match job.progress {
                        Some(p) if p.total_pages > 0 => info!(
                            "Task {} running: {}/{} pages",
                            task_id, p.extracted_pages, p.total_pages
                        ),
                        _ => info!("Task {} running", task_id),
                    },
                    JobState::Pending => debug!("Task {} queued", task_id),
                    JobState::Converting => debug!("Task {} converting", task_id),
                    JobState::Unknown(s) => info!("Task {} state: {}", task_id, s),
                }
            }
            Err(e) if e.is_transient() => {
                consecutive_failures += 1;
                warn!(
                    "Status check for {} failed ({} in a row): {}",
                    task_id, consecutive_failures, e
                );
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(interval).await;
    }
}
