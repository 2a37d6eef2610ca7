//! Error type for the deepread library.
//!
//! A single fatal error type, [`DeepReadError`], flows through every layer:
//! retry policy, uploader, job client, pipeline steps and the executor. The
//! first error aborts the run and reaches the caller unchanged.
//!
//! The variants follow the failure categories callers need to act on:
//!
//! * **not-found** — a local input is missing ([`DeepReadError::FileNotFound`])
//! * **transport** — network or HTTP failures; the only category the
//!   [`crate::retry::RetryPolicy`] retries
//! * **semantic/API** — a well-formed error response from a remote service,
//!   surfaced verbatim and never retried
//! * **timeout** — the polling deadline was exceeded
//! * **corruption** — a malformed archive or an unexpected response shape
//! * **precondition** — a step's required context key is absent

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the deepread library.
#[derive(Debug, Error)]
pub enum DeepReadError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input file type is not handled by the selected mode.
    #[error("Unsupported input '{path}': expected {expected}")]
    UnsupportedInput { path: PathBuf, expected: String },

    // ── Transport errors (retryable) ──────────────────────────────────────
    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("{operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    /// The remote answered with a non-success status that carries no
    /// recognised semantic error.
    #[error("{operation} returned HTTP {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    // ── Semantic / API errors (not retryable) ─────────────────────────────
    /// A remote service reported an application-level error.
    #[error("{service} API error: {message}")]
    ApiError { service: String, message: String },

    /// The content store already holds a file at this path.
    #[error("File already exists in the content store: {path}")]
    AlreadyExists { path: String },

    /// The extraction task reached the `failed` state.
    #[error("Extraction task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    // ── Timeout ───────────────────────────────────────────────────────────
    /// The extraction task did not reach a terminal state before the deadline.
    #[error("Timed out after {secs}s waiting for extraction task {task_id}")]
    Timeout { task_id: String, secs: u64 },

    // ── Corruption ────────────────────────────────────────────────────────
    /// The downloaded result archive could not be read or unpacked.
    #[error("Result archive '{path}' is corrupt: {detail}")]
    CorruptArchive { path: PathBuf, detail: String },

    /// A response parsed but did not have the expected shape.
    #[error("Unexpected response from {context}: {payload}")]
    UnexpectedResponse { context: String, payload: String },

    // ── Precondition ──────────────────────────────────────────────────────
    /// A step ran without a context key it requires.
    #[error("Step '{step}' requires context key '{key}', which is missing")]
    MissingContextKey { step: String, key: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local filesystem operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the summary file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or credential validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The text-generation call failed.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeepReadError {
    /// Build a transport error from a `reqwest` failure.
    pub(crate) fn transport(operation: impl Into<String>, err: reqwest::Error) -> Self {
        DeepReadError::Transport {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeepReadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing_key(step: &str, key: &str) -> Self {
        DeepReadError::MissingContextKey {
            step: step.to_string(),
            key: key.to_string(),
        }
    }
}

/// Classifies errors the [`crate::retry::RetryPolicy`] may retry.
///
/// Only failures whose outcome can change on a second attempt are transient.
/// Deterministic outcomes ("already exists", "task failed", malformed
/// payloads) must return `false`.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DeepReadError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DeepReadError::Transport { .. } | DeepReadError::HttpStatus { .. }
        )
    }
}
