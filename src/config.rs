//! Configuration for a deepread run.
//!
//! All behaviour is controlled through [`DeepReadConfig`], built via its
//! [`DeepReadConfigBuilder`]. The value is constructed once at startup and
//! passed by reference into every component constructor; nothing below the
//! entry points reads the environment.

use crate::error::DeepReadError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by the uploader, the extraction client and the steps.
///
/// # Example
/// ```rust
/// use deepread::DeepReadConfig;
///
/// let config = DeepReadConfig::builder()
///     .store_owner("alice")
///     .store_repo("Papers")
///     .max_retries(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.store_repo, "papers");
/// ```
#[derive(Clone)]
pub struct DeepReadConfig {
    // ── Content store ─────────────────────────────────────────────────────
    /// Base URL of the content store REST API. Default: `https://gitee.com/api/v5`.
    pub store_api_base: String,

    /// Base URL used to build browse/raw links when a response omits them.
    /// Default: `https://gitee.com`.
    pub store_web_base: String,

    /// Repository owner.
    pub store_owner: String,

    /// Repository name. Always stored lower-cased.
    pub store_repo: String,

    /// Target branch for uploads and existence lookups. Default: `master`.
    pub store_branch: String,

    /// Access token for the content store.
    pub store_token: Option<String>,

    /// Prefix under which uploads are stored. Default: `pdfs`.
    pub upload_root: String,

    // ── Extraction service ────────────────────────────────────────────────
    /// Submission endpoint; task status lives at `<url>/<task_id>`.
    /// Default: `https://mineru.net/api/v4/extract/task`.
    pub extraction_api_url: String,

    /// Bearer token for the extraction service.
    pub extraction_api_key: Option<String>,

    /// Fixed wait between two status polls in milliseconds. Default: 5000.
    pub poll_interval_ms: u64,

    /// Timeout of a single status request in seconds. Default: 30.
    pub poll_request_timeout_secs: u64,

    /// Hard ceiling on the whole polling loop in seconds. Default: 300.
    pub job_timeout_secs: u64,

    // ── Network policy ────────────────────────────────────────────────────
    /// Connect and per-read timeout on the shared client; also the total
    /// timeout of submissions and existence lookups. Default: 300.
    pub request_timeout_secs: u64,

    /// Attempts made by the retry policy (≥ 1). Default: 3.
    pub max_retries: u32,

    /// Backoff base in milliseconds; attempt `n` waits `base * 2^n`. Default: 1000.
    pub retry_backoff_ms: u64,

    // ── Local layout ──────────────────────────────────────────────────────
    /// Root for temporary archives and extraction folders. Default: `output`.
    pub output_dir: PathBuf,

    /// Name of the Markdown file inside an unpacked archive. Default: `full.md`.
    pub markdown_filename: String,

    /// Directory holding style prompts (`<style>.md`). Default: `prompts`.
    pub prompts_dir: PathBuf,

    // ── Text generation ───────────────────────────────────────────────────
    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "anthropic", "openai").
    pub provider_name: Option<String>,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Maximum tokens the model may generate for a summary. Default: 30000.
    pub max_tokens: usize,

    /// Receives pipeline, job and download events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DeepReadConfig {
    fn default() -> Self {
        Self {
            store_api_base: "https://gitee.com/api/v5".to_string(),
            store_web_base: "https://gitee.com".to_string(),
            store_owner: String::new(),
            store_repo: String::new(),
            store_branch: "master".to_string(),
            store_token: None,
            upload_root: "pdfs".to_string(),
            extraction_api_url: "https://mineru.net/api/v4/extract/task".to_string(),
            extraction_api_key: None,
            poll_interval_ms: 5000,
            poll_request_timeout_secs: 30,
            job_timeout_secs: 300,
            request_timeout_secs: 300,
            max_retries: 3,
            retry_backoff_ms: 1000,
            output_dir: PathBuf::from("output"),
            markdown_filename: "full.md".to_string(),
            prompts_dir: PathBuf::from("prompts"),
            provider: None,
            provider_name: None,
            model: None,
            max_tokens: 30000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DeepReadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepReadConfig")
            .field("store_api_base", &self.store_api_base)
            .field("store_owner", &self.store_owner)
            .field("store_repo", &self.store_repo)
            .field("store_branch", &self.store_branch)
            .field("store_token", &self.store_token.as_deref().map(mask_secret))
            .field("upload_root", &self.upload_root)
            .field("extraction_api_url", &self.extraction_api_url)
            .field(
                "extraction_api_key",
                &self.extraction_api_key.as_deref().map(mask_secret),
            )
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("output_dir", &self.output_dir)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .finish()
    }
}

impl DeepReadConfig {
    /// Create a new builder for `DeepReadConfig`.
    pub fn builder() -> DeepReadConfigBuilder {
        DeepReadConfigBuilder {
            config: Self::default(),
        }
    }

    /// The retry policy every outbound call shares.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }

    /// Build the HTTP client shared by all components of one run.
    ///
    /// The request timeout bounds connecting and each individual read, not the
    /// whole exchange, so a large archive may stream for as long as bytes keep
    /// arriving. Short JSON calls set their own total timeout per request.
    pub fn http_client(&self) -> Result<reqwest::Client, DeepReadError> {
        let timeout = Duration::from_secs(self.request_timeout_secs);
        reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("deepread/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeepReadError::Internal(format!("HTTP client: {e}")))
    }

    /// Check that every credential the full pipeline needs is present.
    ///
    /// All problems are reported in one error so the user can fix them at once.
    pub fn validate_credentials(&self) -> Result<(), DeepReadError> {
        let mut problems = Vec::new();
        if is_blank(self.extraction_api_key.as_deref()) {
            problems.push("MINERU_API_KEY is not set");
        }
        if is_blank(self.store_token.as_deref()) {
            problems.push("GITEE_ACCESS_TOKEN is not set");
        }
        if self.store_owner.trim().is_empty() {
            problems.push("GITEE_OWNER is not set");
        }
        if self.store_repo.trim().is_empty() {
            problems.push("GITEE_REPO is not set");
        }

        if problems.is_empty() {
            return Ok(());
        }
        let list = problems
            .iter()
            .map(|p| format!("  - {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        Err(DeepReadError::InvalidConfig(format!(
            "\n{list}\n\nSet these variables in your environment or .env file."
        )))
    }

    /// Settings as display pairs, with secrets masked to their last 4 characters.
    pub fn redacted_summary(&self) -> Vec<(&'static str, String)> {
        let secret = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.is_empty())
                .map(mask_secret)
                .unwrap_or_else(|| "Not Set".to_string())
        };
        let plain = |v: &str| {
            if v.is_empty() {
                "Not Set".to_string()
            } else {
                v.to_string()
            }
        };
        vec![
            ("MINERU_API_URL", self.extraction_api_url.clone()),
            ("MINERU_API_KEY", secret(&self.extraction_api_key)),
            ("GITEE_ACCESS_TOKEN", secret(&self.store_token)),
            ("GITEE_OWNER", plain(&self.store_owner)),
            ("GITEE_REPO", plain(&self.store_repo)),
            ("GITEE_BRANCH", self.store_branch.clone()),
            ("GITEE_UPLOAD_PATH", self.upload_root.clone()),
            ("LLM_PROVIDER", self.provider_name.clone().unwrap_or_else(|| "auto".into())),
            ("LLM_MODEL", self.model.clone().unwrap_or_else(|| "default".into())),
            ("REQUEST_TIMEOUT", self.request_timeout_secs.to_string()),
            ("MAX_RETRIES", self.max_retries.to_string()),
            ("OUTPUT_DIR", self.output_dir.display().to_string()),
        ]
    }
}

fn is_blank(v: Option<&str>) -> bool {
    v.map(|s| s.trim().is_empty()).unwrap_or(true)
}

/// `***` followed by the last 4 characters of the secret.
fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

/// Builder for [`DeepReadConfig`].
pub struct DeepReadConfigBuilder {
    config: DeepReadConfig,
}

impl fmt::Debug for DeepReadConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepReadConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DeepReadConfigBuilder {
    pub fn store_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.store_api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn store_web_base(mut self, url: impl Into<String>) -> Self {
        self.config.store_web_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn store_owner(mut self, owner: impl Into<String>) -> Self {
        self.config.store_owner = owner.into();
        self
    }

    pub fn store_repo(mut self, repo: impl Into<String>) -> Self {
        self.config.store_repo = repo.into().to_lowercase();
        self
    }

    pub fn store_branch(mut self, branch: impl Into<String>) -> Self {
        self.config.store_branch = branch.into();
        self
    }

    pub fn store_token(mut self, token: impl Into<String>) -> Self {
        self.config.store_token = Some(token.into());
        self
    }

    pub fn upload_root(mut self, root: impl Into<String>) -> Self {
        self.config.upload_root = root.into();
        self
    }

    pub fn extraction_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.extraction_api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn extraction_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.extraction_api_key = Some(key.into());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn poll_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.poll_request_timeout_secs = secs;
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn markdown_filename(mut self, name: impl Into<String>) -> Self {
        self.config.markdown_filename = name.into();
        self
    }

    pub fn prompts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompts_dir = dir.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeepReadConfig, DeepReadError> {
        let c = &self.config;
        if c.max_retries == 0 {
            return Err(DeepReadError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        if c.poll_interval_ms == 0 {
            return Err(DeepReadError::InvalidConfig(
                "poll interval must be > 0".into(),
            ));
        }
        if c.job_timeout_secs == 0 {
            return Err(DeepReadError::InvalidConfig(
                "job timeout must be > 0".into(),
            ));
        }
        if c.markdown_filename.trim().is_empty() {
            return Err(DeepReadError::InvalidConfig(
                "markdown file name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DeepReadConfig::default();
        assert_eq!(c.store_branch, "master");
        assert_eq!(c.upload_root, "pdfs");
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.job_timeout_secs, 300);
        assert_eq!(c.poll_interval_ms, 5000);
        assert_eq!(c.markdown_filename, "full.md");
        assert_eq!(c.max_tokens, 30000);
    }

    #[test]
    fn repo_is_lower_cased() {
        let c = DeepReadConfig::builder()
            .store_repo("MyPapers")
            .build()
            .unwrap();
        assert_eq!(c.store_repo, "mypapers");
    }

    #[test]
    fn zero_retries_rejected() {
        let err = DeepReadConfig::builder().max_retries(0).build().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn credentials_reported_together() {
        let err = DeepReadConfig::default().validate_credentials().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MINERU_API_KEY"));
        assert!(msg.contains("GITEE_ACCESS_TOKEN"));
        assert!(msg.contains("GITEE_OWNER"));
        assert!(msg.contains("GITEE_REPO"));
    }

    #[test]
    fn credentials_ok_when_all_present() {
        let c = DeepReadConfig::builder()
            .extraction_api_key("key")
            .store_token("token")
            .store_owner("alice")
            .store_repo("papers")
            .build()
            .unwrap();
        assert!(c.validate_credentials().is_ok());
    }

    #[test]
    fn summary_masks_secrets() {
        let c = DeepReadConfig::builder()
            .store_token("supersecret1234")
            .build()
            .unwrap();
        let summary = c.redacted_summary();
        let token = summary
            .iter()
            .find(|(k, _)| *k == "GITEE_ACCESS_TOKEN")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(token, "***1234");
        let key = summary
            .iter()
            .find(|(k, _)| *k == "MINERU_API_KEY")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(key, "Not Set");
    }

    #[test]
    fn debug_output_hides_token() {
        let c = DeepReadConfig::builder()
            .store_token("supersecret1234")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("supersecret"));
    }
}
