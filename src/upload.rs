//! Content-addressed upload to the remote content store.
//!
//! The remote path of a payload is derived from its SHA-256 digest, the
//! current year/month and its extension:
//!
//! ```text
//! <upload_root>/<YYYY>/<MM>/<sha256><ext>      e.g. pdfs/2024/05/9f86d0….pdf
//! ```
//!
//! Before writing, the store is queried at that path. If an object is already
//! there its URLs are returned and nothing is uploaded, so byte-identical
//! inputs never produce duplicate remote objects. The file name plays no part
//! in the path.

use crate::config::DeepReadConfig;
use crate::error::DeepReadError;
use crate::retry::RetryPolicy;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Datelike;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Where an uploaded payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Path inside the repository.
    pub remote_path: String,
    /// Human-browsable URL.
    pub html_url: String,
    /// Raw-fetch URL handed to the extraction service.
    pub raw_url: String,
    /// Hex SHA-256 of the payload.
    pub sha256: String,
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn content_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Deterministic remote path for a payload digest.
///
/// `extension` may be given with or without its leading dot; an empty
/// extension yields a bare digest.
pub fn remote_path(
    upload_root: &str,
    year: i32,
    month: u32,
    sha256: &str,
    extension: &str,
) -> String {
    let ext = match extension.trim_start_matches('.') {
        "" => String::new(),
        e => format!(".{e}"),
    };
    let root = upload_root.trim_matches('/');
    if root.is_empty() {
        format!("{year}/{month:02}/{sha256}{ext}")
    } else {
        format!("{root}/{year}/{month:02}/{sha256}{ext}")
    }
}

/// Uploads payloads to the content store, reusing existing objects.
#[derive(Debug, Clone)]
pub struct ContentAddressedUploader {
    client: reqwest::Client,
    retry: RetryPolicy,
    lookup_timeout: Duration,
    api_base: String,
    web_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
    upload_root: String,
}

impl ContentAddressedUploader {
    pub fn new(config: &DeepReadConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            retry: config.retry_policy(),
            lookup_timeout: Duration::from_secs(config.request_timeout_secs),
            api_base: config.store_api_base.clone(),
            web_base: config.store_web_base.clone(),
            owner: config.store_owner.clone(),
            repo: config.store_repo.clone(),
            branch: config.store_branch.clone(),
            token: config.store_token.clone().unwrap_or_default(),
            upload_root: config.upload_root.clone(),
        }
    }

    /// Read a local file and upload it under its content-derived path.
    ///
    /// A missing file is reported before any network call.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadRecord, DeepReadError> {
        if !path.is_file() {
            return Err(DeepReadError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DeepReadError::io(path, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.upload_named(&bytes, extension, &display_name).await
    }

    /// Upload `bytes` with the given original extension.
    pub async fn upload(
        &self,
        bytes: &[u8],
        extension: &str,
    ) -> Result<UploadRecord, DeepReadError> {
        self.upload_named(bytes, extension, "").await
    }

    async fn upload_named(
        &self,
        bytes: &[u8],
        extension: &str,
        display_name: &str,
    ) -> Result<UploadRecord, DeepReadError> {
        let sha = content_sha256(bytes);
        let now = chrono::Local::now();
        let path = remote_path(&self.upload_root, now.year(), now.month(), &sha, extension);
        debug!("Content SHA-256 {} → {}", sha, path);

        if let Some(existing) = self.lookup_existing(&path, &sha).await {
            info!("Reusing existing upload: {}", existing.raw_url);
            return Ok(existing);
        }

        let message = if display_name.is_empty() {
            format!("Upload {path} (SHA: {sha})")
        } else {
            format!("Upload PDF: {display_name} (SHA: {sha})")
        };
        let body = json!({
            "access_token": self.token,
            "content": STANDARD.encode(bytes),
            "message": message,
            "branch": self.branch,
        });

        let response = self
            .retry
            .execute("upload", || self.post_contents(&path, &body))
            .await?;

        let record = self.record_from_upload(&path, &sha, response)?;
        info!("Uploaded {} bytes to {}", bytes.len(), record.raw_url);
        Ok(record)
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// Look for an object already stored at `path`.
    ///
    /// Any failure (network, non-200, odd payload) counts as "absent"; the
    /// upload that follows is the authoritative operation.
    async fn lookup_existing(&self, path: &str, sha: &str) -> Option<UploadRecord> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("access_token", self.token.as_str()), ("ref", self.branch.as_str())])
            .timeout(self.lookup_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Lookup of {} returned HTTP {}", path, r.status());
                return None;
            }
            Err(e) => {
                debug!("Lookup of {} failed: {}", path, e);
                return None;
            }
        };

        let payload: Value = response.json().await.ok()?;
        // The store answers with a list for directories and an object for files.
        let info = match &payload {
            Value::Array(items) => items.first()?,
            other => other,
        };
        let html_url = info.get("html_url")?.as_str()?;
        let raw_url = info.get("download_url")?.as_str()?;

        Some(UploadRecord {
            remote_path: path.to_string(),
            html_url: html_url.to_string(),
            raw_url: raw_url.to_string(),
            sha256: sha.to_string(),
        })
    }

    /// One upload attempt. Only transport failures come back transient.
    async fn post_contents(&self, path: &str, body: &Value) -> Result<Value, DeepReadError> {
        let response = self
            .client
            .post(self.contents_url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| DeepReadError::transport("upload", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeepReadError::transport("upload", e))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|_| DeepReadError::UnexpectedResponse {
                context: "content store upload".into(),
                payload: text,
            });
        }

        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| text.clone());
            if message.to_lowercase().contains("already exists") {
                return Err(DeepReadError::AlreadyExists {
                    path: path.to_string(),
                });
            }
            return Err(DeepReadError::ApiError {
                service: "content store".into(),
                message,
            });
        }

        Err(DeepReadError::HttpStatus {
            operation: "upload".into(),
            status: status.as_u16(),
            body: text,
        })
    }

    fn record_from_upload(
        &self,
        path: &str,
        sha: &str,
        response: Value,
    ) -> Result<UploadRecord, DeepReadError> {
        let content = match response.get("content") {
            Some(c) if c.is_object() => c,
            _ => {
                return Err(DeepReadError::UnexpectedResponse {
                    context: "content store upload".into(),
                    payload: response.to_string(),
                })
            }
        };
        let field = |name: &str| {
            content
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let html_url = field("html_url").unwrap_or_else(|| self.web_url("blob", path));
        let raw_url = field("download_url").unwrap_or_else(|| self.web_url("raw", path));

        Ok(UploadRecord {
            remote_path: path.to_string(),
            html_url,
            raw_url,
            sha256: sha.to_string(),
        })
    }

    fn web_url(&self, kind: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.web_base, self.owner, self.repo, kind, self.branch, path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn uploader(server: &MockServer) -> ContentAddressedUploader {
        let config = DeepReadConfig::builder()
            .store_api_base(server.base_url())
            .store_web_base("https://store.example")
            .store_owner("alice")
            .store_repo("Papers")
            .store_token("token-1")
            .retry_backoff_ms(1)
            .build()
            .expect("config");
        ContentAddressedUploader::new(&config, reqwest::Client::new())
    }

    #[test]
    fn sha256_is_hex_digest() {
        assert_eq!(
            content_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn remote_path_depends_only_on_digest_date_and_extension() {
        let sha = content_sha256(b"%PDF-1.7 same bytes");
        let a = remote_path("pdfs/", 2024, 5, &sha, ".pdf");
        let b = remote_path("pdfs", 2024, 5, &sha, "pdf");
        assert_eq!(a, b);
        assert_eq!(a, format!("pdfs/2024/05/{sha}.pdf"));
        assert_eq!(remote_path("", 2024, 11, "ab", ""), "2024/11/ab");
    }

    #[tokio::test]
    async fn existing_object_is_reused_without_writing() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("/repos/alice/papers/contents/pdfs/")
                    .query_param("ref", "master");
                then.status(200).json_body(serde_json::json!({
                    "html_url": "https://store.example/alice/papers/blob/master/x.pdf",
                    "download_url": "https://store.example/alice/papers/raw/master/x.pdf"
                }));
            })
            .await;
        let write = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(201);
            })
            .await;

        let up = uploader(&server);
        let first = up.upload(b"%PDF-1.4 hello", "pdf").await.expect("first");
        let second = up.upload(b"%PDF-1.4 hello", "pdf").await.expect("second");

        assert_eq!(first, second);
        assert_eq!(first.raw_url, "https://store.example/alice/papers/raw/master/x.pdf");
        assert_eq!(lookup.hits_async().await, 2);
        assert_eq!(write.hits_async().await, 0);
    }

    #[tokio::test]
    async fn list_response_uses_first_entry() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).json_body(serde_json::json!([{
                    "html_url": "h",
                    "download_url": "d"
                }]));
            })
            .await;

        let record = uploader(&server).upload(b"data", ".pdf").await.unwrap();
        assert_eq!(record.html_url, "h");
        assert_eq!(record.raw_url, "d");
    }

    #[tokio::test]
    async fn absent_object_is_uploaded_base64() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404).json_body(serde_json::json!({"message": "Not Found"}));
            })
            .await;
        let write = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path_contains("/repos/alice/papers/contents/pdfs/")
                    .body_contains(&STANDARD.encode(b"%PDF-1.4 new"))
                    .body_contains("\"branch\":\"master\"");
                then.status(201).json_body(serde_json::json!({
                    "content": {
                        "html_url": "https://store.example/h",
                        "download_url": "https://store.example/d"
                    }
                }));
            })
            .await;

        let record = uploader(&server).upload(b"%PDF-1.4 new", "pdf").await.unwrap();
        write.assert_async().await;
        assert_eq!(record.raw_url, "https://store.example/d");
        assert!(record.remote_path.starts_with("pdfs/"));
        assert!(record.remote_path.ends_with(&format!("{}.pdf", record.sha256)));
    }

    #[tokio::test]
    async fn missing_download_url_falls_back_to_raw_template() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(201).json_body(serde_json::json!({
                    "content": { "html_url": "https://store.example/h" }
                }));
            })
            .await;

        let record = uploader(&server).upload(b"bytes", "pdf").await.unwrap();
        assert_eq!(
            record.raw_url,
            format!("https://store.example/alice/papers/raw/master/{}", record.remote_path)
        );
    }

    #[tokio::test]
    async fn already_exists_is_not_retried() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404);
            })
            .await;
        let write = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(400).json_body(serde_json::json!({
                    "message": "A file with this name already exists"
                }));
            })
            .await;

        let err = uploader(&server).upload(b"race", "pdf").await.unwrap_err();
        assert!(matches!(err, DeepReadError::AlreadyExists { .. }), "got {err:?}");
        assert_eq!(write.hits_async().await, 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_exhausted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404);
            })
            .await;
        let write = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(502).body("bad gateway");
            })
            .await;

        let err = uploader(&server).upload(b"flaky", "pdf").await.unwrap_err();
        assert!(
            matches!(err, DeepReadError::HttpStatus { status: 502, .. }),
            "got {err:?}"
        );
        assert_eq!(write.hits_async().await, 3);
    }

    #[tokio::test]
    async fn malformed_upload_response_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(201).json_body(serde_json::json!({"ok": true}));
            })
            .await;

        let err = uploader(&server).upload(b"odd", "pdf").await.unwrap_err();
        match err {
            DeepReadError::UnexpectedResponse { payload, .. } => assert!(payload.contains("ok")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_fails_before_network() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|_when, then| {
                then.status(500);
            })
            .await;

        let err = uploader(&server)
            .upload_file(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeepReadError::FileNotFound { .. }));
        assert_eq!(any.hits_async().await, 0);
    }
}
