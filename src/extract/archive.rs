//! Result-archive retrieval: stream download, unpack, prune.
//!
//! The archive is written to `<output_dir>/<task_id>.zip` and guarded by
//! [`TempArchive`], which deletes the file when dropped. Whatever happens
//! between download and extraction, no `.zip` is left behind.

use crate::error::DeepReadError;
use crate::progress::ProgressCallback;
use chrono::{DateTime, Local};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Extensions removed from the top level of an unpacked archive: extraction
/// metadata and the re-embedded source document.
const PRUNED_EXTENSIONS: [&str; 2] = ["json", "pdf"];

/// A downloaded archive that is removed from disk on drop.
struct TempArchive {
    path: PathBuf,
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary archive {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// Download `url`, unpack it under `output_dir` and prune metadata files.
///
/// Returns the freshly created extraction directory.
pub(crate) async fn retrieve(
    client: &reqwest::Client,
    url: &str,
    output_dir: &Path,
    task_id: &str,
    document_name: &str,
    progress: Option<&ProgressCallback>,
) -> Result<PathBuf, DeepReadError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| DeepReadError::io(output_dir, e))?;

    let archive = TempArchive {
        path: output_dir.join(format!("{}.zip", sanitize_component(task_id, "task"))),
    };
    download(client, url, &archive.path, progress).await?;

    let extract_dir = unique_extract_dir(output_dir, document_name, Local::now());
    if let Err(e) = unpack(&archive.path, &extract_dir).await {
        let _ = tokio::fs::remove_dir_all(&extract_dir).await;
        return Err(e);
    }
    drop(archive);

    prune(&extract_dir).await?;
    info!("Extracted result to {}", extract_dir.display());
    Ok(extract_dir)
}

/// Stream `url` into `dest`. Partial files are the caller's guard's concern.
async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<(), DeepReadError> {
    info!("Downloading result archive: {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DeepReadError::transport("archive download", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DeepReadError::HttpStatus {
            operation: "archive download".into(),
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| DeepReadError::io(dest, e))?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DeepReadError::transport("archive download", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DeepReadError::io(dest, e))?;
        downloaded += chunk.len() as u64;
        if let Some(cb) = progress {
            cb.on_download_progress(downloaded, total);
        }
    }
    file.flush().await.map_err(|e| DeepReadError::io(dest, e))?;

    debug!("Downloaded {} bytes to {}", downloaded, dest.display());
    Ok(())
}

/// Unpack `zip_path` into `dir`. The zip crate rejects entries escaping `dir`.
async fn unpack(zip_path: &Path, dir: &Path) -> Result<(), DeepReadError> {
    let zip_path = zip_path.to_path_buf();
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&zip_path).map_err(|e| DeepReadError::io(&zip_path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| DeepReadError::CorruptArchive {
                path: zip_path.clone(),
                detail: e.to_string(),
            })?;
        archive
            .extract(&dir)
            .map_err(|e| DeepReadError::CorruptArchive {
                path: zip_path.clone(),
                detail: e.to_string(),
            })
    })
    .await
    .map_err(|e| DeepReadError::Internal(format!("unpack task panicked: {e}")))?
}

/// Delete top-level metadata and source-document files.
async fn prune(dir: &Path) -> Result<(), DeepReadError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DeepReadError::io(dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DeepReadError::io(dir, e))?
    {
        let path = entry.path();
        let prunable = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| PRUNED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if prunable && path.is_file() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| DeepReadError::io(&path, e))?;
            debug!("Pruned {}", path.display());
        }
    }
    Ok(())
}

/// `<output_dir>/<YYYYmmddHHMMSS>_<name>`, suffixed `_2`, `_3`, … if taken.
pub(crate) fn unique_extract_dir(
    output_dir: &Path,
    document_name: &str,
    now: DateTime<Local>,
) -> PathBuf {
    let base = format!(
        "{}_{}",
        now.format("%Y%m%d%H%M%S"),
        sanitize_component(document_name, "document")
    );
    let mut candidate = output_dir.join(&base);
    let mut n = 2;
    while candidate.exists() {
        candidate = output_dir.join(format!("{base}_{n}"));
        n += 1;
    }
    candidate
}

/// Make `raw` safe as a single path component.
fn sanitize_component(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
