//! Integration tests: whole pipeline runs against mocked remote services.
//!
//! The content store and the extraction service are served by `httpmock`;
//! text generation is a canned [`TextGenerator`]. Nothing leaves the machine.

use async_trait::async_trait;
use deepread::{
    process_with_generator, DeepReadConfig, DeepReadError, Generation, Mode, SummaryOptions,
    TextGenerator,
};
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct CannedGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _system: &str, document: &str) -> Result<Generation, DeepReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(document.starts_with("Document content:\n\n"));
        Ok(Generation {
            text: "# Summary\n\nShort.".into(),
            input_tokens: 42,
            output_tokens: 7,
        })
    }
}

fn result_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("full.md", options).unwrap();
    writer.write_all(b"# Paper\n\nExtracted body.").unwrap();
    writer.start_file("paper_origin.pdf", options).unwrap();
    writer.write_all(b"%PDF").unwrap();
    writer.start_file("paper_content_list.json", options).unwrap();
    writer.write_all(b"[]").unwrap();
    writer.finish().unwrap().into_inner()
}

fn config(server: &MockServer, out: &Path) -> DeepReadConfig {
    DeepReadConfig::builder()
        .store_api_base(server.url("/api/v5"))
        .store_web_base(server.base_url())
        .store_owner("alice")
        .store_repo("papers")
        .store_token("store-token")
        .extraction_api_url(server.url("/api/v4/extract/task"))
        .extraction_api_key("sk-extract")
        .poll_interval_ms(10)
        .job_timeout_secs(30)
        .retry_backoff_ms(1)
        .output_dir(out.join("output"))
        .prompts_dir(out.join("prompts"))
        .build()
        .unwrap()
}

fn write_pdf(dir: &Path) -> PathBuf {
    let p = dir.join("paper.pdf");
    std::fs::write(&p, b"%PDF-1.7\nfake body for hashing").unwrap();
    p
}

fn zip_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "zip").unwrap_or(false))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Extraction service that immediately reports `state` for task `t-1`.
async fn mock_extraction(server: &MockServer, state_data: serde_json::Value) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v4/extract/task")
                .header("authorization", "Bearer sk-extract");
            then.status(200)
                .json_body(json!({"code": 0, "data": {"task_id": "t-1"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/extract/task/t-1");
            then.status(200)
                .json_body(json!({"code": 0, "msg": "ok", "data": state_data}));
        })
        .await;
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_uploads_extracts_and_summarises() {
    let server = MockServer::start_async().await;
    let tmp = TempDir::new().unwrap();
    let pdf = write_pdf(tmp.path());

    let lookup = server
        .mock_async(|when, then| {
            when.method(GET)
                .path_contains("/api/v5/repos/alice/papers/contents/pdfs/");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path_contains("/api/v5/repos/alice/papers/contents/pdfs/")
                .body_contains("\"branch\":\"master\"");
            then.status(201).json_body(json!({
                "content": {
                    "html_url": "https://store.example/alice/papers/blob/master/pdfs/x.pdf",
                    "download_url": "https://store.example/alice/papers/raw/master/pdfs/x.pdf"
                }
            }));
        })
        .await;
    let zip_url = server.url("/cdn/t-1.zip");
    mock_extraction(&server, json!({"state": "done", "full_zip_url": zip_url})).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/cdn/t-1.zip");
            then.status(200).body(result_zip());
        })
        .await;

    let generator = Arc::new(CannedGenerator::default());
    let config = config(&server, tmp.path());
    let run = process_with_generator(
        &pdf,
        Mode::Full,
        &SummaryOptions::default(),
        &config,
        generator.clone(),
    )
    .await
    .unwrap();

    lookup.assert_async().await;
    upload.assert_async().await;
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let ctx = &run.context;
    assert_eq!(ctx.get_str("task_id"), Some("t-1"));
    assert_eq!(ctx.get_str("original_filename"), Some("paper"));
    assert_eq!(ctx.get_str("markdown_content"), Some("# Paper\n\nExtracted body."));
    assert_eq!(ctx.get_u64("input_tokens"), Some(42));

    let extract_dir = ctx.get_path("extract_dir").unwrap();
    assert!(extract_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_paper"));
    assert!(!extract_dir.join("paper_origin.pdf").exists());
    assert!(!extract_dir.join("paper_content_list.json").exists());

    let summary_path = ctx.get_path("output_path").unwrap();
    assert_eq!(summary_path, extract_dir.join("summary.md"));
    assert_eq!(
        std::fs::read_to_string(&summary_path).unwrap(),
        "# Summary\n\nShort."
    );

    assert!(zip_files(&tmp.path().join("output")).is_empty());
    let names: Vec<_> = run.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        ["upload PDF", "parse PDF", "generate summary", "save summary"]
    );
}

#[tokio::test]
async fn identical_pdf_is_never_uploaded_twice() {
    let server = MockServer::start_async().await;
    let tmp = TempDir::new().unwrap();
    let pdf = write_pdf(tmp.path());

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path_contains("/api/v5/repos/alice/papers/contents/pdfs/")
                .query_param("access_token", "store-token")
                .query_param("ref", "master");
            then.status(200).json_body(json!([{
                "html_url": "https://store.example/blob/existing.pdf",
                "download_url": "https://store.example/raw/existing.pdf"
            }]));
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/api/v5/repos/");
            then.status(201).json_body(json!({"content": {}}));
        })
        .await;
    let submit_body = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v4/extract/task")
                .json_body_partial(r#"{"url": "https://store.example/raw/existing.pdf"}"#);
            then.status(200)
                .json_body(json!({"code": 0, "data": {"task_id": "t-1"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/extract/task/t-1");
            then.status(200).json_body(json!({"code": 0, "data": {"state": "done"}}));
        })
        .await;

    let config = config(&server, tmp.path());
    let generator = Arc::new(CannedGenerator::default());
    for _ in 0..2 {
        let run = process_with_generator(
            &pdf,
            Mode::Parse,
            &SummaryOptions::default(),
            &config,
            generator.clone(),
        )
        .await
        .unwrap();
        assert_eq!(
            run.context.get_str("pdf_raw_url"),
            Some("https://store.example/raw/existing.pdf")
        );
        // Done without an archive: no Markdown keys.
        assert!(!run.context.contains("markdown_path"));
    }

    assert_eq!(upload.hits_async().await, 0);
    assert_eq!(submit_body.hits_async().await, 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_task_aborts_before_summary() {
    let server = MockServer::start_async().await;
    let tmp = TempDir::new().unwrap();
    let pdf = write_pdf(tmp.path());

    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/v5/repos/");
            then.status(200).json_body(json!({
                "html_url": "https://store.example/blob/x.pdf",
                "download_url": "https://store.example/raw/x.pdf"
            }));
        })
        .await;
    mock_extraction(
        &server,
        json!({"state": "failed", "err_msg": "file is encrypted"}),
    )
    .await;

    let generator = Arc::new(CannedGenerator::default());
    let err = process_with_generator(
        &pdf,
        Mode::Full,
        &SummaryOptions::default(),
        &config(&server, tmp.path()),
        generator.clone(),
    )
    .await
    .unwrap_err();

    match err {
        DeepReadError::TaskFailed { task_id, message } => {
            assert_eq!(task_id, "t-1");
            assert_eq!(message, "file is encrypted");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(!tmp.path().join("output").join("summary.md").exists());
}

#[tokio::test]
async fn markdown_input_is_summarised_without_network() {
    let tmp = TempDir::new().unwrap();
    let md = tmp.path().join("notes.md");
    std::fs::write(&md, "# Notes\n\nSomething worth summarising.").unwrap();
    let target = tmp.path().join("out").join("notes_summary.md");

    let config = DeepReadConfig::builder()
        .output_dir(tmp.path().join("output"))
        .prompts_dir(tmp.path().join("prompts"))
        .build()
        .unwrap();
    let generator = Arc::new(CannedGenerator::default());
    let options = SummaryOptions {
        style: Some("detailed".into()),
        custom_prompt: None,
        output_path: Some(target.clone()),
    };

    let run = process_with_generator(&md, Mode::Full, &options, &config, generator.clone())
        .await
        .unwrap();

    assert_eq!(run.pipeline, "summary");
    assert_eq!(run.context.get_path("output_path"), Some(target.clone()));
    assert_eq!(std::fs::read_to_string(target).unwrap(), "# Summary\n\nShort.");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("report.docx");
    std::fs::write(&doc, b"PK").unwrap();

    let err = process_with_generator(
        &doc,
        Mode::Full,
        &SummaryOptions::default(),
        &DeepReadConfig::default(),
        Arc::new(CannedGenerator::default()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeepReadError::UnsupportedInput { .. }), "got {err:?}");
}
