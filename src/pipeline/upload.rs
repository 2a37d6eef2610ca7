//! Upload step: put the local PDF into the content store.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::context::PipelineContext;
use super::executor::Step;
use crate::error::DeepReadError;
use crate::upload::ContentAddressedUploader;

/// Requires `pdf_path`; produces `pdf_url`, `pdf_raw_url`, `pdf_sha256` and
/// `original_filename` (the file stem).
pub struct PdfUploadStep {
    uploader: ContentAddressedUploader,
}

impl PdfUploadStep {
    pub const NAME: &'static str = "upload PDF";

    pub fn new(uploader: ContentAddressedUploader) -> Self {
        Self { uploader }
    }
}

#[async_trait]
impl Step for PdfUploadStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext, DeepReadError> {
        let pdf_path = Path::new(context.require_str(Self::NAME, "pdf_path")?);
        let record = self.uploader.upload_file(pdf_path).await?;
        info!("PDF available at {}", record.html_url);

        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(PipelineContext::new()
            .with("pdf_url", record.html_url)
            .with("pdf_raw_url", record.raw_url)
            .with("pdf_sha256", record.sha256)
            .with("original_filename", stem))
    }
}
