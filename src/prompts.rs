//! System prompts for document summarisation.
//!
//! A run picks its system prompt in this order:
//!
//! 1. an explicit custom prompt, verbatim;
//! 2. the style prompt file `<prompts_dir>/<style>.md` for a known style;
//! 3. [`DEFAULT_SUMMARY_PROMPT`].
//!
//! Falling back from (2) to (3) logs a warning but never fails the run.

use std::path::Path;
use tracing::{debug, warn};

/// Style used when the caller does not choose one.
pub const DEFAULT_STYLE: &str = "detailed";

/// Styles backed by a prompt file.
pub const KNOWN_STYLES: &[&str] = &[DEFAULT_STYLE];

/// Built-in prompt used when no style file is available.
pub const DEFAULT_SUMMARY_PROMPT: &str = r#"You are a professional document analysis assistant. Read the following Markdown document carefully and produce a detailed summary report.

Requirements:
1. The summary must be thorough and cover every key piece of information in the document
2. Keep the logic clear and the structure complete
3. Write the output in Markdown
4. Include the following sections:
   - Key points
   - Detailed content
   - Key conclusions
   - Practical recommendations (if applicable)

Begin the analysis:"#;

/// Wrap the document body for the user turn of the request.
pub fn document_message(markdown: &str) -> String {
    format!("Document content:\n\n{markdown}")
}

/// Resolve the system prompt for one summary request.
pub async fn resolve_system_prompt(
    prompts_dir: &Path,
    style: &str,
    custom_prompt: Option<&str>,
) -> String {
    if let Some(custom) = custom_prompt.filter(|p| !p.trim().is_empty()) {
        debug!("Using custom prompt ({} chars)", custom.len());
        return custom.to_string();
    }

    if !KNOWN_STYLES.contains(&style) {
        warn!("Unsupported summary style '{}', using the default prompt", style);
        return DEFAULT_SUMMARY_PROMPT.to_string();
    }

    let file = prompts_dir.join(format!("{style}.md"));
    match tokio::fs::read_to_string(&file).await {
        Ok(prompt) if !prompt.trim().is_empty() => {
            debug!("Loaded style prompt from {}", file.display());
            prompt
        }
        Ok(_) => {
            warn!("{} is empty, using the default prompt", file.display());
            DEFAULT_SUMMARY_PROMPT.to_string()
        }
        Err(e) => {
            warn!("Could not read {} ({}), using the default prompt", file.display(), e);
            DEFAULT_SUMMARY_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn document_message_prefixes_body() {
        assert_eq!(document_message("# T"), "Document content:\n\n# T");
    }

    #[tokio::test]
    async fn custom_prompt_wins_over_style() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("detailed.md"), "from file").unwrap();
        let p = resolve_system_prompt(tmp.path(), "detailed", Some("be brief")).await;
        assert_eq!(p, "be brief");
    }

    #[tokio::test]
    async fn detailed_style_reads_prompt_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("detailed.md"), "from file").unwrap();
        let p = resolve_system_prompt(tmp.path(), "detailed", None).await;
        assert_eq!(p, "from file");
    }

    #[tokio::test]
    async fn missing_style_file_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let p = resolve_system_prompt(tmp.path(), "detailed", None).await;
        assert_eq!(p, DEFAULT_SUMMARY_PROMPT);
    }

    #[tokio::test]
    async fn unknown_style_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("casual.md"), "ignored").unwrap();
        let p = resolve_system_prompt(tmp.path(), "casual", None).await;
        assert_eq!(p, DEFAULT_SUMMARY_PROMPT);
    }

    #[tokio::test]
    async fn blank_custom_prompt_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let p = resolve_system_prompt(tmp.path(), "detailed", Some("   ")).await;
        assert_eq!(p, DEFAULT_SUMMARY_PROMPT);
    }
}
