//! Text-generation collaborator used by the summary step.
//!
//! The pipeline only depends on the [`TextGenerator`] trait: hand it a system
//! instruction and a document body, get text and token counts back. The
//! production implementation, [`LlmTextGenerator`], sits on an `edgequake-llm`
//! provider; tests plug in a canned generator instead.

use crate::config::DeepReadConfig;
use crate::error::DeepReadError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used with a named provider when none is configured.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Text returned by one generation call, with its token usage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, document: &str) -> Result<Generation, DeepReadError>;
}

/// [`TextGenerator`] backed by an `edgequake-llm` chat provider.
pub struct LlmTextGenerator {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    /// Resolve a provider from `config` and wrap it.
    pub fn from_config(config: &DeepReadConfig) -> Result<Self, DeepReadError> {
        Ok(Self::new(resolve_provider(config)?, config.max_tokens))
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, system: &str, document: &str) -> Result<Generation, DeepReadError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(document)];
        let options = CompletionOptions {
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DeepReadError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "Generation used {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DeepReadError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        DeepReadError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn default_model_for(provider: &str) -> &'static str {
    if provider.eq_ignore_ascii_case("anthropic") {
        DEFAULT_ANTHROPIC_MODEL
    } else {
        DEFAULT_MODEL
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. the pre-built `config.provider`;
/// 2. `config.provider_name` with `config.model` (or a per-provider default);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. `ANTHROPIC_API_KEY`, then `OPENAI_API_KEY`;
/// 5. whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &DeepReadConfig) -> Result<Arc<dyn LLMProvider>, DeepReadError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = &config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_provider(name, model);
    }

    if let (Some(provider), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&provider, &model);
    }

    for (key, provider) in [("ANTHROPIC_API_KEY", "anthropic"), ("OPENAI_API_KEY", "openai")] {
        if non_empty_env(key).is_some() {
            let model = config
                .model
                .as_deref()
                .unwrap_or_else(|| default_model_for(provider));
            return create_provider(provider, model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DeepReadError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
