//! LLM transport: the production [`ReasoningBackend`] over `edgequake-llm`.
//!
//! All prompt engineering lives in [`crate::prompts`]; this module only
//! builds chat messages, picks sampling parameters and retries transient
//! failures.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx errors are transient and frequent under concurrent
//! indexing. Exponential backoff (`retry_backoff_ms * 2^attempt`) with 500 ms
//! base and 3 retries waits 500 ms → 1 s → 2 s before giving up. The
//! question loop's own timeout bounds the whole sequence.

use crate::backend::ReasoningBackend;
use crate::config::{CallPurpose, QaConfig};
use crate::error::{BackendError, PdfQaError};
use crate::output::PageImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// System message sent with every call.
const SYSTEM_PROMPT: &str =
    "You answer questions about a single PDF document. Follow the requested output format exactly.";

/// [`ReasoningBackend`] backed by an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    config: QaConfig,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &QaConfig) -> Self {
        Self {
            provider,
            config: config.clone(),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: &QaConfig) -> Result<Self, PdfQaError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    fn build_messages(prompt: &str, images: &[PageImage]) -> Vec<ChatMessage> {
        let user = if images.is_empty() {
            ChatMessage::user(prompt)
        } else {
            let data = images
                .iter()
                .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high"))
                .collect();
            ChatMessage::user_with_images(prompt, data)
        };
        vec![ChatMessage::system(SYSTEM_PROMPT), user]
    }
}

/// Build `CompletionOptions` for one kind of call.
fn build_options(config: &QaConfig, purpose: CallPurpose) -> CompletionOptions {
    let sampling = config.sampling(purpose);
    CompletionOptions {
        temperature: Some(sampling.temperature),
        max_tokens: Some(sampling.max_tokens),
        ..Default::default()
    }
}

/// Delay before transport retry `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl ReasoningBackend for LlmBackend {
    async fn complete(
        &self,
        purpose: CallPurpose,
        prompt: &str,
        images: &[PageImage],
    ) -> Result<String, BackendError> {
        let start = Instant::now();
        let messages = Self::build_messages(prompt, images);
        let options = build_options(&self.config, purpose);

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.config.backend_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "{:?} call: retry {}/{} after {}ms",
                    purpose, attempt, self.config.backend_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{:?} call: {} input tokens, {} output tokens, {:?}",
                        purpose,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{:?} call: attempt {} failed: {}", purpose, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(BackendError::Unavailable {
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PdfQaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PdfQaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &QaConfig) -> Result<Arc<dyn LLMProvider>, PdfQaError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PdfQaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
