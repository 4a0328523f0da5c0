//! Configuration for indexing and question answering.
//!
//! Every knob lives in [`QaConfig`], built via its [`QaConfigBuilder`]. One
//! struct is easy to share across concurrent questions (it is `Clone` and
//! cheap) and easy to print when comparing two runs.

use crate::error::PdfQaError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a question-answering session.
///
/// # Example
/// ```rust
/// use edgequake_pdfqa::QaConfig;
///
/// let config = QaConfig::builder()
///     .chunk_size(10)
///     .max_retries(3)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct QaConfig {
    /// Pages per section when indexing. Default: 10.
    pub chunk_size: usize,

    /// Maximum fetch attempts per question, the initial fetch included.
    /// Default: 3 (one prediction plus two corrections).
    pub max_retries: u32,

    /// Pages kept from a single prediction. Default: 20.
    pub max_pages_per_prediction: usize,

    /// Section summaries shown to the router; 0 shows all. Default: 0.
    ///
    /// Section boundaries are always listed in full regardless of this cap.
    pub router_max_sections: usize,

    /// Sections summarised concurrently while indexing. Default: 1.
    ///
    /// Free and low-tier API plans often allow only a handful of concurrent
    /// connections; raise this when the provider tolerates it.
    pub indexing_concurrency: usize,

    /// Pause before each section summary call, in milliseconds. Default: 0.
    pub api_delay_ms: u64,

    /// Upper bound for any single reasoning call or page fetch, in
    /// milliseconds. Default: 60 000.
    pub call_timeout_ms: u64,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Transport-level retries per reasoning call. Default: 3.
    pub backend_retries: u32,

    /// Initial transport retry delay in milliseconds, doubled per attempt.
    /// Default: 500.
    pub retry_backoff_ms: u64,

    /// Rendering DPI for page images: a page `w` points wide renders
    /// `w * dpi / 72` pixels wide. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either edge of a rendered page image in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Render page images and forward them to the answer call. Default: true.
    pub use_vision: bool,

    /// Page images forwarded to the answer call. Default: 1.
    pub max_answer_images: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Directory holding persisted section indexes. Default: `.pdfqa/indices`.
    pub index_dir: PathBuf,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            max_retries: 3,
            max_pages_per_prediction: 20,
            router_max_sections: 0,
            indexing_concurrency: 1,
            api_delay_ms: 0,
            call_timeout_ms: 60_000,
            model: None,
            provider_name: None,
            provider: None,
            backend_retries: 3,
            retry_backoff_ms: 500,
            dpi: 150,
            max_rendered_pixels: 2000,
            use_vision: true,
            max_answer_images: 1,
            password: None,
            download_timeout_secs: 120,
            index_dir: PathBuf::from(".pdfqa/indices"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for QaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaConfig")
            .field("chunk_size", &self.chunk_size)
            .field("max_retries", &self.max_retries)
            .field("max_pages_per_prediction", &self.max_pages_per_prediction)
            .field("router_max_sections", &self.router_max_sections)
            .field("indexing_concurrency", &self.indexing_concurrency)
            .field("api_delay_ms", &self.api_delay_ms)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend_retries", &self.backend_retries)
            .field("use_vision", &self.use_vision)
            .field("max_answer_images", &self.max_answer_images)
            .field("index_dir", &self.index_dir)
            .finish()
    }
}

impl QaConfig {
    pub fn builder() -> QaConfigBuilder {
        QaConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Sampling parameters for each kind of reasoning call.
    pub fn sampling(&self, purpose: CallPurpose) -> Sampling {
        match purpose {
            CallPurpose::Summarize => Sampling {
                temperature: 0.3,
                max_tokens: 1000,
            },
            CallPurpose::Predict => Sampling {
                temperature: 0.3,
                max_tokens: 500,
            },
            CallPurpose::Correct => Sampling {
                temperature: 0.3,
                max_tokens: 200,
            },
            CallPurpose::Answer => Sampling {
                temperature: 0.5,
                max_tokens: 2000,
            },
        }
    }
}

/// Builder for [`QaConfig`].
#[derive(Debug)]
pub struct QaConfigBuilder {
    config: QaConfig,
}

impl QaConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn max_pages_per_prediction(mut self, n: usize) -> Self {
        self.config.max_pages_per_prediction = n.max(1);
        self
    }

    pub fn router_max_sections(mut self, n: usize) -> Self {
        self.config.router_max_sections = n;
        self
    }

    pub fn indexing_concurrency(mut self, n: usize) -> Self {
        self.config.indexing_concurrency = n.max(1);
        self
    }

    pub fn api_delay_ms(mut self, ms: u64) -> Self {
        self.config.api_delay_ms = ms;
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.config.call_timeout_ms = ms;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn backend_retries(mut self, n: u32) -> Self {
        self.config.backend_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn use_vision(mut self, v: bool) -> Self {
        self.config.use_vision = v;
        self
    }

    pub fn max_answer_images(mut self, n: usize) -> Self {
        self.config.max_answer_images = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<QaConfig, PdfQaError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(PdfQaError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if c.max_retries == 0 {
            return Err(PdfQaError::InvalidConfig(
                "max_retries must be ≥ 1 (it counts the first fetch attempt)".into(),
            ));
        }
        if c.call_timeout_ms == 0 {
            return Err(PdfQaError::InvalidConfig(
                "call_timeout_ms must be > 0".into(),
            ));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PdfQaError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}

/// Which step of the system a reasoning call serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Summarize,
    Predict,
    Correct,
    Answer,
}

/// Temperature and output cap for one reasoning call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: usize,
}
