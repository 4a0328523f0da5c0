//! The reasoning-backend seam.
//!
//! Predictor, corrector, answerer and indexer all talk to a model through
//! [`ReasoningBackend`]: a prompt (plus optional page images) in, text out.
//! The production implementation is [`crate::pipeline::llm::LlmBackend`];
//! tests substitute a scripted backend.

use crate::config::CallPurpose;
use crate::error::BackendError;
use crate::output::PageImage;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Opaque text-completion capability.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Complete `prompt`, optionally looking at `images`.
    ///
    /// `purpose` lets the backend pick sampling parameters; it must not
    /// change the contract.
    async fn complete(
        &self,
        purpose: CallPurpose,
        prompt: &str,
        images: &[PageImage],
    ) -> Result<String, BackendError>;
}

/// Run `fut` as one logical unit bounded by `limit`.
pub(crate) async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, TimedOut<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(TimedOut::Failed(e)),
        Err(_) => Err(TimedOut::Elapsed(limit)),
    }
}

/// Outcome of a call that either failed on its own or ran out of time.
#[derive(Debug)]
pub(crate) enum TimedOut<E> {
    Failed(E),
    Elapsed(Duration),
}

impl TimedOut<BackendError> {
    pub(crate) fn into_backend_error(self) -> BackendError {
        match self {
            TimedOut::Failed(e) => e,
            TimedOut::Elapsed(d) => BackendError::Timeout {
                ms: d.as_millis() as u64,
            },
        }
    }
}
