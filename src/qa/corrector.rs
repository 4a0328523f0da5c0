//! Corrected predictions after a failed fetch attempt.

use crate::backend::ReasoningBackend;
use crate::config::{CallPurpose, QaConfig};
use crate::error::{BackendError, ToolError};
use crate::index::SectionIndex;
use crate::output::PagePrediction;
use crate::prompts;
use crate::qa::predictor::PageRouter;
use std::sync::Arc;
use tracing::debug;

/// Re-asks the backend with the previous prediction and the tool error.
pub struct Corrector {
    router: PageRouter,
}

impl Corrector {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &QaConfig) -> Self {
        Self {
            router: PageRouter::new(backend, config),
        }
    }

    /// The output goes back through the fetcher like any other prediction.
    pub async fn correct(
        &self,
        question: &str,
        index: &SectionIndex,
        previous: &PagePrediction,
        error: &ToolError,
    ) -> Result<PagePrediction, BackendError> {
        let prompt = prompts::correction_prompt(
            question,
            index.metadata(),
            index.summaries(),
            self.router.router_max_sections(),
            previous,
            error,
        );
        let prediction = self.router.route(CallPurpose::Correct, &prompt, index).await?;
        debug!(
            "Corrected pages {:?} -> {:?}",
            previous.pages, prediction.pages
        );
        Ok(prediction)
    }
}
