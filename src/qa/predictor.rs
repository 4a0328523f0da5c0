//! Initial page prediction from the section summaries.

use crate::backend::{with_timeout, ReasoningBackend};
use crate::config::{CallPurpose, QaConfig};
use crate::error::BackendError;
use crate::index::SectionIndex;
use crate::output::PagePrediction;
use crate::pipeline::parse::{parse_route_reply, PageTarget, RouteReply};
use crate::prompts;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The backend call shared by prediction and correction: send a routing
/// prompt, parse the page list, resolve it against the index.
pub(crate) struct PageRouter {
    backend: Arc<dyn ReasoningBackend>,
    max_pages: usize,
    router_max_sections: usize,
    timeout: Duration,
}

impl PageRouter {
    pub(crate) fn new(backend: Arc<dyn ReasoningBackend>, config: &QaConfig) -> Self {
        Self {
            backend,
            max_pages: config.max_pages_per_prediction,
            router_max_sections: config.router_max_sections,
            timeout: config.call_timeout(),
        }
    }

    pub(crate) fn router_max_sections(&self) -> usize {
        self.router_max_sections
    }

    pub(crate) async fn route(
        &self,
        purpose: CallPurpose,
        prompt: &str,
        index: &SectionIndex,
    ) -> Result<PagePrediction, BackendError> {
        debug!("{:?} prompt: {} chars", purpose, prompt.len());
        let reply = with_timeout(self.timeout, self.backend.complete(purpose, prompt, &[]))
            .await
            .map_err(|e| e.into_backend_error())?;
        Ok(resolve_reply(parse_route_reply(&reply), index, self.max_pages))
    }
}

/// Asks the backend which pages answer a question.
pub struct Predictor {
    router: PageRouter,
}

impl Predictor {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &QaConfig) -> Self {
        Self {
            router: PageRouter::new(backend, config),
        }
    }

    /// Predict candidate pages for `question`.
    ///
    /// The result may be empty or out of range; validating it is the
    /// fetcher's job.
    pub async fn predict(
        &self,
        question: &str,
        index: &SectionIndex,
    ) -> Result<PagePrediction, BackendError> {
        let prompt = prompts::router_prompt(
            question,
            index.metadata(),
            index.summaries(),
            self.router.router_max_sections(),
        );
        let prediction = self.router.route(CallPurpose::Predict, &prompt, index).await?;
        debug!("Predicted pages {:?}", prediction.pages);
        Ok(prediction)
    }
}

/// Turn a parsed reply into a prediction: sections expand to their pages,
/// duplicates go, and the list is capped at `max_pages`. Pages are never
/// clamped into range.
pub(crate) fn resolve_reply(
    reply: RouteReply,
    index: &SectionIndex,
    max_pages: usize,
) -> PagePrediction {
    let pages: Vec<usize> = match reply.target {
        PageTarget::Pages(pages) => pages,
        PageTarget::Section(id) => index
            .summaries()
            .iter()
            .find(|s| s.section_id == id)
            .map(|s| s.pages().collect())
            .unwrap_or_default(),
    };
    PagePrediction::new(pages, reply.reasoning).truncated(max_pages)
}
