//! The bounded predict → fetch → correct → answer state machine.
//!
//! ## Retry budget
//!
//! `max_retries` counts fetch attempts, the initial fetch included:
//! `max_retries = 3` allows one predicted fetch and two corrected ones. The
//! failed-attempt counter only moves when a fetch attempt fails (a
//! prediction or correction call that errors counts as a failed attempt,
//! since no pages came out of it). Once a fetch succeeds the answerer runs
//! exactly once and the loop ends.
//!
//! ## State
//!
//! [`LoopState`] is a value: every transition consumes the old state and
//! returns a new one. Nothing is shared between questions, so one `QaLoop`
//! can serve concurrent `ask` calls.

use crate::backend::ReasoningBackend;
use crate::config::QaConfig;
use crate::error::{PdfQaError, ToolError};
use crate::index::SectionIndex;
use crate::output::{AttemptRecord, PageContent, PagePrediction, QaResult, TerminalReason};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::qa::{Answerer, Corrector, Fetcher, Predictor};
use crate::store::PageStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop is, with exactly the data that step needs.
#[derive(Debug, Clone)]
enum Step {
    Predicting,
    Fetching(PagePrediction),
    Correcting {
        previous: PagePrediction,
        error: ToolError,
    },
    Answering {
        prediction: PagePrediction,
        content: Vec<PageContent>,
    },
    Terminal(QaResult),
}

#[derive(Debug, Clone)]
struct LoopState {
    step: Step,
    /// Failed fetch attempts so far.
    failed_attempts: u32,
    history: Vec<AttemptRecord>,
}

impl LoopState {
    fn start() -> Self {
        Self {
            step: Step::Predicting,
            failed_attempts: 0,
            history: Vec::new(),
        }
    }

    fn with_step(self, step: Step) -> Self {
        Self { step, ..self }
    }

    /// Record a failed attempt and move to correction or exhaustion.
    fn fail(self, prediction: PagePrediction, error: ToolError, max_retries: u32) -> Self {
        let attempt = self.failed_attempts + 1;
        let mut history = self.history;
        history.push(AttemptRecord {
            attempt,
            pages: prediction.pages.clone(),
            reasoning: prediction.reasoning.clone(),
            error: Some(error.clone()),
        });

        let step = if attempt >= max_retries {
            Step::Terminal(QaResult {
                answer: None,
                citations: Vec::new(),
                terminal_reason: TerminalReason::RetriesExhausted,
                attempts: attempt,
                predicted_pages: prediction.pages,
                fetched_pages: Vec::new(),
                history: history.clone(),
            })
        } else {
            Step::Correcting {
                previous: prediction,
                error,
            }
        };

        Self {
            step,
            failed_attempts: attempt,
            history,
        }
    }
}

/// Runs questions against one indexed document.
pub struct QaLoop {
    index: Arc<SectionIndex>,
    store: Arc<dyn PageStore>,
    predictor: Predictor,
    fetcher: Fetcher,
    corrector: Corrector,
    answerer: Answerer,
    progress: ProgressCallback,
}

impl QaLoop {
    pub fn new(
        index: Arc<SectionIndex>,
        store: Arc<dyn PageStore>,
        backend: Arc<dyn ReasoningBackend>,
        config: &QaConfig,
    ) -> Self {
        Self {
            index,
            store,
            predictor: Predictor::new(Arc::clone(&backend), config),
            fetcher: Fetcher::new(config),
            corrector: Corrector::new(Arc::clone(&backend), config),
            answerer: Answerer::new(backend, config),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    pub fn index(&self) -> &SectionIndex {
        &self.index
    }

    /// Answer `question` with at most `max_retries` fetch attempts.
    ///
    /// Tool failures never surface as `Err`: they end in
    /// `TerminalReason::RetriesExhausted`. `Err` means the answer call itself
    /// failed or `max_retries` was 0.
    pub async fn ask(&self, question: &str, max_retries: u32) -> Result<QaResult, PdfQaError> {
        self.ask_with_cancel(question, max_retries, &CancellationToken::new())
            .await
    }

    /// Like [`QaLoop::ask`], returning `Err(Cancelled)` once `cancel` fires.
    ///
    /// Cancellation is checked between steps and also interrupts an
    /// in-flight backend call or page fetch.
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<QaResult, PdfQaError> {
        if max_retries == 0 {
            return Err(PdfQaError::InvalidConfig(
                "max_retries must be ≥ 1 (it counts the first fetch attempt)".into(),
            ));
        }
        info!("Question: {:?} (max {} attempts)", question, max_retries);

        let mut state = LoopState::start();
        loop {
            // A finished result wins over a late cancellation.
            if let Step::Terminal(result) = state.step {
                info!(
                    "Question finished: {:?} after {} attempts",
                    result.terminal_reason, result.attempts
                );
                self.progress
                    .on_question_complete(result.terminal_reason, result.attempts);
                return Ok(result);
            }
            if cancel.is_cancelled() {
                info!("Question cancelled after {} failed attempts", state.failed_attempts);
                return Err(PdfQaError::Cancelled);
            }

            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Question cancelled mid-step");
                    return Err(PdfQaError::Cancelled);
                }
                next = self.advance(question, state, max_retries) => next?,
            };
        }
    }

    /// One transition.
    async fn advance(
        &self,
        question: &str,
        mut state: LoopState,
        max_retries: u32,
    ) -> Result<LoopState, PdfQaError> {
        let attempt = state.failed_attempts + 1;
        let range = self.index.valid_range();

        match std::mem::replace(&mut state.step, Step::Predicting) {
            Step::Predicting => match self.predictor.predict(question, &self.index).await {
                Ok(prediction) => Ok(state.with_step(Step::Fetching(prediction))),
                Err(e) => {
                    let error = ToolError::backend(&e, "prediction", range, None);
                    warn!("Attempt {}: {}", attempt, error.message);
                    self.progress.on_attempt_failed(attempt, &error);
                    Ok(state.fail(PagePrediction::default(), error, max_retries))
                }
            },

            Step::Fetching(prediction) => {
                debug!("Attempt {}: fetching {:?}", attempt, prediction.pages);
                self.progress.on_prediction(attempt, &prediction);
                match self
                    .fetcher
                    .fetch(&prediction.pages, &self.index, self.store.as_ref())
                    .await
                {
                    Ok(content) => Ok(state.with_step(Step::Answering {
                        prediction,
                        content,
                    })),
                    Err(error) => {
                        warn!("Attempt {} failed: {}", attempt, error.message);
                        self.progress.on_attempt_failed(attempt, &error);
                        Ok(state.fail(prediction, error, max_retries))
                    }
                }
            }

            Step::Correcting { previous, error } => {
                match self
                    .corrector
                    .correct(question, &self.index, &previous, &error)
                    .await
                {
                    Ok(prediction) => Ok(state.with_step(Step::Fetching(prediction))),
                    Err(e) => {
                        let hint = error.nearest_section_hint.clone();
                        let failure = ToolError::backend(&e, "correction", range, hint);
                        warn!("Attempt {}: {}", attempt, failure.message);
                        self.progress.on_attempt_failed(attempt, &failure);
                        Ok(state.fail(previous, failure, max_retries))
                    }
                }
            }

            Step::Answering {
                prediction,
                content,
            } => {
                let mut result = self
                    .answerer
                    .answer(question, &content)
                    .await
                    .map_err(PdfQaError::AnswerFailed)?;

                let mut history = std::mem::take(&mut state.history);
                history.push(AttemptRecord {
                    attempt,
                    pages: prediction.pages.clone(),
                    reasoning: prediction.reasoning.clone(),
                    error: None,
                });
                result.attempts = attempt;
                result.fetched_pages = content.iter().map(|c| c.page_number).collect();
                result.predicted_pages = prediction.pages;
                result.history = history;
                Ok(state.with_step(Step::Terminal(result)))
            }

            Step::Terminal(result) => Ok(state.with_step(Step::Terminal(result))),
        }
    }
}
