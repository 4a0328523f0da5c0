//! The question loop: predict pages, fetch them, correct on failure, answer.
//!
//! ```text
//! Predicting ──▶ Fetching ──ok──▶ Answering ──▶ Terminal
//!                  │  ▲
//!                error│
//!                  ▼  │
//!               Correcting   (while attempts < max_retries)
//! ```
//!
//! Each stage is a small struct with one async method so it can be tested
//! against a scripted [`crate::backend::ReasoningBackend`] and a
//! [`crate::store::MemoryPageStore`]. [`orchestrator::QaLoop`] wires them
//! together and owns the retry budget.

pub mod answerer;
pub mod corrector;
pub mod fetcher;
pub mod orchestrator;
pub mod predictor;

pub use answerer::Answerer;
pub use corrector::Corrector;
pub use fetcher::Fetcher;
pub use orchestrator::QaLoop;
pub use predictor::Predictor;
