//! Progress-callback trait for indexing and question-loop events.
//!
//! Inject an [`Arc<dyn QaProgressCallback>`] via
//! [`crate::config::QaConfigBuilder::progress_callback`] to observe sections
//! being summarised and each step of a question. All methods default to
//! no-ops so implementors override only what they display.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfqa::{QaConfig, QaProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SectionCounter(AtomicUsize);
//!
//! impl QaProgressCallback for SectionCounter {
//!     fn on_section_complete(&self, section_id: usize, total_sections: usize) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("section {section_id} done ({done}/{total_sections})");
//!     }
//! }
//!
//! let config = QaConfig::builder()
//!     .progress_callback(Arc::new(SectionCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ToolError;
use crate::output::{PagePrediction, TerminalReason};
use std::sync::Arc;

/// Observer for indexing and question-loop events.
///
/// Implementations must be `Send + Sync`: sections are summarised
/// concurrently, and independent questions may run in parallel.
pub trait QaProgressCallback: Send + Sync {
    /// Called once before any section is summarised.
    fn on_indexing_start(&self, total_sections: usize) {
        let _ = total_sections;
    }

    /// Called just before a section's summary request is sent.
    fn on_section_start(&self, section_id: usize, total_sections: usize) {
        let _ = (section_id, total_sections);
    }

    fn on_section_complete(&self, section_id: usize, total_sections: usize) {
        let _ = (section_id, total_sections);
    }

    /// Called when a section fails; the indexing run aborts afterwards.
    fn on_section_error(&self, section_id: usize, total_sections: usize, error: &str) {
        let _ = (section_id, total_sections, error);
    }

    fn on_indexing_complete(&self, total_sections: usize) {
        let _ = total_sections;
    }

    /// A prediction (initial or corrected) is about to be fetched.
    fn on_prediction(&self, attempt: u32, prediction: &PagePrediction) {
        let _ = (attempt, prediction);
    }

    /// A fetch attempt failed and will be corrected or end the loop.
    fn on_attempt_failed(&self, attempt: u32, error: &ToolError) {
        let _ = (attempt, error);
    }

    fn on_question_complete(&self, reason: TerminalReason, attempts: u32) {
        let _ = (reason, attempts);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl QaProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::QaConfig`].
pub type ProgressCallback = Arc<dyn QaProgressCallback>;
