//! # edgequake-pdfqa
//!
//! Answer questions about long PDF documents with an LLM that reads only the
//! pages it needs.
//!
//! ## How it works
//!
//! A document is split into fixed-size sections and each section is
//! summarised once (the *index*). A question then runs a bounded loop:
//!
//! ```text
//! question
//!  │
//!  ├─ 1. Predict  route to candidate pages from section summaries
//!  ├─ 2. Fetch    validate the pages, read them from the PDF
//!  │     └─ on error: Correct  re-predict with the error as context
//!  │                  (at most max_retries fetch attempts in total)
//!  └─ 3. Answer   answer from the fetched pages, with [Page N] citations
//! ```
//!
//! Every prompt carries the document's page count and section boundaries,
//! and a failed fetch (empty list, page out of range, missing page) is
//! returned to the model as structured feedback instead of aborting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfqa::{PdfQa, QaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = QaConfig::default();
//!     let session = PdfQa::open("annual-report.pdf", &config, false).await?;
//!     let result = session.ask("What was the revenue in 2023?").await?;
//!     match result.answer {
//!         Some(answer) => println!("{answer}\nSources: {:?}", result.citations),
//!         None => println!("No answer ({:?})", result.terminal_reason),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfqa` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfqa = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod qa;
pub mod session;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::ReasoningBackend;
pub use config::{CallPurpose, QaConfig, QaConfigBuilder, Sampling};
pub use error::{BackendError, PageStoreError, PdfQaError, ToolError, ToolErrorKind};
pub use index::{IndexStore, JsonIndexStore, SectionIndex};
pub use indexer::Indexer;
pub use output::{
    AttemptRecord, DocumentMetadata, PageContent, PageImage, PagePrediction, PdfProperties,
    QaResult, SectionSummary, TerminalReason,
};
pub use pipeline::llm::LlmBackend;
pub use pipeline::render::PdfPageStore;
pub use progress::{NoopProgressCallback, ProgressCallback, QaProgressCallback};
pub use qa::QaLoop;
pub use session::{inspect, load_or_build_index, PdfQa};
pub use store::{MemoryPageStore, PageStore};
pub use tokio_util::sync::CancellationToken;
