//! Error types for the edgequake-pdfqa library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`PdfQaError`]: **Fatal**: the operation cannot proceed at all (bad
//!   input file, malformed index, provider not configured, indexing call
//!   failed). Returned as `Err(PdfQaError)`.
//!
//! * [`ToolError`]: **Recoverable**: one fetch attempt of the question loop
//!   failed (empty prediction, page out of range, page missing, a reasoning
//!   call timed out). It never escapes the loop; it becomes context for the
//!   next correction and, once the retry budget is spent, is recorded in the
//!   attempt history of the final [`crate::output::QaResult`].
//!
//! [`PageStoreError`] and [`BackendError`] are the failure types of the two
//! collaborator seams ([`crate::store::PageStore`] and
//! [`crate::backend::ReasoningBackend`]).

use crate::output::SectionSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfqa library.
#[derive(Debug, Error)]
pub enum PdfQaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document has no pages, so there is nothing to index.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Index errors ──────────────────────────────────────────────────────
    /// The section index violates its structural invariants.
    #[error("Invalid section index: {0}")]
    InvalidIndex(String),

    /// Summarising one section failed; the indexing run is aborted.
    #[error("Indexing failed on section {section} (pages {first}-{last}): {source}")]
    IndexingFailed {
        section: usize,
        first: usize,
        last: usize,
        #[source]
        source: BackendError,
    },

    /// Reading the text of a section's pages failed during indexing.
    #[error("Indexing failed on section {section}: {source}")]
    SectionUnreadable {
        section: usize,
        #[source]
        source: PageStoreError,
    },

    /// Reading or writing a persisted index failed.
    #[error("Index file '{path}': {detail}")]
    IndexIo { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The answer call failed after the pages were fetched successfully.
    #[error("Answer generation failed: {0}")]
    AnswerFailed(#[source] BackendError),

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single reasoning-backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The call did not complete within the configured timeout.
    #[error("reasoning call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The backend returned an error (after its own retries).
    #[error("reasoning backend unavailable: {detail}")]
    Unavailable { detail: String },
}

/// Failure of a [`crate::store::PageStore`] lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStoreError {
    /// The page does not exist in the store.
    #[error("page {page} not found")]
    NotFound { page: usize },

    /// The page exists but its content could not be extracted.
    #[error("page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },
}

impl PageStoreError {
    pub fn page(&self) -> usize {
        match self {
            PageStoreError::NotFound { page } | PageStoreError::ExtractionFailed { page, .. } => {
                *page
            }
        }
    }
}

/// What went wrong in one fetch attempt of the question loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The prediction contained a page outside `1..=total_pages`.
    OutOfRange,
    /// A page passed range validation but the store could not return it.
    NotFound,
    /// The prediction contained no pages at all.
    EmptyPrediction,
    /// A reasoning call or page fetch exceeded the call timeout.
    BackendTimeout,
    /// A reasoning call failed.
    BackendUnavailable,
}

/// A recoverable, structured failure fed back into the next correction.
///
/// Errors are data here: the message, the valid page range and the section
/// nearest to the offending page are all rendered into the correction
/// prompt.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    /// Inclusive `(first, last)` valid page range of the document.
    pub valid_range: (usize, usize),
    pub nearest_section_hint: Option<SectionSummary>,
}

impl ToolError {
    pub fn empty_prediction(valid_range: (usize, usize)) -> Self {
        Self {
            kind: ToolErrorKind::EmptyPrediction,
            message: "No pages were predicted; at least one page number is required".into(),
            valid_range,
            nearest_section_hint: None,
        }
    }

    pub fn out_of_range(
        page: usize,
        valid_range: (usize, usize),
        hint: Option<SectionSummary>,
    ) -> Self {
        Self {
            kind: ToolErrorKind::OutOfRange,
            message: format!(
                "Page {} out of range ({}-{})",
                page, valid_range.0, valid_range.1
            ),
            valid_range,
            nearest_section_hint: hint,
        }
    }

    pub fn not_found(
        source: &PageStoreError,
        valid_range: (usize, usize),
        hint: Option<SectionSummary>,
    ) -> Self {
        Self {
            kind: ToolErrorKind::NotFound,
            message: format!("Error fetching page {}: {}", source.page(), source),
            valid_range,
            nearest_section_hint: hint,
        }
    }

    pub fn backend(
        source: &BackendError,
        stage: &str,
        valid_range: (usize, usize),
        hint: Option<SectionSummary>,
    ) -> Self {
        let kind = match source {
            BackendError::Timeout { .. } => ToolErrorKind::BackendTimeout,
            BackendError::Unavailable { .. } => ToolErrorKind::BackendUnavailable,
        };
        Self {
            kind,
            message: format!("{stage} failed: {source}"),
            valid_range,
            nearest_section_hint: hint,
        }
    }
}
