//! Data types exchanged between the question loop and its callers.

use crate::error::{PdfQaError, ToolError};
use serde::{Deserialize, Serialize};

/// Page count and chunking of an indexed document.
///
/// `total_sections` is always `ceil(total_pages / chunk_size)`; the only way
/// to obtain a value is [`DocumentMetadata::new`] (or deserialisation, which
/// goes through the same check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMetadata")]
pub struct DocumentMetadata {
    pub total_pages: usize,
    pub chunk_size: usize,
    pub total_sections: usize,
}

#[derive(Deserialize)]
struct RawMetadata {
    total_pages: usize,
    chunk_size: usize,
    total_sections: usize,
}

impl TryFrom<RawMetadata> for DocumentMetadata {
    type Error = PdfQaError;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        let meta = DocumentMetadata::new(raw.total_pages, raw.chunk_size)?;
        if meta.total_sections != raw.total_sections {
            return Err(PdfQaError::InvalidIndex(format!(
                "total_sections is {} but {} pages in chunks of {} make {}",
                raw.total_sections, raw.total_pages, raw.chunk_size, meta.total_sections
            )));
        }
        Ok(meta)
    }
}

impl DocumentMetadata {
    pub fn new(total_pages: usize, chunk_size: usize) -> Result<Self, PdfQaError> {
        if total_pages == 0 {
            return Err(PdfQaError::InvalidIndex("total_pages must be > 0".into()));
        }
        if chunk_size == 0 {
            return Err(PdfQaError::InvalidIndex("chunk_size must be > 0".into()));
        }
        Ok(Self {
            total_pages,
            chunk_size,
            total_sections: total_pages.div_ceil(chunk_size),
        })
    }

    /// Inclusive `(1, total_pages)`.
    pub fn valid_range(&self) -> (usize, usize) {
        (1, self.total_pages)
    }

    pub fn contains(&self, page: usize) -> bool {
        page >= 1 && page <= self.total_pages
    }

    /// Fixed-size chunk boundaries, `(section_id, first, last)`, 1-based.
    pub fn section_ranges(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.total_sections).map(move |i| {
            let first = i * self.chunk_size + 1;
            let last = ((i + 1) * self.chunk_size).min(self.total_pages);
            (i + 1, first, last)
        })
    }
}

/// Precomputed summary of one section (a contiguous run of pages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    /// 1-based, contiguous across the index.
    pub section_id: usize,
    /// Inclusive `(first, last)` page range.
    pub page_range: (usize, usize),
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
}

impl SectionSummary {
    pub fn contains(&self, page: usize) -> bool {
        page >= self.page_range.0 && page <= self.page_range.1
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> {
        self.page_range.0..=self.page_range.1
    }
}

/// A PNG image of (part of) a page, base64-encoded for the reasoning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub mime_type: String,
    /// Base64 payload (no `data:` prefix).
    pub data: String,
}

/// Content of one page as returned by a [`crate::store::PageStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub page_number: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PageImage>,
    pub has_images: bool,
}

impl PageContent {
    pub fn text_only(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            images: Vec::new(),
            has_images: false,
        }
    }

    pub fn with_images(mut self, images: Vec<PageImage>) -> Self {
        self.has_images = !images.is_empty();
        self.images = images;
        self
    }
}

/// Candidate pages proposed by the predictor or the corrector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePrediction {
    /// Ordered, distinct page numbers. May be empty or out of range; the
    /// fetcher is the one that validates.
    pub pages: Vec<usize>,
    pub reasoning: String,
}

impl PagePrediction {
    /// Build a prediction, dropping duplicate pages while keeping order.
    pub fn new(pages: impl IntoIterator<Item = usize>, reasoning: impl Into<String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let pages = pages.into_iter().filter(|p| seen.insert(*p)).collect();
        Self {
            pages,
            reasoning: reasoning.into(),
        }
    }

    pub fn truncated(mut self, max_pages: usize) -> Self {
        self.pages.truncate(max_pages);
        self
    }
}

/// Why the question loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The answerer produced an answer with citations.
    Answered,
    /// Every permitted fetch attempt failed.
    RetriesExhausted,
    /// Pages were fetched but did not contain the answer.
    EmptyContent,
}

/// One fetch attempt of the question loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub pages: Vec<usize>,
    pub reasoning: String,
    pub error: Option<ToolError>,
}

/// Final output of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    pub answer: Option<String>,
    /// Subset of the fetched pages, in citation order.
    pub citations: Vec<usize>,
    pub terminal_reason: TerminalReason,
    /// Fetch attempts made (successful one included).
    pub attempts: u32,
    /// Last prediction that was fetched.
    pub predicted_pages: Vec<usize>,
    /// Pages whose content reached the answerer.
    pub fetched_pages: Vec<usize>,
    pub history: Vec<AttemptRecord>,
}

impl QaResult {
    /// Result produced by the answerer; loop bookkeeping is filled in later.
    pub fn answered(answer: String, citations: Vec<usize>) -> Self {
        Self {
            answer: Some(answer),
            citations,
            terminal_reason: TerminalReason::Answered,
            attempts: 0,
            predicted_pages: Vec::new(),
            fetched_pages: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn empty_content() -> Self {
        Self {
            answer: None,
            citations: Vec::new(),
            terminal_reason: TerminalReason::EmptyContent,
            attempts: 0,
            predicted_pages: Vec::new(),
            fetched_pages: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.terminal_reason == TerminalReason::Answered
    }
}

/// Document properties read from the PDF itself (no LLM involved).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfProperties {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}
