//! The section index: validated, immutable summaries of a whole document.
//!
//! A [`SectionIndex`] can only be obtained through [`SectionIndex::new`] (or
//! by deserialising, which runs the same validation), so the query path
//! never re-checks range integrity. Persistence is a separate capability,
//! [`IndexStore`], injected by whoever owns the index.

use crate::error::PdfQaError;
use crate::output::{DocumentMetadata, SectionSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Immutable summary of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSectionIndex")]
pub struct SectionIndex {
    metadata: DocumentMetadata,
    sections: Vec<SectionSummary>,
    /// Fingerprint of the document the summaries were built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
}

#[derive(Deserialize)]
struct RawSectionIndex {
    metadata: DocumentMetadata,
    sections: Vec<SectionSummary>,
    #[serde(default)]
    content_hash: Option<String>,
}

impl TryFrom<RawSectionIndex> for SectionIndex {
    type Error = PdfQaError;

    fn try_from(raw: RawSectionIndex) -> Result<Self, Self::Error> {
        let index = SectionIndex::new(raw.metadata, raw.sections)?;
        Ok(match raw.content_hash {
            Some(hash) => index.with_content_hash(hash),
            None => index,
        })
    }
}

impl SectionIndex {
    /// Validate and build an index.
    ///
    /// Section ids must run `1..=n`, ranges must be non-empty, contiguous and
    /// cover `[1, total_pages]` exactly, and `n` must equal
    /// `metadata.total_sections`.
    pub fn new(
        metadata: DocumentMetadata,
        sections: Vec<SectionSummary>,
    ) -> Result<Self, PdfQaError> {
        if sections.len() != metadata.total_sections {
            return Err(PdfQaError::InvalidIndex(format!(
                "expected {} sections, found {}",
                metadata.total_sections,
                sections.len()
            )));
        }

        let mut next_page = 1;
        for (i, s) in sections.iter().enumerate() {
            let (first, last) = s.page_range;
            if s.section_id != i + 1 {
                return Err(PdfQaError::InvalidIndex(format!(
                    "section at position {} has id {}, expected {}",
                    i + 1,
                    s.section_id,
                    i + 1
                )));
            }
            if first > last {
                return Err(PdfQaError::InvalidIndex(format!(
                    "section {} has inverted range {}-{}",
                    s.section_id, first, last
                )));
            }
            if first != next_page {
                let problem = if first < next_page { "overlaps" } else { "leaves a gap before" };
                return Err(PdfQaError::InvalidIndex(format!(
                    "section {} (pages {}-{}) {} page {}",
                    s.section_id, first, last, problem, next_page
                )));
            }
            if last > metadata.total_pages {
                return Err(PdfQaError::InvalidIndex(format!(
                    "section {} ends at page {} but the document has {} pages",
                    s.section_id, last, metadata.total_pages
                )));
            }
            next_page = last + 1;
        }

        if next_page != metadata.total_pages + 1 {
            return Err(PdfQaError::InvalidIndex(format!(
                "sections cover pages 1-{} but the document has {} pages",
                next_page - 1,
                metadata.total_pages
            )));
        }

        Ok(Self {
            metadata,
            sections,
            content_hash: None,
        })
    }

    /// Tag the index with the fingerprint of its source document.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn summaries(&self) -> &[SectionSummary] {
        &self.sections
    }

    pub fn valid_range(&self) -> (usize, usize) {
        self.metadata.valid_range()
    }

    /// Section whose range contains `page`, by binary search.
    pub fn section_for_page(&self, page: usize) -> Option<&SectionSummary> {
        if !self.metadata.contains(page) {
            return None;
        }
        let idx = self.sections.partition_point(|s| s.page_range.1 < page);
        self.sections.get(idx).filter(|s| s.contains(page))
    }

    /// Section containing `page` after clamping it into the valid range.
    pub fn nearest_section(&self, page: usize) -> Option<&SectionSummary> {
        self.section_for_page(page.clamp(1, self.metadata.total_pages))
    }
}

/// Load/save capability for a document's index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<SectionIndex>, PdfQaError>;

    async fn save(&self, index: &SectionIndex) -> Result<(), PdfQaError>;
}

const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct IndexFile<'a> {
    version: u32,
    source: &'a str,
    index: &'a SectionIndex,
}

/// On-disk shape before validation, so a structurally broken index surfaces
/// as `InvalidIndex` rather than a JSON error.
#[derive(Deserialize)]
struct StoredIndexFile {
    version: u32,
    source: String,
    index: RawSectionIndex,
}

/// One JSON file per document.
#[derive(Debug, Clone)]
pub struct JsonIndexStore {
    path: PathBuf,
    source: String,
}

impl JsonIndexStore {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Store at `<index_dir>/<pdf file stem>.index.json`.
    pub fn for_document(index_dir: &Path, pdf_path: &Path) -> Self {
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let source = pdf_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| stem.clone());
        Self::new(index_dir.join(format!("{stem}.index.json")), source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, detail: impl std::fmt::Display) -> PdfQaError {
        PdfQaError::IndexIo {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl IndexStore for JsonIndexStore {
    async fn load(&self) -> Result<Option<SectionIndex>, PdfQaError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let file: StoredIndexFile =
            serde_json::from_slice(&bytes).map_err(|e| self.io_err(e))?;
        if file.version != INDEX_FORMAT_VERSION {
            warn!(
                "Ignoring index {} with format version {} (expected {})",
                self.path.display(),
                file.version,
                INDEX_FORMAT_VERSION
            );
            return Ok(None);
        }
        if file.source != self.source {
            warn!(
                "Index {} was built from '{}', not '{}'",
                self.path.display(),
                file.source,
                self.source
            );
            return Ok(None);
        }

        let index = SectionIndex::try_from(file.index)?;
        info!(
            "Loaded index {} ({} sections)",
            self.path.display(),
            index.summaries().len()
        );
        Ok(Some(index))
    }

    /// Atomic write: temp file in the same directory, then rename.
    async fn save(&self, index: &SectionIndex) -> Result<(), PdfQaError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            source: &self.source,
            index,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| self.io_err(e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;

        info!("Saved index to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn summary(id: usize, first: usize, last: usize) -> SectionSummary {
    SectionSummary {
        section_id: id,
        page_range: (first, last),
        summary: format!("Section {id} summary"),
        keywords: vec![format!("kw{id}")],
        insights: vec![],
    }
}

#[cfg(test)]
pub(crate) fn uniform_index(total_pages: usize, chunk_size: usize) -> SectionIndex {
    let meta = DocumentMetadata::new(total_pages, chunk_size).unwrap();
    let sections = meta
        .section_ranges()
        .map(|(id, first, last)| summary(id, first, last))
        .collect();
    SectionIndex::new(meta, sections).unwrap()
}
