//! Page stores: where page text and images come from.
//!
//! The question loop only ever sees the [`PageStore`] trait. The PDF-backed
//! implementation lives in [`crate::pipeline::render`]; [`MemoryPageStore`]
//! serves pre-extracted text and is what the loop tests run against.

use crate::error::PageStoreError;
use crate::output::PageContent;
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Read-only source of page content, 1-based page numbers.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Number of pages the store can serve.
    fn page_count(&self) -> usize;

    async fn get_page(&self, page: usize) -> Result<PageContent, PageStoreError>;

    /// Fingerprint of the underlying document, recorded in the index so a
    /// persisted index is never reused for different content. `None` opts
    /// out of the check.
    fn content_hash(&self) -> Option<String> {
        None
    }

    /// Text of the inclusive range `first..=last`, used when indexing.
    ///
    /// Pages are joined with a blank line. The default implementation
    /// fetches page by page without images.
    async fn section_text(&self, first: usize, last: usize) -> Result<String, PageStoreError> {
        let mut parts = Vec::with_capacity(last.saturating_sub(first) + 1);
        for page in first..=last {
            parts.push(self.get_page(page).await?.text);
        }
        Ok(parts.join("\n\n"))
    }
}

/// Pages held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageStore {
    pages: BTreeMap<usize, PageContent>,
    page_count: usize,
}

impl MemoryPageStore {
    /// One entry per page, numbered from 1.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages: BTreeMap<usize, PageContent> = texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| (i + 1, PageContent::text_only(i + 1, t)))
            .collect();
        let page_count = pages.len();
        Self { pages, page_count }
    }

    /// Declare a page count without content; unset pages report `NotFound`.
    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn insert(&mut self, content: PageContent) {
        self.page_count = self.page_count.max(content.page_number);
        self.pages.insert(content.page_number, content);
    }

    pub fn remove(&mut self, page: usize) -> Option<PageContent> {
        self.pages.remove(&page)
    }
}

/// SHA-256 of `bytes`, base64-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

#[async_trait]
impl PageStore for MemoryPageStore {
    fn page_count(&self) -> usize {
        self.page_count
    }

    /// Hash of the page count and every page's number and text.
    fn content_hash(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        hasher.update((self.page_count as u64).to_le_bytes());
        for (number, page) in &self.pages {
            hasher.update((*number as u64).to_le_bytes());
            hasher.update((page.text.len() as u64).to_le_bytes());
            hasher.update(page.text.as_bytes());
        }
        Some(base64::engine::general_purpose::STANDARD.encode(hasher.finalize()))
    }

    async fn get_page(&self, page: usize) -> Result<PageContent, PageStoreError> {
        self.pages
            .get(&page)
            .cloned()
            .ok_or(PageStoreError::NotFound { page })
    }
}
