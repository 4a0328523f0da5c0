//! Section indexing: one summary call per fixed-size chunk of pages.
//!
//! Sections are summarised as independent tasks through
//! `futures::stream::buffered`, which keeps at most `indexing_concurrency`
//! calls in flight and yields results in section order. `api_delay_ms`
//! spaces out the dispatch of consecutive sections, whatever the
//! concurrency. The first failure
//! aborts the run: a partially summarised index would route questions away
//! from the missing sections without anyone noticing.

use crate::backend::{with_timeout, ReasoningBackend, TimedOut};
use crate::config::{CallPurpose, QaConfig};
use crate::error::{PageStoreError, PdfQaError};
use crate::index::SectionIndex;
use crate::output::{DocumentMetadata, SectionSummary};
use crate::pipeline::parse::parse_summary;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts;
use crate::store::PageStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Builds a [`SectionIndex`] from a page store.
pub struct Indexer {
    backend: Arc<dyn ReasoningBackend>,
    chunk_size: usize,
    concurrency: usize,
    api_delay: Duration,
    timeout: Duration,
    progress: ProgressCallback,
}

impl Indexer {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &QaConfig) -> Self {
        Self {
            backend,
            chunk_size: config.chunk_size,
            concurrency: config.indexing_concurrency.max(1),
            api_delay: Duration::from_millis(config.api_delay_ms),
            timeout: config.call_timeout(),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Summarise every section of `store`.
    pub async fn build(&self, store: &dyn PageStore) -> Result<SectionIndex, PdfQaError> {
        let start = Instant::now();
        let metadata = DocumentMetadata::new(store.page_count(), self.chunk_size)
            .map_err(|_| PdfQaError::InvalidIndex("page store has no pages".into()))?;
        let total = metadata.total_sections;

        info!(
            "Indexing {} pages in {} sections (concurrency {})",
            metadata.total_pages, total, self.concurrency
        );
        self.progress.on_indexing_start(total);

        let delay = self.api_delay;
        let sections: Vec<SectionSummary> = stream::iter(metadata.section_ranges())
            .then(|range| async move {
                if !delay.is_zero() && range.0 > 1 {
                    tokio::time::sleep(delay).await;
                }
                range
            })
            .map(|(id, first, last)| self.summarise(store, &metadata, id, first, last))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut index = SectionIndex::new(metadata, sections)?;
        if let Some(hash) = store.content_hash() {
            index = index.with_content_hash(hash);
        }
        info!("Indexed {} sections in {:?}", total, start.elapsed());
        self.progress.on_indexing_complete(total);
        Ok(index)
    }

    async fn summarise(
        &self,
        store: &dyn PageStore,
        metadata: &DocumentMetadata,
        section_id: usize,
        first: usize,
        last: usize,
    ) -> Result<SectionSummary, PdfQaError> {
        let total = metadata.total_sections;
        self.progress.on_section_start(section_id, total);

        let text = match with_timeout(self.timeout, store.section_text(first, last)).await {
            Ok(t) => t,
            Err(e) => {
                let source = match e {
                    TimedOut::Failed(err) => err,
                    TimedOut::Elapsed(d) => PageStoreError::ExtractionFailed {
                        page: first,
                        detail: format!("timed out after {}ms", d.as_millis()),
                    },
                };
                warn!("Section {}: cannot read pages: {}", section_id, source);
                self.progress
                    .on_section_error(section_id, total, &source.to_string());
                return Err(PdfQaError::SectionUnreadable {
                    section: section_id,
                    source,
                });
            }
        };

        let prompt = prompts::section_summary_prompt(&text, section_id, first, last, metadata);
        debug!(
            "Section {} (pages {}-{}): {} chars of text",
            section_id,
            first,
            last,
            text.len()
        );

        let reply = with_timeout(
            self.timeout,
            self.backend.complete(CallPurpose::Summarize, &prompt, &[]),
        )
        .await
        .map_err(|e| {
            let source = e.into_backend_error();
            warn!("Section {}: summary failed: {}", section_id, source);
            self.progress
                .on_section_error(section_id, total, &source.to_string());
            PdfQaError::IndexingFailed {
                section: section_id,
                first,
                last,
                source,
            }
        })?;

        let parsed = parse_summary(&reply);
        self.progress.on_section_complete(section_id, total);

        Ok(SectionSummary {
            section_id,
            page_range: (first, last),
            summary: parsed.summary,
            keywords: parsed.keywords,
            insights: parsed.insights,
        })
    }
}
