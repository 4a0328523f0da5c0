//! Document sessions: open a PDF, load or build its index, ask questions.
//!
//! [`PdfQa`] is the high-level entry point. It owns the resolved input (so a
//! downloaded file outlives the session), the page store, the section index
//! and a [`QaLoop`]. Lower-level callers can assemble the same pieces from
//! their own [`PageStore`], [`ReasoningBackend`] and [`IndexStore`] with
//! [`PdfQa::from_parts`].

use crate::backend::ReasoningBackend;
use crate::config::QaConfig;
use crate::error::PdfQaError;
use crate::index::{IndexStore, JsonIndexStore, SectionIndex};
use crate::indexer::Indexer;
use crate::output::{DocumentMetadata, PdfProperties, QaResult};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::LlmBackend;
use crate::pipeline::render::{self, PdfPageStore};
use crate::qa::QaLoop;
use crate::store::PageStore;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A question-answering session over one document.
///
/// # Example
///
/// ```rust,no_run
/// use edgequake_pdfqa::{PdfQa, QaConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = QaConfig::default();
///     let session = PdfQa::open("report.pdf", &config, false).await?;
///     let result = session.ask("What was the 2023 revenue?").await?;
///     println!("{:?} (pages {:?})", result.answer, result.citations);
///     Ok(())
/// }
/// ```
pub struct PdfQa {
    qa: QaLoop,
    config: QaConfig,
    input: Option<ResolvedInput>,
}

impl PdfQa {
    /// Open a local path or HTTP(S) URL.
    ///
    /// The index is loaded from `config.index_dir` when a fresh one exists,
    /// otherwise built and saved. `reindex` forces a rebuild.
    pub async fn open(
        input_str: impl AsRef<str>,
        config: &QaConfig,
        reindex: bool,
    ) -> Result<Self, PdfQaError> {
        let input_str = input_str.as_ref();
        info!("Opening {}", input_str);
        let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
        Self::open_resolved(resolved, config, reindex).await
    }

    /// Open an in-memory PDF; `name` keys the persisted index.
    pub async fn open_bytes(
        bytes: &[u8],
        name: &str,
        config: &QaConfig,
        reindex: bool,
    ) -> Result<Self, PdfQaError> {
        let resolved = input::from_bytes(bytes, name).await?;
        Self::open_resolved(resolved, config, reindex).await
    }

    async fn open_resolved(
        resolved: ResolvedInput,
        config: &QaConfig,
        reindex: bool,
    ) -> Result<Self, PdfQaError> {
        let store: Arc<dyn PageStore> =
            Arc::new(PdfPageStore::open(resolved.path(), config).await?);
        let backend: Arc<dyn ReasoningBackend> = Arc::new(LlmBackend::from_config(config)?);
        let index_store = JsonIndexStore::for_document(&config.index_dir, resolved.path());

        let mut session = Self::from_parts(store, backend, &index_store, config, reindex).await?;
        session.input = Some(resolved);
        Ok(session)
    }

    /// Build a session from explicit collaborators.
    pub async fn from_parts(
        store: Arc<dyn PageStore>,
        backend: Arc<dyn ReasoningBackend>,
        index_store: &dyn IndexStore,
        config: &QaConfig,
        reindex: bool,
    ) -> Result<Self, PdfQaError> {
        let index = load_or_build_index(
            store.as_ref(),
            Arc::clone(&backend),
            index_store,
            config,
            reindex,
        )
        .await?;

        Ok(Self {
            qa: QaLoop::new(Arc::new(index), store, backend, config),
            config: config.clone(),
            input: None,
        })
    }

    /// Ask with the configured `max_retries`.
    pub async fn ask(&self, question: &str) -> Result<QaResult, PdfQaError> {
        self.qa.ask(question, self.config.max_retries).await
    }

    pub async fn ask_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<QaResult, PdfQaError> {
        self.qa
            .ask_with_cancel(question, self.config.max_retries, cancel)
            .await
    }

    pub fn index(&self) -> &SectionIndex {
        self.qa.index()
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        self.qa.index().metadata()
    }

    /// Write the index as JSON to `path` (atomic).
    pub async fn export_index(&self, path: impl AsRef<Path>) -> Result<(), PdfQaError> {
        let path = path.as_ref();
        let source = self
            .input
            .as_ref()
            .map(|i| i.source_name())
            .unwrap_or_default();
        JsonIndexStore::new(path, source).save(self.index()).await
    }
}

/// Load a persisted index, or build and persist a new one.
///
/// A persisted index is stale when its page count differs from the store's,
/// its chunk size from `config.chunk_size`, or its content hash from the
/// store's; stale indexes are rebuilt. A failure to persist the new index is
/// logged, not returned.
pub async fn load_or_build_index(
    store: &dyn PageStore,
    backend: Arc<dyn ReasoningBackend>,
    index_store: &dyn IndexStore,
    config: &QaConfig,
    reindex: bool,
) -> Result<SectionIndex, PdfQaError> {
    if !reindex {
        match index_store.load().await? {
            Some(index) => match staleness(&index, store, config) {
                None => return Ok(index),
                Some(reason) => warn!("Persisted index is stale ({}); rebuilding", reason),
            },
            None => info!("No persisted index; building one"),
        }
    } else {
        info!("Rebuilding index on request");
    }

    let index = Indexer::new(backend, config).build(store).await?;
    if let Err(e) = index_store.save(&index).await {
        warn!("Could not persist index: {}", e);
    }
    Ok(index)
}

/// Why `index` cannot serve `store`, if it cannot.
fn staleness(index: &SectionIndex, store: &dyn PageStore, config: &QaConfig) -> Option<String> {
    let meta = index.metadata();
    if meta.total_pages != store.page_count() {
        return Some(format!(
            "{} pages indexed, document has {}",
            meta.total_pages,
            store.page_count()
        ));
    }
    if meta.chunk_size != config.chunk_size {
        return Some(format!(
            "chunk size {} indexed, configured {}",
            meta.chunk_size, config.chunk_size
        ));
    }
    match store.content_hash() {
        Some(current) if index.content_hash() != Some(current.as_str()) => {
            Some("document content changed".to_string())
        }
        _ => None,
    }
}

/// Read document properties; no LLM provider needed.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &QaConfig,
) -> Result<PdfProperties, PdfQaError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    render::inspect_pdf(resolved.path(), config.password.as_deref()).await
}
