//! Question-loop and indexing tests against a scripted backend.
//!
//! No PDF and no network: pages come from `MemoryPageStore` and every
//! reasoning call is answered from a per-purpose script.

use async_trait::async_trait;
use edgequake_pdfqa::{
    load_or_build_index, BackendError, CallPurpose, CancellationToken, DocumentMetadata, Indexer,
    IndexStore, JsonIndexStore, MemoryPageStore, PageContent, PageImage, PageStore,
    PageStoreError, PdfQa, PdfQaError, QaConfig, QaLoop, ReasoningBackend, SectionIndex,
    SectionSummary, TerminalReason, ToolErrorKind,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

type Reply = Result<String, BackendError>;

/// Replies are consumed in order per purpose; the last one repeats.
#[derive(Default)]
struct ScriptedBackend {
    scripts: Mutex<HashMap<CallPurpose, VecDeque<Reply>>>,
    delays: HashMap<CallPurpose, Duration>,
    calls: Mutex<Vec<(CallPurpose, String)>>,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, purpose: CallPurpose, replies: &[&str]) -> Self {
        let queue = replies.iter().map(|r| Ok(r.to_string())).collect();
        self.scripts.lock().unwrap().insert(purpose, queue);
        self
    }

    fn fail(self, purpose: CallPurpose, err: BackendError) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(purpose, VecDeque::from([Err(err)]));
        self
    }

    fn delay(mut self, purpose: CallPurpose, d: Duration) -> Self {
        self.delays.insert(purpose, d);
        self
    }

    fn count(&self, purpose: CallPurpose) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == purpose)
            .count()
    }

    fn prompts(&self, purpose: CallPurpose) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == purpose)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(
        &self,
        purpose: CallPurpose,
        prompt: &str,
        _images: &[PageImage],
    ) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((purpose, prompt.to_string()));
        if let Some(d) = self.delays.get(&purpose) {
            tokio::time::sleep(*d).await;
        }
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&purpose)
            .unwrap_or_else(|| panic!("no script for {purpose:?}"));
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Counts `get_page` calls, optionally answering slowly.
struct CountingStore {
    inner: MemoryPageStore,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingStore {
    fn pages(n: usize) -> Self {
        Self::wrap(MemoryPageStore::from_texts(
            (1..=n).map(|i| format!("Content of page {i}.")),
        ))
    }

    fn wrap(inner: MemoryPageStore) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    fn slow(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageStore for CountingStore {
    fn page_count(&self) -> usize {
        self.inner.page_count()
    }

    fn content_hash(&self) -> Option<String> {
        self.inner.content_hash()
    }

    async fn get_page(&self, page: usize) -> Result<PageContent, PageStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.inner.get_page(page).await
    }
}

fn index_for(total_pages: usize, chunk_size: usize) -> SectionIndex {
    let meta = DocumentMetadata::new(total_pages, chunk_size).unwrap();
    let sections = meta
        .section_ranges()
        .map(|(id, first, last)| SectionSummary {
            section_id: id,
            page_range: (first, last),
            summary: format!("Topics of pages {first} to {last}"),
            keywords: vec![format!("topic{id}")],
            insights: vec![],
        })
        .collect();
    SectionIndex::new(meta, sections).unwrap()
}

struct Harness {
    backend: Arc<ScriptedBackend>,
    store: Arc<CountingStore>,
    qa: QaLoop,
}

fn harness(backend: ScriptedBackend, store: CountingStore, config: &QaConfig) -> Harness {
    let backend = Arc::new(backend);
    let store = Arc::new(store);
    let index = Arc::new(index_for(store.page_count(), config.chunk_size));
    let qa = QaLoop::new(
        index,
        store.clone() as Arc<dyn PageStore>,
        backend.clone() as Arc<dyn ReasoningBackend>,
        config,
    );
    Harness { backend, store, qa }
}

fn config() -> QaConfig {
    QaConfig::builder().call_timeout_ms(2_000).build().unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn answers_on_first_attempt() {
    let backend = ScriptedBackend::new()
        .script(
            CallPurpose::Predict,
            &["Reasoning: Section 5 covers financial results.\nPages: [45, 46]"],
        )
        .script(CallPurpose::Answer, &["Revenue was $4.2M in 2023 [Page 45]."]);
    let h = harness(backend, CountingStore::pages(100), &config());

    let r = h.qa.ask("What was the revenue in 2023?", 3).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::Answered);
    assert_eq!(r.answer.as_deref(), Some("Revenue was $4.2M in 2023 [Page 45]."));
    assert_eq!(r.citations, vec![45]);
    assert_eq!(r.attempts, 1);
    assert_eq!(r.fetched_pages, vec![45, 46]);
    assert_eq!(h.backend.count(CallPurpose::Predict), 1);
    assert_eq!(h.backend.count(CallPurpose::Correct), 0);
    assert_eq!(h.backend.count(CallPurpose::Answer), 1);
    assert_eq!(h.store.calls(), 2);
}

#[tokio::test]
async fn corrects_out_of_range_prediction() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Reasoning: appendix\nPages: [150]"])
        .script(
            CallPurpose::Correct,
            &["Reasoning: the appendix is in section 10\nPages: [95]"],
        )
        .script(CallPurpose::Answer, &["The appendix lists 12 tables [Page 95]."]);
    let h = harness(backend, CountingStore::pages(100), &config());

    let r = h.qa.ask("What is in the appendix?", 3).await.unwrap();

    assert!(r.is_answered());
    assert_eq!(r.attempts, 2);
    assert_eq!(r.citations, vec![95]);
    assert_eq!(r.history.len(), 2);
    let first = r.history[0].error.as_ref().unwrap();
    assert_eq!(first.kind, ToolErrorKind::OutOfRange);
    assert_eq!(first.valid_range, (1, 100));
    assert_eq!(first.nearest_section_hint.as_ref().unwrap().section_id, 10);
    assert!(r.history[1].error.is_none());

    let correction = &h.backend.prompts(CallPurpose::Correct)[0];
    assert!(correction.contains("Page 150 out of range (1-100)"));
    assert!(correction.contains("Valid Page Range: 1 to 100"));
    assert!(correction.contains("Section 10: Pages 91-100"));
    // Only page 95 was ever read.
    assert_eq!(h.store.calls(), 1);
}

#[tokio::test]
async fn exhausts_retries_when_always_out_of_range() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [150]"])
        .script(CallPurpose::Correct, &["Pages: [150]"])
        .script(CallPurpose::Answer, &["unused"]);
    let h = harness(backend, CountingStore::pages(100), &config());

    let r = h.qa.ask("Anything?", 3).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::RetriesExhausted);
    assert!(r.answer.is_none());
    assert!(r.citations.is_empty());
    assert_eq!(r.attempts, 3);
    assert_eq!(r.history.len(), 3);
    assert!(r
        .history
        .iter()
        .all(|a| a.error.as_ref().map(|e| e.kind) == Some(ToolErrorKind::OutOfRange)));
    assert_eq!(h.backend.count(CallPurpose::Predict), 1);
    assert_eq!(h.backend.count(CallPurpose::Correct), 2);
    assert_eq!(h.backend.count(CallPurpose::Answer), 0);
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn mixed_batch_with_out_of_range_page_never_touches_store() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [5, 150]"])
        .script(CallPurpose::Correct, &["Pages: [5, 150]"])
        .script(CallPurpose::Answer, &["unused"]);
    let h = harness(backend, CountingStore::pages(100), &config());

    let r = h.qa.ask("q", 3).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::RetriesExhausted);
    assert_eq!(r.attempts, 3);
    let first = r.history[0].error.as_ref().unwrap();
    assert_eq!(first.kind, ToolErrorKind::OutOfRange);
    assert!(first.message.contains("Page 150"));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn slow_page_store_times_out_each_attempt() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [2]"])
        .script(CallPurpose::Correct, &["Pages: [3]"])
        .script(CallPurpose::Answer, &["unused"]);
    let config = QaConfig::builder().call_timeout_ms(50).build().unwrap();
    let store = CountingStore::pages(10).slow(Duration::from_secs(5));
    let h = harness(backend, store, &config);

    let r = h.qa.ask("q", 3).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::RetriesExhausted);
    assert_eq!(r.attempts, 3);
    assert!(r
        .history
        .iter()
        .all(|a| a.error.as_ref().map(|e| e.kind) == Some(ToolErrorKind::BackendTimeout)));
    assert_eq!(h.store.calls(), 3);
    assert_eq!(h.backend.count(CallPurpose::Answer), 0);
}

#[tokio::test]
async fn empty_prediction_never_touches_store() {
    let backend = ScriptedBackend::new()
        .script(
            CallPurpose::Predict,
            &["Reasoning: nothing here looks relevant\nPages: []"],
        )
        .script(CallPurpose::Answer, &["unused"]);
    let h = harness(backend, CountingStore::pages(20), &config());

    let r = h.qa.ask("Unrelated question", 1).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::RetriesExhausted);
    assert_eq!(r.attempts, 1);
    assert_eq!(
        r.history[0].error.as_ref().unwrap().kind,
        ToolErrorKind::EmptyPrediction
    );
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn empty_prediction_is_corrected() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Reasoning: unsure\nPages: []"])
        .script(CallPurpose::Correct, &["Reasoning: section 1\nPages: [3]"])
        .script(CallPurpose::Answer, &["Yes [Page 3]."]);
    let h = harness(backend, CountingStore::pages(20), &config());

    let r = h.qa.ask("Is it there?", 3).await.unwrap();
    assert!(r.is_answered());
    assert_eq!(r.attempts, 2);
    assert!(h.backend.prompts(CallPurpose::Correct)[0].contains("No pages were predicted"));
}

#[tokio::test]
async fn irrelevant_content_ends_with_empty_content() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [12]"])
        .script(CallPurpose::Answer, &["NOT_FOUND"]);
    let h = harness(backend, CountingStore::pages(30), &config());

    let r = h.qa.ask("Who wrote the foreword?", 3).await.unwrap();

    assert_eq!(r.terminal_reason, TerminalReason::EmptyContent);
    assert!(r.answer.is_none());
    assert_eq!(r.attempts, 1);
    assert_eq!(r.fetched_pages, vec![12]);
    assert_eq!(h.backend.count(CallPurpose::Correct), 0);
}

#[tokio::test]
async fn section_decision_expands_to_its_pages() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Reasoning: methods\nDecision: Section 2"])
        .script(CallPurpose::Answer, &["Described in [Page 13]."]);
    let h = harness(backend, CountingStore::pages(25), &config());

    let r = h.qa.ask("How was it measured?", 3).await.unwrap();
    assert_eq!(r.fetched_pages, (11..=20).collect::<Vec<_>>());
    assert_eq!(r.citations, vec![13]);
}

#[tokio::test]
async fn missing_page_is_corrected() {
    let mut pages = MemoryPageStore::from_texts((1..=10).map(|i| format!("page {i}")));
    pages.remove(7);
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [7]"])
        .script(CallPurpose::Correct, &["Pages: [8]"])
        .script(CallPurpose::Answer, &["Found it [Page 8]."]);
    let h = harness(backend, CountingStore::wrap(pages), &config());

    let r = h.qa.ask("q", 3).await.unwrap();
    assert!(r.is_answered());
    assert_eq!(
        r.history[0].error.as_ref().unwrap().kind,
        ToolErrorKind::NotFound
    );
}

#[tokio::test]
async fn identical_runs_give_identical_results() {
    let run = || async {
        let backend = ScriptedBackend::new()
            .script(CallPurpose::Predict, &["Pages: [150]"])
            .script(CallPurpose::Correct, &["Pages: [95, 96]"])
            .script(CallPurpose::Answer, &["See [Page 96]."]);
        let h = harness(backend, CountingStore::pages(100), &config());
        h.qa.ask("q", 3).await.unwrap()
    };
    assert_eq!(run().await, run().await);
}

// ── Failures of collaborators ────────────────────────────────────────────────

#[tokio::test]
async fn prediction_timeout_costs_one_attempt() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [1]"])
        .delay(CallPurpose::Predict, Duration::from_secs(5))
        .script(CallPurpose::Correct, &["Pages: [2]"])
        .script(CallPurpose::Answer, &["ok [Page 2]"]);
    let config = QaConfig::builder().call_timeout_ms(50).build().unwrap();
    let h = harness(backend, CountingStore::pages(10), &config);

    let r = h.qa.ask("q", 3).await.unwrap();
    assert!(r.is_answered());
    assert_eq!(r.attempts, 2);
    assert_eq!(
        r.history[0].error.as_ref().unwrap().kind,
        ToolErrorKind::BackendTimeout
    );
}

#[tokio::test]
async fn answer_failure_is_fatal() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [1]"])
        .fail(
            CallPurpose::Answer,
            BackendError::Unavailable {
                detail: "503".into(),
            },
        );
    let h = harness(backend, CountingStore::pages(10), &config());

    let err = h.qa.ask("q", 3).await.unwrap_err();
    assert!(matches!(err, PdfQaError::AnswerFailed(_)));
    assert_eq!(h.backend.count(CallPurpose::Correct), 0);
}

#[tokio::test]
async fn zero_retries_rejected() {
    let backend = ScriptedBackend::new().script(CallPurpose::Predict, &["Pages: [1]"]);
    let h = harness(backend, CountingStore::pages(10), &config());
    let err = h.qa.ask("q", 0).await.unwrap_err();
    assert!(matches!(err, PdfQaError::InvalidConfig(_)));
    assert_eq!(h.backend.count(CallPurpose::Predict), 0);
}

#[tokio::test]
async fn cancelled_before_start() {
    let backend = ScriptedBackend::new().script(CallPurpose::Predict, &["Pages: [1]"]);
    let h = harness(backend, CountingStore::pages(10), &config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.qa.ask_with_cancel("q", 3, &cancel).await.unwrap_err();
    assert!(matches!(err, PdfQaError::Cancelled));
    assert_eq!(h.backend.count(CallPurpose::Predict), 0);
}

#[tokio::test]
async fn cancelled_during_backend_call() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [1]"])
        .delay(CallPurpose::Predict, Duration::from_secs(10))
        .script(CallPurpose::Answer, &["unused"]);
    let h = harness(
        backend,
        CountingStore::pages(10),
        &QaConfig::builder().call_timeout_ms(30_000).build().unwrap(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = h.qa.ask_with_cancel("q", 3, &cancel).await.unwrap_err();
    assert!(matches!(err, PdfQaError::Cancelled));
    assert_eq!(h.backend.count(CallPurpose::Answer), 0);
}

#[tokio::test]
async fn finished_answer_survives_late_cancellation() {
    /// Cancels the token from inside the answer call, then replies.
    struct CancelOnAnswer {
        inner: ScriptedBackend,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl ReasoningBackend for CancelOnAnswer {
        async fn complete(
            &self,
            purpose: CallPurpose,
            prompt: &str,
            images: &[PageImage],
        ) -> Result<String, BackendError> {
            if purpose == CallPurpose::Answer {
                self.cancel.cancel();
            }
            self.inner.complete(purpose, prompt, images).await
        }
    }

    let cancel = CancellationToken::new();
    let backend = Arc::new(CancelOnAnswer {
        inner: ScriptedBackend::new()
            .script(CallPurpose::Predict, &["Pages: [1]"])
            .script(CallPurpose::Answer, &["Done [Page 1]."]),
        cancel: cancel.clone(),
    });
    let store = Arc::new(CountingStore::pages(5));
    let qa = QaLoop::new(
        Arc::new(index_for(5, 10)),
        store,
        backend,
        &config(),
    );

    let r = qa.ask_with_cancel("q", 3, &cancel).await.unwrap();
    assert!(r.is_answered());
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn concurrent_questions_share_one_loop() {
    let backend = ScriptedBackend::new()
        .script(CallPurpose::Predict, &["Pages: [4]"])
        .script(CallPurpose::Answer, &["Four [Page 4]."]);
    let h = harness(backend, CountingStore::pages(10), &config());

    let (a, b) = tokio::join!(h.qa.ask("first", 3), h.qa.ask("second", 3));
    assert_eq!(a.unwrap().citations, vec![4]);
    assert_eq!(b.unwrap().citations, vec![4]);
    assert_eq!(h.backend.count(CallPurpose::Answer), 2);
}

// ── Indexing ─────────────────────────────────────────────────────────────────

const SUMMARY_JSON: &str =
    r#"{"summary": ["Covers the budget"], "keywords": ["budget", "2023"], "insights": ["Up 5%"]}"#;

#[tokio::test]
async fn indexer_summarises_every_section() {
    let backend = Arc::new(ScriptedBackend::new().script(CallPurpose::Summarize, &[SUMMARY_JSON]));
    let store = CountingStore::pages(25);
    let config = QaConfig::builder()
        .chunk_size(10)
        .indexing_concurrency(2)
        .build()
        .unwrap();

    let index = Indexer::new(backend.clone(), &config)
        .build(&store)
        .await
        .unwrap();

    assert_eq!(index.metadata().total_sections, 3);
    let ranges: Vec<_> = index.summaries().iter().map(|s| s.page_range).collect();
    assert_eq!(ranges, vec![(1, 10), (11, 20), (21, 25)]);
    assert_eq!(index.summaries()[0].summary, "Covers the budget");
    assert_eq!(index.summaries()[2].keywords, vec!["budget", "2023"]);
    assert_eq!(backend.count(CallPurpose::Summarize), 3);
    assert!(backend.prompts(CallPurpose::Summarize)[2].contains("Content of page 25."));
}

#[tokio::test]
async fn indexer_aborts_on_backend_failure() {
    let backend = Arc::new(ScriptedBackend::new().fail(
        CallPurpose::Summarize,
        BackendError::Unavailable {
            detail: "quota".into(),
        },
    ));
    let err = Indexer::new(backend, &QaConfig::default())
        .build(&CountingStore::pages(15))
        .await
        .unwrap_err();
    assert!(matches!(err, PdfQaError::IndexingFailed { section: 1, .. }));
}

#[tokio::test]
async fn indexer_keeps_unstructured_summary_text() {
    let backend = Arc::new(
        ScriptedBackend::new().script(CallPurpose::Summarize, &["Just prose about the pages."]),
    );
    let index = Indexer::new(backend, &QaConfig::default())
        .build(&CountingStore::pages(5))
        .await
        .unwrap();
    assert_eq!(index.summaries()[0].summary, "Just prose about the pages.");
}

#[tokio::test]
async fn persisted_index_is_reused_until_stale() {
    let dir = tempfile::tempdir().unwrap();
    let index_store = JsonIndexStore::new(dir.path().join("doc.index.json"), "doc.pdf");
    let store = CountingStore::pages(30);
    let backend = Arc::new(ScriptedBackend::new().script(CallPurpose::Summarize, &[SUMMARY_JSON]));
    let config = QaConfig::default();

    let built = load_or_build_index(&store, backend.clone(), &index_store, &config, false)
        .await
        .unwrap();
    assert_eq!(backend.count(CallPurpose::Summarize), 3);
    assert!(index_store.load().await.unwrap().is_some());

    let loaded = load_or_build_index(&store, backend.clone(), &index_store, &config, false)
        .await
        .unwrap();
    assert_eq!(loaded, built);
    assert_eq!(backend.count(CallPurpose::Summarize), 3);

    let rechunked = QaConfig::builder().chunk_size(15).build().unwrap();
    let rebuilt = load_or_build_index(&store, backend.clone(), &index_store, &rechunked, false)
        .await
        .unwrap();
    assert_eq!(rebuilt.metadata().total_sections, 2);
    assert_eq!(backend.count(CallPurpose::Summarize), 5);

    load_or_build_index(&store, backend.clone(), &index_store, &rechunked, true)
        .await
        .unwrap();
    assert_eq!(backend.count(CallPurpose::Summarize), 7);
}

#[tokio::test]
async fn persisted_index_is_rebuilt_for_different_content() {
    let dir = tempfile::tempdir().unwrap();
    let index_store = JsonIndexStore::new(dir.path().join("doc.index.json"), "doc.pdf");
    let backend = Arc::new(ScriptedBackend::new().script(CallPurpose::Summarize, &[SUMMARY_JSON]));
    let config = QaConfig::default();

    let first = CountingStore::pages(10);
    let second = CountingStore::wrap(MemoryPageStore::from_texts(
        (1..=10).map(|i| format!("Entirely different page {i}.")),
    ));

    let a = load_or_build_index(&first, backend.clone(), &index_store, &config, false)
        .await
        .unwrap();
    assert_eq!(a.content_hash(), first.content_hash().as_deref());
    assert_eq!(backend.count(CallPurpose::Summarize), 1);

    let b = load_or_build_index(&second, backend.clone(), &index_store, &config, false)
        .await
        .unwrap();
    assert_eq!(backend.count(CallPurpose::Summarize), 2);
    assert_eq!(b.content_hash(), second.content_hash().as_deref());
    assert_ne!(a.content_hash(), b.content_hash());
    assert!(backend.prompts(CallPurpose::Summarize)[1].contains("Entirely different page 1."));
}

#[tokio::test]
async fn api_delay_spaces_out_concurrent_dispatch() {
    /// Records when each summary call starts.
    #[derive(Default)]
    struct Timed {
        starts: Mutex<Vec<std::time::Instant>>,
    }

    #[async_trait]
    impl ReasoningBackend for Timed {
        async fn complete(
            &self,
            _purpose: CallPurpose,
            _prompt: &str,
            _images: &[PageImage],
        ) -> Result<String, BackendError> {
            self.starts.lock().unwrap().push(std::time::Instant::now());
            Ok(SUMMARY_JSON.to_string())
        }
    }

    let backend = Arc::new(Timed::default());
    let config = QaConfig::builder()
        .chunk_size(1)
        .indexing_concurrency(3)
        .api_delay_ms(60)
        .build()
        .unwrap();
    Indexer::new(backend.clone(), &config)
        .build(&CountingStore::pages(3))
        .await
        .unwrap();

    let starts = backend.starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 3);
    let spread = starts[2].duration_since(starts[0]);
    assert!(spread >= Duration::from_millis(110), "dispatch spread {spread:?}");
}

#[tokio::test]
async fn session_from_parts_answers() {
    let dir = tempfile::tempdir().unwrap();
    let index_store = JsonIndexStore::new(dir.path().join("s.index.json"), "s.pdf");
    let backend = Arc::new(
        ScriptedBackend::new()
            .script(CallPurpose::Summarize, &[SUMMARY_JSON])
            .script(CallPurpose::Predict, &["Pages: [2]"])
            .script(CallPurpose::Answer, &["Two [Page 2]."]),
    );
    let config = QaConfig::builder().chunk_size(5).build().unwrap();

    let session = PdfQa::from_parts(
        Arc::new(CountingStore::pages(12)),
        backend,
        &index_store,
        &config,
        false,
    )
    .await
    .unwrap();

    assert_eq!(session.metadata().total_sections, 3);
    let r = session.ask("What is on page two?").await.unwrap();
    assert_eq!(r.citations, vec![2]);
}

#[tokio::test]
async fn progress_reports_indexing_and_attempts() {
    use edgequake_pdfqa::{QaProgressCallback, ToolError};

    #[derive(Default)]
    struct Recorder {
        sections_done: AtomicUsize,
        failures: AtomicUsize,
        finished: Mutex<Option<(TerminalReason, u32)>>,
    }

    impl QaProgressCallback for Recorder {
        fn on_section_complete(&self, _section_id: usize, _total: usize) {
            self.sections_done.fetch_add(1, Ordering::SeqCst);
        }
        fn on_attempt_failed(&self, _attempt: u32, _error: &ToolError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn on_question_complete(&self, reason: TerminalReason, attempts: u32) {
            *self.finished.lock().unwrap() = Some((reason, attempts));
        }
    }

    let recorder = Arc::new(Recorder::default());
    let config = QaConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        ScriptedBackend::new()
            .script(CallPurpose::Summarize, &[SUMMARY_JSON])
            .script(CallPurpose::Predict, &["Pages: [99]"])
            .script(CallPurpose::Correct, &["Pages: [19]"])
            .script(CallPurpose::Answer, &["Nineteen [Page 19]."]),
    );

    let session = PdfQa::from_parts(
        Arc::new(CountingStore::pages(20)),
        backend,
        &JsonIndexStore::new(dir.path().join("p.index.json"), "p.pdf"),
        &config,
        false,
    )
    .await
    .unwrap();
    session.ask("q").await.unwrap();

    assert_eq!(recorder.sections_done.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.failures.load(Ordering::SeqCst), 1);
    assert_eq!(
        *recorder.finished.lock().unwrap(),
        Some((TerminalReason::Answered, 2))
    );
}
