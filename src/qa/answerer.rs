//! Final answer generation over fetched pages.

use crate::backend::{with_timeout, ReasoningBackend};
use crate::config::{CallPurpose, QaConfig};
use crate::error::BackendError;
use crate::output::{PageContent, PageImage, QaResult};
use crate::pipeline::parse::{is_not_found, parse_citations};
use crate::prompts;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Answers a question from already-validated page content.
pub struct Answerer {
    backend: Arc<dyn ReasoningBackend>,
    timeout: Duration,
    use_vision: bool,
    max_images: usize,
}

impl Answerer {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &QaConfig) -> Self {
        Self {
            backend,
            timeout: config.call_timeout(),
            use_vision: config.use_vision,
            max_images: config.max_answer_images,
        }
    }

    /// Returns `Answered` with citations, or `EmptyContent` when the backend
    /// replies with the not-found sentinel.
    pub async fn answer(
        &self,
        question: &str,
        content: &[PageContent],
    ) -> Result<QaResult, BackendError> {
        let pages: Vec<usize> = content.iter().map(|c| c.page_number).collect();
        let text = format_pages(content);
        let images: Vec<PageImage> = if self.use_vision {
            content
                .iter()
                .flat_map(|c| c.images.iter().cloned())
                .take(self.max_images)
                .collect()
        } else {
            Vec::new()
        };

        let prompt = prompts::answer_prompt(question, &text, &pages, !images.is_empty());
        debug!(
            "Answer prompt: {} chars, {} images",
            prompt.len(),
            images.len()
        );

        let reply = with_timeout(
            self.timeout,
            self.backend.complete(CallPurpose::Answer, &prompt, &images),
        )
        .await
        .map_err(|e| e.into_backend_error())?;

        if is_not_found(&reply) || reply.trim().is_empty() {
            return Ok(QaResult::empty_content());
        }

        let answer = reply.trim().to_string();
        let citations = parse_citations(&answer, &pages);
        Ok(QaResult::answered(answer, citations))
    }
}

fn format_pages(content: &[PageContent]) -> String {
    content
        .iter()
        .map(|c| format!("[Page {}]\n{}", c.page_number, c.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Fixed {
        reply: String,
        seen_images: Mutex<usize>,
    }

    #[async_trait]
    impl ReasoningBackend for Fixed {
        async fn complete(
            &self,
            _purpose: CallPurpose,
            _prompt: &str,
            images: &[PageImage],
        ) -> Result<String, BackendError> {
            *self.seen_images.lock().unwrap() = images.len();
            Ok(self.reply.clone())
        }
    }

    fn backend(reply: &str) -> Arc<Fixed> {
        Arc::new(Fixed {
            reply: reply.into(),
            seen_images: Mutex::new(0),
        })
    }

    fn page_with_image(n: usize) -> PageContent {
        PageContent::text_only(n, format!("text {n}")).with_images(vec![PageImage {
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        }])
    }

    #[tokio::test]
    async fn sentinel_is_empty_content() {
        let a = Answerer::new(backend("NOT_FOUND"), &QaConfig::default());
        let r = a.answer("q", &[page_with_image(1)]).await.unwrap();
        assert_eq!(r.terminal_reason, crate::output::TerminalReason::EmptyContent);
        assert!(r.answer.is_none());
    }

    #[tokio::test]
    async fn images_are_capped() {
        let b = backend("It is blue [Page 2].");
        let config = QaConfig::builder().max_answer_images(1).build().unwrap();
        let a = Answerer::new(b.clone(), &config);
        let r = a
            .answer("q", &[page_with_image(1), page_with_image(2)])
            .await
            .unwrap();
        assert_eq!(*b.seen_images.lock().unwrap(), 1);
        assert_eq!(r.citations, vec![2]);
    }

    #[tokio::test]
    async fn vision_off_sends_no_images() {
        let b = backend("Blue.");
        let config = QaConfig::builder().use_vision(false).build().unwrap();
        let r = Answerer::new(b.clone(), &config)
            .answer("q", &[page_with_image(3)])
            .await
            .unwrap();
        assert_eq!(*b.seen_images.lock().unwrap(), 0);
        assert_eq!(r.citations, vec![3]);
    }

    #[test]
    fn pages_are_labelled() {
        let text = format_pages(&[PageContent::text_only(4, " four "), PageContent::text_only(5, "five")]);
        assert_eq!(text, "[Page 4]\nfour\n\n[Page 5]\nfive");
    }
}
