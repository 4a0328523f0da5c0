//! Page fetching with validation: the "tool" whose failures drive correction.

use crate::backend::{with_timeout, TimedOut};
use crate::config::QaConfig;
use crate::error::{BackendError, ToolError};
use crate::index::SectionIndex;
use crate::output::{PageContent, SectionSummary};
use crate::store::PageStore;
use std::time::Duration;
use tracing::debug;

/// Validates predicted pages and fetches their content.
pub struct Fetcher {
    timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &QaConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
        }
    }

    /// Fetch `pages` in order, all or nothing.
    ///
    /// Checks run in a fixed order: empty list, then range (the store is
    /// never called if any page is out of range), then one store lookup per
    /// page. Every error except `EmptyPrediction` carries the section
    /// nearest to the offending page.
    pub async fn fetch(
        &self,
        pages: &[usize],
        index: &SectionIndex,
        store: &dyn PageStore,
    ) -> Result<Vec<PageContent>, ToolError> {
        let range = index.valid_range();
        let hint = |page: usize| -> Option<SectionSummary> { index.nearest_section(page).cloned() };

        if pages.is_empty() {
            return Err(ToolError::empty_prediction(range));
        }

        if let Some(&bad) = pages.iter().find(|&&p| !index.metadata().contains(p)) {
            debug!("Rejecting page {} (valid {}-{})", bad, range.0, range.1);
            return Err(ToolError::out_of_range(bad, range, hint(bad)));
        }

        let mut content = Vec::with_capacity(pages.len());
        for &page in pages {
            match with_timeout(self.timeout, store.get_page(page)).await {
                Ok(c) => content.push(c),
                Err(TimedOut::Failed(e)) => {
                    return Err(ToolError::not_found(&e, range, hint(page)));
                }
                Err(TimedOut::Elapsed(d)) => {
                    let timeout = BackendError::Timeout {
                        ms: d.as_millis() as u64,
                    };
                    return Err(ToolError::backend(
                        &timeout,
                        &format!("fetching page {page}"),
                        range,
                        hint(page),
                    ));
                }
            }
        }

        debug!("Fetched {} pages", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use crate::index::uniform_index;
    use crate::store::MemoryPageStore;

    fn store(n: usize) -> MemoryPageStore {
        MemoryPageStore::from_texts((1..=n).map(|i| format!("page {i}")))
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(&QaConfig::default())
    }

    #[tokio::test]
    async fn fetches_in_input_order() {
        let index = uniform_index(10, 5);
        let pages = fetcher().fetch(&[7, 2], &index, &store(10)).await.unwrap();
        assert_eq!(pages[0].page_number, 7);
        assert_eq!(pages[1].text, "page 2");
    }

    #[tokio::test]
    async fn empty_list_first() {
        let index = uniform_index(10, 5);
        let err = fetcher().fetch(&[], &index, &store(10)).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::EmptyPrediction);
        assert!(err.nearest_section_hint.is_none());
    }

    #[tokio::test]
    async fn out_of_range_reports_first_offender_with_hint() {
        let index = uniform_index(100, 10);
        let err = fetcher()
            .fetch(&[5, 0, 150], &index, &store(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::OutOfRange);
        assert!(err.message.contains("Page 0 out of range (1-100)"));
        assert_eq!(err.nearest_section_hint.unwrap().section_id, 1);

        let err = fetcher().fetch(&[150], &index, &store(100)).await.unwrap_err();
        assert_eq!(err.valid_range, (1, 100));
        assert_eq!(err.nearest_section_hint.unwrap().section_id, 10);
    }

    #[tokio::test]
    async fn missing_page_is_not_found() {
        let index = uniform_index(10, 5);
        let mut s = store(10);
        s.remove(4);
        let err = fetcher().fetch(&[3, 4], &index, &s).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
        assert_eq!(err.nearest_section_hint.unwrap().page_range, (1, 5));
    }
}
