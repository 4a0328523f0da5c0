//! PDF access through pdfium: the [`PdfPageStore`] and document inspection.
//!
//! `pdfium-render` wraps a C++ library with thread-local state, so every
//! call runs inside `tokio::task::spawn_blocking` and opens the document on
//! that thread. The library itself is located (and downloaded on first use)
//! by `pdfium-auto`.
//!
//! Page images are rendered at `dpi`, with both edges capped at
//! `max_rendered_pixels`: an A0 poster at 150 DPI would otherwise produce a
//! 12,000 × 17,000 px image.

use crate::config::QaConfig;
use crate::error::{PageStoreError, PdfQaError};
use crate::output::{PageContent, PageImage, PdfProperties};
use crate::pipeline::encode::encode_page;
use crate::store::{self, PageStore};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page store reading text (and optionally page images) from a PDF file.
#[derive(Debug, Clone)]
pub struct PdfPageStore {
    path: PathBuf,
    password: Option<String>,
    page_count: usize,
    render_images: bool,
    dpi: u32,
    max_pixels: u32,
    content_hash: String,
}

impl PdfPageStore {
    /// Open `path`, failing fast on binding, password and corruption errors.
    pub async fn open(path: &Path, config: &QaConfig) -> Result<Self, PdfQaError> {
        let props = inspect_pdf(path, config.password.as_deref()).await?;
        if props.page_count == 0 {
            return Err(PdfQaError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PdfQaError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        info!("PDF opened: {} ({} pages)", path.display(), props.page_count);

        Ok(Self {
            path: path.to_path_buf(),
            password: config.password.clone(),
            page_count: props.page_count,
            render_images: config.use_vision,
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            content_hash: store::content_hash(&bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn extract(
        &self,
        first: usize,
        last: usize,
        images: bool,
    ) -> Result<Vec<PageContent>, PageStoreError> {
        if first == 0 || last > self.page_count || first > last {
            let page = if first == 0 || first > self.page_count { first } else { last };
            return Err(PageStoreError::NotFound { page });
        }

        let path = self.path.clone();
        let password = self.password.clone();
        let render = images.then_some(RenderSize {
            dpi: self.dpi,
            max_pixels: self.max_pixels,
        });

        tokio::task::spawn_blocking(move || {
            extract_pages_blocking(&path, password.as_deref(), first, last, render)
        })
        .await
        .map_err(|e| PageStoreError::ExtractionFailed {
            page: first,
            detail: format!("extraction task panicked: {e}"),
        })?
    }
}

#[async_trait]
impl PageStore for PdfPageStore {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn content_hash(&self) -> Option<String> {
        Some(self.content_hash.clone())
    }

    async fn get_page(&self, page: usize) -> Result<PageContent, PageStoreError> {
        let mut pages = self.extract(page, page, self.render_images).await?;
        pages.pop().ok_or(PageStoreError::NotFound { page })
    }

    /// One document load for the whole range, text only.
    async fn section_text(&self, first: usize, last: usize) -> Result<String, PageStoreError> {
        let pages = self.extract(first, last, false).await?;
        Ok(pages
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn bind() -> Result<Pdfium, PdfQaError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| PdfQaError::PdfiumBindingFailed(e.to_string()))
}

fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> PdfQaError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            PdfQaError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            PdfQaError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        PdfQaError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RenderSize {
    dpi: u32,
    max_pixels: u32,
}

impl RenderSize {
    /// Pixel width for a page `width_points` wide (72 points per inch).
    fn target_width(&self, width_points: f32) -> i32 {
        let px = (width_points * self.dpi as f32 / 72.0).round();
        px.min(self.max_pixels as f32).max(1.0) as i32
    }
}

/// Blocking extraction of pages `first..=last` (1-based); pages are
/// rendered only when `render` is set.
fn extract_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    first: usize,
    last: usize,
    render: Option<RenderSize>,
) -> Result<Vec<PageContent>, PageStoreError> {
    let failed = |page: usize, detail: String| PageStoreError::ExtractionFailed { page, detail };

    let pdfium = bind().map_err(|e| failed(first, e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| failed(first, load_error(pdf_path, password, e).to_string()))?;
    let pages = document.pages();

    let mut results = Vec::with_capacity(last - first + 1);
    for number in first..=last {
        let page = pages
            .get((number - 1) as u16)
            .map_err(|_| PageStoreError::NotFound { page: number })?;

        let text = page
            .text()
            .map_err(|e| failed(number, format!("{:?}", e)))?
            .all();

        let mut content = PageContent::text_only(number, text);
        if let Some(size) = render {
            let render_config = PdfRenderConfig::new()
                .set_target_width(size.target_width(page.width().value))
                .set_maximum_height(size.max_pixels as i32);
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| failed(number, format!("{:?}", e)))?;
            let image = bitmap.as_image();
            debug!("Rendered page {} → {}x{} px", number, image.width(), image.height());
            let encoded: PageImage =
                encode_page(&image).map_err(|e| failed(number, e.to_string()))?;
            content = content.with_images(vec![encoded]);
        }
        results.push(content);
    }

    debug!("Extracted pages {}-{} from {}", first, last, pdf_path.display());
    Ok(results)
}

/// Read document properties without any LLM call.
pub async fn inspect_pdf(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<PdfProperties, PdfQaError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || inspect_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| PdfQaError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_blocking(pdf_path: &Path, password: Option<&str>) -> Result<PdfProperties, PdfQaError> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(PdfProperties {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
