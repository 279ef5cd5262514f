use crate::error::BackendError;
use lopdf::Document;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Raw text from one page, or from the whole document when the backend
/// cannot tell pages apart (`number` is then `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: Option<u32>,
    pub text: String,
}

impl PageText {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Reads the text layer of a PDF. Pages without text are still returned so
/// callers can tell an empty page from a missing one.
pub trait PdfExtractor {
    fn name(&self) -> &'static str;

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, BackendError>;
}

/// Page-by-page extraction through lopdf's content stream decoder.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, BackendError> {
        let document =
            Document::load(path).map_err(|error| BackendError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| BackendError::PdfParse(format!("page {page_no}: {error}")))?;

            pages.push(PageText {
                number: Some(page_no),
                text,
            });
        }

        Ok(pages)
    }
}

/// Per-page extraction through pdf-extract's own text decoder.
#[derive(Debug, Default)]
pub struct PdfExtractExtractor;

impl PdfExtractor for PdfExtractExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, BackendError> {
        let bytes = std::fs::read(path)?;

        // pdf-extract panics on some malformed inputs instead of returning an error.
        let pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }))
        .map_err(|_| BackendError::PdfParse("pdf-extract panicked while decoding".to_string()))?
        .map_err(|error| BackendError::PdfParse(error.to_string()))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| PageText {
                number: Some((index + 1) as u32),
                text,
            })
            .collect())
    }
}
