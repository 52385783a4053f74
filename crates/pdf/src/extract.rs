use mledger_core::ParseWarning;
use mledger_ocr::{prepare_for_ocr, OcrBackend};
use thiserror::Error;

use crate::backend::StatementPages;

/// Text of one page and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageText {
    TextLayer(String),
    OcrRendered(String),
}

impl PageText {
    pub fn text(&self) -> &str {
        match self {
            PageText::TextLayer(t) | PageText::OcrRendered(t) => t,
        }
    }

    pub fn is_ocr(&self) -> bool {
        matches!(self, PageText::OcrRendered(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub text: String,
    pub page: usize,
    pub line: usize,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub lines: Vec<LineRecord>,
    pub page_count: usize,
    pub ocr_pages: usize,
    pub empty_pages: usize,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No text could be extracted from any of {pages} pages")]
    NoText { pages: usize },
}

pub struct TextExtractor<'a, R: OcrBackend + ?Sized> {
    recognizer: &'a R,
}

impl<'a, R: OcrBackend + ?Sized> TextExtractor<'a, R> {
    pub fn new(recognizer: &'a R) -> Self {
        Self { recognizer }
    }

    /// Flatten every page into trimmed, non-empty lines in reading order.
    pub fn extract(&self, doc: &dyn StatementPages) -> Result<Extraction, ExtractError> {
        let mut out = Extraction {
            page_count: doc.page_count(),
            ..Default::default()
        };

        for page in 0..out.page_count {
            let text = match self.extract_page(doc, page, &mut out.warnings) {
                Some(t) => t,
                None => {
                    out.empty_pages += 1;
                    continue;
                }
            };
            if text.is_ocr() {
                out.ocr_pages += 1;
            }
            let start = out.lines.len();
            out.lines.extend(
                text.text()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .enumerate()
                    .map(|(line, l)| LineRecord { text: l.to_string(), page, line }),
            );
            tracing::debug!(
                page,
                lines = out.lines.len() - start,
                ocr = text.is_ocr(),
                "page extracted"
            );
        }

        if out.lines.is_empty() {
            return Err(ExtractError::NoText { pages: out.page_count });
        }
        Ok(out)
    }

    /// Text layer first; render and recognize when it is blank.
    fn extract_page(
        &self,
        doc: &dyn StatementPages,
        page: usize,
        warnings: &mut Vec<ParseWarning>,
    ) -> Option<PageText> {
        match doc.text_layer(page) {
            Ok(text) if !text.trim().is_empty() => return Some(PageText::TextLayer(text)),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(page, error = %e, "text layer unavailable, falling back to OCR");
            }
        }

        let recognized = doc
            .render(page)
            .map_err(|e| e.to_string())
            .and_then(|img| prepare_for_ocr(img).map_err(|e| e.to_string()))
            .and_then(|png| self.recognizer.recognize(&png).map_err(|e| e.to_string()));

        match recognized {
            Ok(text) if !text.trim().is_empty() => Some(PageText::OcrRendered(text)),
            Ok(_) => {
                warnings.push(ParseWarning::PageUnreadable {
                    page,
                    cause: "no text layer and OCR found nothing".to_string(),
                });
                None
            }
            Err(cause) => {
                tracing::warn!(page, %cause, "page unreadable");
                warnings.push(ParseWarning::PageUnreadable { page, cause });
                None
            }
        }
    }
}
