use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available; build with the `tesseract` feature")]
    NotAvailable,
}

/// Abstraction over an OCR backend.
/// Implementations accept preprocessed PNG bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text, one entry per call in order; the last entry repeats.
/// Lets page-level OCR fallback be tested without Tesseract installed.
pub struct MockRecognizer {
    texts: Vec<String>,
    calls: Mutex<usize>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self::pages([text])
    }

    pub fn pages<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
            calls: Mutex::new(0),
        }
    }

    /// How many images were recognized so far.
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        let idx = (*calls).min(self.texts.len().saturating_sub(1));
        *calls += 1;
        Ok(self.texts.get(idx).cloned().unwrap_or_default())
    }
}

/// Stand-in when no engine is compiled in; every call fails with `NotAvailable`.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            // Statement tables read best as a single uniform block of text.
            lt.set_variable(Variable::TesseditPagesegMode, "6")
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("QA11BB22 2024-01-05 10:30:00");
        assert_eq!(r.recognize(b"fake image data").unwrap(), "QA11BB22 2024-01-05 10:30:00");
    }

    #[test]
    fn mock_pages_advance_and_last_repeats() {
        let r = MockRecognizer::pages(["page one", "page two"]);
        assert_eq!(r.recognize(b"").unwrap(), "page one");
        assert_eq!(r.recognize(b"").unwrap(), "page two");
        assert_eq!(r.recognize(b"").unwrap(), "page two");
        assert_eq!(r.calls(), 3);
    }

    #[test]
    fn mock_with_no_pages_returns_empty() {
        let r = MockRecognizer::pages(Vec::<String>::new());
        assert_eq!(r.recognize(b"").unwrap(), "");
    }

    #[test]
    fn unavailable_always_errors() {
        assert!(matches!(
            UnavailableRecognizer.recognize(b"img"),
            Err(OcrError::NotAvailable)
        ));
    }
}
