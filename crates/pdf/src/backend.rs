use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Object, ObjectId};
use thiserror::Error;

use crate::layout;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Password rejected")]
    WrongPassword,
    #[error("Malformed document: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Page {0} does not exist")]
    OutOfRange(usize),
    #[error("Text layer error: {0}")]
    Text(String),
    #[error("Page has no embedded image to recognize")]
    NoImage,
    #[error("Unsupported image encoding: {0}")]
    UnsupportedImage(String),
    #[error("Image decode error: {0}")]
    Decode(String),
}

/// An opened (and, if needed, decrypted) document.
/// Dropping it releases the decrypted content.
pub trait StatementPages: Send {
    fn page_count(&self) -> usize;
    fn is_encrypted(&self) -> bool;
    /// Embedded text of page `index` (0-based). Empty when the page is a scan.
    fn text_layer(&self, index: usize) -> Result<String, PageError>;
    /// Raster image of page `index` for optical recognition.
    fn render(&self, index: usize) -> Result<DynamicImage, PageError>;
}

/// Abstraction over a PDF engine.
pub trait PdfBackend: Send + Sync {
    /// Open `bytes`, decrypting with `password` (or the empty password when `None`)
    /// if the document is locked. Unlocked documents ignore the password.
    fn open(&self, bytes: &[u8], password: Option<&str>)
        -> Result<Box<dyn StatementPages>, OpenError>;
}

// ── lopdf backend ─────────────────────────────────────────────────────────────

pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Box<dyn StatementPages>, OpenError> {
        let mut doc =
            lopdf::Document::load_mem(bytes).map_err(|e| OpenError::Malformed(e.to_string()))?;
        let encrypted = doc.is_encrypted();
        if encrypted {
            match doc.decrypt(password.unwrap_or("")) {
                Ok(()) => {}
                Err(lopdf::Error::Decryption(
                    lopdf::encryption::DecryptionError::IncorrectPassword,
                )) => return Err(OpenError::WrongPassword),
                Err(e) => return Err(OpenError::Malformed(e.to_string())),
            }
        }
        let pages = doc.get_pages().into_values().collect();
        Ok(Box::new(LopdfPages { doc, pages, encrypted }))
    }
}

struct LopdfPages {
    doc: lopdf::Document,
    /// Page object ids in page order.
    pages: Vec<ObjectId>,
    encrypted: bool,
}

impl StatementPages for LopdfPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn text_layer(&self, index: usize) -> Result<String, PageError> {
        let page_id = self.pages.get(index).ok_or(PageError::OutOfRange(index))?;
        layout::page_lines(&self.doc, *page_id)
            .map(|lines| lines.join("\n"))
            .map_err(|e| PageError::Text(e.to_string()))
    }

    fn render(&self, index: usize) -> Result<DynamicImage, PageError> {
        let page_id = self.pages.get(index).ok_or(PageError::OutOfRange(index))?;
        let images = match self.doc.get_page_images(*page_id) {
            Ok(images) => images,
            // No /Resources or no /XObject on the page.
            Err(lopdf::Error::DictKey) => return Err(PageError::NoImage),
            Err(e) => return Err(PageError::Decode(e.to_string())),
        };
        // A scanned statement page is one full-page raster; take the largest.
        let scan = images
            .iter()
            .max_by_key(|img| img.width.max(0) * img.height.max(0))
            .ok_or(PageError::NoImage)?;

        let width = u32::try_from(scan.width).map_err(|e| PageError::Decode(e.to_string()))?;
        let height = u32::try_from(scan.height).map_err(|e| PageError::Decode(e.to_string()))?;
        let filters = scan.filters.as_deref().unwrap_or_default();

        let mut data = scan.content.to_vec();
        for (i, filter) in filters.iter().enumerate() {
            match filter.as_str() {
                "FlateDecode" => {
                    data = inflate(&data)?;
                    data = undo_predictor(data, self.decode_parms(scan.origin_dict, i))?;
                }
                // JPEG data is the final encoding; nothing may follow it.
                "DCTDecode" if i + 1 == filters.len() => {
                    return image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
                        .map_err(|e| PageError::Decode(e.to_string()));
                }
                other => return Err(PageError::UnsupportedImage(other.to_string())),
            }
        }
        raw_samples(data, width, height, scan.color_space.as_deref(), scan.bits_per_component)
    }
}

impl LopdfPages {
    /// Decode parameters for the filter at `index` of an image's filter chain.
    fn decode_parms<'a>(&'a self, image: &'a Dictionary, index: usize) -> Option<&'a Dictionary> {
        match image.get(b"DecodeParms").ok()? {
            Object::Dictionary(parms) if index == 0 => Some(parms),
            Object::Array(per_filter) => match per_filter.get(index)? {
                Object::Dictionary(parms) => Some(parms),
                Object::Reference(id) => self.doc.get_dictionary(*id).ok(),
                _ => None,
            },
            Object::Reference(id) if index == 0 => self.doc.get_dictionary(*id).ok(),
            _ => None,
        }
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, PageError> {
    let mut raw = Vec::new();
    flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut raw)
        .map_err(|e| PageError::Decode(e.to_string()))?;
    Ok(raw)
}

/// Reverse the row predictor named in a Flate filter's decode parameters.
fn undo_predictor(data: Vec<u8>, parms: Option<&Dictionary>) -> Result<Vec<u8>, PageError> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    match int_param(parms, b"Predictor", 1) {
        1 => Ok(data),
        // PNG predictors: every row starts with its own filter-type byte.
        10..=15 => {
            let bits = int_param(parms, b"BitsPerComponent", 8);
            if bits != 8 {
                return Err(PageError::UnsupportedImage(format!("{bits} bits per component")));
            }
            let colors = usize::try_from(int_param(parms, b"Colors", 1))
                .map_err(|e| PageError::Decode(e.to_string()))?;
            let columns = usize::try_from(int_param(parms, b"Columns", 1))
                .map_err(|e| PageError::Decode(e.to_string()))?;
            lopdf::filters::png::decode_frame(&data, colors, columns)
                .map_err(|e| PageError::Decode(e.to_string()))
        }
        other => Err(PageError::UnsupportedImage(format!("predictor {other}"))),
    }
}

fn int_param(parms: &Dictionary, key: &[u8], default: i64) -> i64 {
    parms.get(key).and_then(Object::as_i64).unwrap_or(default)
}

/// Build an image from uncompressed 8-bit samples. The sample count must
/// match the dimensions exactly.
fn raw_samples(
    data: Vec<u8>,
    width: u32,
    height: u32,
    color_space: Option<&str>,
    bits_per_component: Option<i64>,
) -> Result<DynamicImage, PageError> {
    if bits_per_component.unwrap_or(8) != 8 {
        return Err(PageError::UnsupportedImage(format!(
            "{} bits per component",
            bits_per_component.unwrap_or_default()
        )));
    }
    let channels = match color_space.unwrap_or("DeviceGray") {
        "DeviceGray" => 1,
        "DeviceRGB" => 3,
        other => return Err(PageError::UnsupportedImage(other.to_string())),
    };
    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
        return Err(PageError::Decode(format!(
            "expected {expected} sample bytes for {width}x{height}, found {}",
            data.len()
        )));
    }
    let image = if channels == 3 {
        RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
    };
    image.ok_or_else(|| PageError::Decode("sample buffer rejected".to_string()))
}

// ── Mock backend (always available, used for tests) ───────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub text: String,
    pub scan: Option<DynamicImage>,
}

impl MockPage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), scan: None }
    }

    /// A page with no text layer, only a raster image.
    pub fn scanned(scan: DynamicImage) -> Self {
        Self { text: String::new(), scan: Some(scan) }
    }
}

/// In-memory document with an optional password.
pub struct MockPdfBackend {
    pages: Vec<MockPage>,
    password: Option<String>,
    malformed: bool,
    opens: AtomicUsize,
}

impl MockPdfBackend {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self { pages, password: None, malformed: false, opens: AtomicUsize::new(0) }
    }

    pub fn locked(pages: Vec<MockPage>, password: impl Into<String>) -> Self {
        Self { password: Some(password.into()), ..Self::new(pages) }
    }

    pub fn malformed() -> Self {
        Self { malformed: true, ..Self::new(vec![]) }
    }

    /// Number of `open` calls made so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PdfBackend for MockPdfBackend {
    fn open(
        &self,
        _bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Box<dyn StatementPages>, OpenError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.malformed {
            return Err(OpenError::Malformed("missing xref table".to_string()));
        }
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(OpenError::WrongPassword);
            }
        }
        Ok(Box::new(MockPages {
            pages: self.pages.clone(),
            encrypted: self.password.is_some(),
        }))
    }
}

struct MockPages {
    pages: Vec<MockPage>,
    encrypted: bool,
}

impl StatementPages for MockPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn text_layer(&self, index: usize) -> Result<String, PageError> {
        self.pages
            .get(index)
            .map(|p| p.text.clone())
            .ok_or(PageError::OutOfRange(index))
    }

    fn render(&self, index: usize) -> Result<DynamicImage, PageError> {
        let page = self.pages.get(index).ok_or(PageError::OutOfRange(index))?;
        page.scan.clone().ok_or(PageError::NoImage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, CellLayout, FixturePage, ScanImage};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use image::{ImageBuffer, Luma};
    use lopdf::dictionary;
    use std::io::Write;

    const ANCHOR_ROW: [&str; 6] = [
        "AB12CD34",
        "2024-01-05 10:30:00",
        "Received from JOHN DOE",
        "Completed",
        "1,000.00",
        "5,000.00",
    ];

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |x, _| {
            Luma([if x % 2 == 0 { 20 } else { 220 }])
        }));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    fn scan(color_space: &'static str, filters: Vec<&'static str>, data: Vec<u8>) -> ScanImage {
        ScanImage {
            width: 4,
            height: 2,
            color_space,
            filters,
            decode_parms: None,
            data,
        }
    }

    fn open(pages: Vec<FixturePage>) -> Box<dyn StatementPages> {
        let bytes = fixture::document(pages).unwrap();
        LopdfBackend.open(&bytes, None).unwrap()
    }

    #[test]
    fn raw_gray_samples_build_image() {
        let img = raw_samples(vec![0u8; 12], 4, 3, Some("DeviceGray"), Some(8)).unwrap();
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn raw_rgb_samples_need_three_channels() {
        assert!(raw_samples(vec![0u8; 12], 4, 3, Some("DeviceRGB"), Some(8)).is_err());
        assert!(raw_samples(vec![0u8; 36], 4, 3, Some("DeviceRGB"), Some(8)).is_ok());
    }

    #[test]
    fn raw_samples_must_match_dimensions_exactly() {
        assert!(matches!(
            raw_samples(vec![0u8; 13], 4, 3, Some("DeviceGray"), Some(8)),
            Err(PageError::Decode(_))
        ));
    }

    #[test]
    fn raw_samples_reject_packed_bits() {
        assert!(matches!(
            raw_samples(vec![0u8; 2], 4, 4, Some("DeviceGray"), Some(1)),
            Err(PageError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn lopdf_rejects_garbage_as_malformed() {
        assert!(matches!(
            LopdfBackend.open(b"definitely not a pdf", None),
            Err(OpenError::Malformed(_))
        ));
    }

    #[test]
    fn unlocked_document_ignores_any_password() {
        let bytes = fixture::document(vec![FixturePage::table(
            &[ANCHOR_ROW.to_vec()],
            CellLayout::SingleBlock,
        )])
        .unwrap();
        for password in [None, Some(""), Some("not-the-password")] {
            let doc = LopdfBackend.open(&bytes, password).unwrap();
            assert!(!doc.is_encrypted());
            assert_eq!(doc.page_count(), 1);
        }
    }

    #[test]
    fn text_layer_joins_table_cells_into_lines() {
        let rows = vec![
            vec!["Receipt No.", "Completion Time", "Details", "Status", "Paid In", "Balance"],
            ANCHOR_ROW.to_vec(),
        ];
        for layout in [CellLayout::SeparateBlocks, CellLayout::SingleBlock] {
            let doc = open(vec![FixturePage::table(&rows, layout)]);
            assert_eq!(
                doc.text_layer(0).unwrap(),
                "Receipt No. Completion Time Details Status Paid In Balance\n\
                 AB12CD34 2024-01-05 10:30:00 Received from JOHN DOE Completed 1,000.00 5,000.00",
                "{layout:?}"
            );
        }
    }

    #[test]
    fn scanned_page_has_blank_text_layer() {
        let doc = open(vec![FixturePage::scanned(scan("DeviceGray", vec![], vec![7u8; 8]))]);
        assert_eq!(doc.text_layer(0).unwrap(), "");
        let img = doc.render(0).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
    }

    #[test]
    fn flate_image_with_png_predictor_is_unfiltered() {
        // Row 0 uses filter type None, row 1 filter type Up.
        let filtered = [0, 10, 20, 30, 40, 2, 40, 40, 40, 40];
        let mut image = scan("DeviceGray", vec!["FlateDecode"], zlib(&filtered));
        image.decode_parms = Some(dictionary! {
            "Predictor" => 15,
            "Colors" => 1,
            "BitsPerComponent" => 8,
            "Columns" => 4,
        });
        let doc = open(vec![FixturePage::scanned(image)]);
        let img = doc.render(0).unwrap();
        assert_eq!(img.into_luma8().into_raw(), vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn flate_image_without_predictor_keeps_samples() {
        let samples: Vec<u8> = (0..24).collect();
        let doc = open(vec![FixturePage::scanned(scan(
            "DeviceRGB",
            vec!["FlateDecode"],
            zlib(&samples),
        ))]);
        assert_eq!(doc.render(0).unwrap().into_rgb8().into_raw(), samples);
    }

    #[test]
    fn predictor_row_bytes_left_in_place_are_rejected() {
        // Predictor bytes without DecodeParms leave the buffer two bytes long.
        let filtered = [0, 10, 20, 30, 40, 2, 40, 40, 40, 40];
        let doc = open(vec![FixturePage::scanned(scan(
            "DeviceGray",
            vec!["FlateDecode"],
            zlib(&filtered),
        ))]);
        assert!(matches!(doc.render(0), Err(PageError::Decode(_))));
    }

    #[test]
    fn jpeg_image_decodes() {
        let mut image = scan("DeviceGray", vec!["DCTDecode"], jpeg(16, 8));
        (image.width, image.height) = (16, 8);
        let doc = open(vec![FixturePage::scanned(image)]);
        let img = doc.render(0).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn filter_chain_is_applied_in_order() {
        let mut image = scan("DeviceGray", vec!["FlateDecode", "DCTDecode"], zlib(&jpeg(16, 8)));
        (image.width, image.height) = (16, 8);
        let doc = open(vec![FixturePage::scanned(image)]);
        assert!(doc.render(0).is_ok());
    }

    #[test]
    fn unknown_filter_is_unsupported() {
        let doc = open(vec![FixturePage::scanned(scan("DeviceGray", vec!["LZWDecode"], vec![0; 8]))]);
        assert!(matches!(doc.render(0), Err(PageError::UnsupportedImage(f)) if f == "LZWDecode"));
    }

    #[test]
    fn page_without_images_has_nothing_to_render() {
        let doc = open(vec![
            FixturePage::blank(),
            FixturePage::table(&[ANCHOR_ROW.to_vec()], CellLayout::SeparateBlocks),
        ]);
        assert!(matches!(doc.render(0), Err(PageError::NoImage)));
        assert!(matches!(doc.render(1), Err(PageError::NoImage)));
        assert!(matches!(doc.render(2), Err(PageError::OutOfRange(2))));
    }

    #[test]
    fn mock_locked_requires_exact_password() {
        let backend = MockPdfBackend::locked(vec![MockPage::text("hello")], "2468");
        assert!(matches!(backend.open(b"", None), Err(OpenError::WrongPassword)));
        assert!(matches!(backend.open(b"", Some("1357")), Err(OpenError::WrongPassword)));
        let doc = backend.open(b"", Some("2468")).unwrap();
        assert!(doc.is_encrypted());
        assert_eq!(doc.text_layer(0).unwrap(), "hello");
        assert_eq!(backend.opens(), 3);
    }

    #[test]
    fn mock_scanned_page_renders() {
        let scan = DynamicImage::ImageLuma8(ImageBuffer::from_fn(2, 2, |_, _| Luma([9u8])));
        let doc = MockPdfBackend::new(vec![MockPage::scanned(scan)]).open(b"", None).unwrap();
        assert_eq!(doc.text_layer(0).unwrap(), "");
        assert!(doc.render(0).is_ok());
        assert!(matches!(doc.render(1), Err(PageError::OutOfRange(1))));
    }
}
