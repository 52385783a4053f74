use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Apply the fixed OCR preprocessing to a decoded page image and return PNG bytes.
pub fn prepare_for_ocr(img: DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    encode_as_png(normalize(img))
}

/// Decode raw image bytes (JPEG / PNG / TIFF / …) and preprocess them.
pub fn prepare_for_ocr_from_bytes(data: &[u8]) -> Result<Vec<u8>, PreprocessError> {
    let img = image::load_from_memory(data)?;
    prepare_for_ocr(img)
}

/// Grayscale, median denoise, contrast stretch.
fn normalize(img: DynamicImage) -> DynamicImage {
    // Statement scans come in at 300-400 DPI; Tesseract gains nothing past ~2800 px.
    let (width, height) = (img.width(), img.height());
    let downscaled = width > 2800 || height > 2800;
    let img = if downscaled {
        img.resize(2800, 2800, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };
    tracing::debug!(width, height, downscaled, "preparing page image for OCR");

    let gray = median_filter(&img.to_luma8());

    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        return DynamicImage::ImageLuma8(gray);
    }

    let range = (max_px - min_px) as u32;
    let stretched: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        let v = ((p - min_px) as u32 * 255 / range) as u8;
        Luma([v])
    });

    DynamicImage::ImageLuma8(stretched)
}

/// 3×3 median filter; edge pixels use the clamped neighbourhood.
fn median_filter(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    ImageBuffer::from_fn(w, h, |x, y| {
        let mut window = [0u8; 9];
        let mut n = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let ny = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                window[n] = gray.get_pixel(nx, ny)[0];
                n += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}

fn encode_as_png(img: DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
