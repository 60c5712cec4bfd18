//! Preview encoding: unreadable page raster → base64 JPEG.
//!
//! Pages no OCR tier could read are still shown to the caller. The raster is
//! contrast-stretched and sharpened so faint scans stay legible, shrunk to a
//! bounded thumbnail and stored as JPEG, which is a fraction of the PNG size
//! for photographic scans.

use crate::ocr::preprocess::{autocontrast, unsharp_mask};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Autocontrast (2 % cutoff) and unsharp mask (radius 2, 150 %) on the
/// luminance of `img`.
pub fn enhance_preview(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    let gray = autocontrast(&gray, 2.0);
    DynamicImage::ImageLuma8(unsharp_mask(&gray, 2.0, 150, 3))
}

/// Shrink so neither side exceeds `max_side`. Smaller images are untouched.
pub fn thumbnail(img: &DynamicImage, max_side: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_side {
        return img.clone();
    }
    img.resize(max_side, max_side, FilterType::Lanczos3)
}

/// Enhance, thumbnail and encode a page preview as base64 JPEG.
pub fn encode_preview(
    img: &DynamicImage,
    max_side: u32,
    quality: u8,
) -> Result<String, image::ImageError> {
    let small = thumbnail(&enhance_preview(img), max_side);

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    small.write_with_encoder(encoder)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded preview {}x{} → {} bytes base64",
        small.width(),
        small.height(),
        b64.len()
    );
    Ok(b64)
}
