//! Pixel density declared in encoded image headers.
//!
//! Only the two containers the fetch path sees in practice are read: the PNG
//! `pHYs` chunk and the JFIF `APP0` segment of a JPEG. Anything else (EXIF
//! resolution tags, WebP, TIFF) falls back to the engine's assumed DPI.

use image::ImageFormat;
use std::io::Cursor;

const INCHES_PER_METER: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// Horizontal DPI declared by `bytes`, or `None` when the header has no
/// physical unit or the format is not PNG/JPEG.
pub fn declared_dpi(bytes: &[u8]) -> Option<u32> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => png_dpi(bytes),
        ImageFormat::Jpeg => jfif_dpi(bytes),
        _ => None,
    }
}

fn png_dpi(bytes: &[u8]) -> Option<u32> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        png::Unit::Meter => to_dpi(dims.xppu as f64 * INCHES_PER_METER),
        png::Unit::Unspecified => None,
    }
}

/// Walk the marker segments up to the start of scan looking for `APP0/JFIF`.
fn jfif_dpi(bytes: &[u8]) -> Option<u32> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let body = bytes.get(pos + 4..pos + 2 + len)?;
        if marker == 0xE0 && body.len() >= 12 && body.starts_with(b"JFIF\0") {
            let x_density = u16::from_be_bytes([body[8], body[9]]) as f64;
            return match body[7] {
                1 => to_dpi(x_density),
                2 => to_dpi(x_density * CM_PER_INCH),
                // 0 is an aspect ratio only
                _ => None,
            };
        }
        pos += 2 + len;
    }
    None
}

fn to_dpi(value: f64) -> Option<u32> {
    let dpi = value.round();
    (dpi >= 1.0).then_some(dpi as u32)
}
