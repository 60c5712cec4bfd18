//! Image preparation before recognition.
//!
//! Every step is a pure `GrayImage → GrayImage` (or `DynamicImage`) function
//! running on the calling thread. The order used by the engine is:
//!
//! 1. [`normalize_long_side`]: cap the long side (optionally upscale small images)
//! 2. grayscale
//! 3. orientation fix (engine-side, needs the recognizer)
//! 4. [`ensure_dpi`]: Lanczos upscale to the target DPI, bounded by the same cap
//! 5. [`autocontrast`] with a 0.5 % cutoff
//! 6. [`unsharp_mask`] radius 1.2, 150 %, threshold 3
//! 7. [`median3`] denoise
//! 8. [`adaptive_threshold`] block 35, C 15

use crate::config::OcrConfig;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use tracing::trace;

/// Downscale so the long side is at most `max_long_side`. When `upscale_to`
/// is set, images whose long side is below it are enlarged toward it (never
/// past the cap).
pub fn normalize_long_side(
    image: &DynamicImage,
    max_long_side: u32,
    upscale_to: Option<u32>,
) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    let long = w.max(h);
    if long == 0 {
        return image.clone();
    }

    let target = if long > max_long_side {
        max_long_side
    } else {
        match upscale_to {
            Some(t) if long < t => t.min(max_long_side),
            _ => return image.clone(),
        }
    };

    let scale = target as f64 / long as f64;
    let (nw, nh) = scaled(w, h, scale);
    trace!("normalize_long_side {}x{} -> {}x{}", w, h, nw, nh);
    image.resize_exact(nw, nh, FilterType::Lanczos3)
}

/// Upscale a grayscale image from `dpi` to `target_dpi` (Lanczos), keeping
/// the long side within `max_long_side`. Images already at or above the
/// target are returned unchanged.
pub fn ensure_dpi(image: GrayImage, dpi: u32, target_dpi: u32, max_long_side: u32) -> GrayImage {
    if dpi == 0 || dpi >= target_dpi {
        return image;
    }
    let (w, h) = image.dimensions();
    let long = w.max(h).max(1);
    let factor = (target_dpi as f64 / dpi as f64).min(max_long_side as f64 / long as f64);
    if factor <= 1.0 {
        return image;
    }
    let (nw, nh) = scaled(w, h, factor);
    trace!("ensure_dpi {}dpi {}x{} -> {}x{}", dpi, w, h, nw, nh);
    imageops::resize(&image, nw, nh, FilterType::Lanczos3)
}

/// Rotate clockwise by a multiple of 90°. Other angles are ignored.
pub fn rotate_clockwise(image: GrayImage, degrees: u32) -> GrayImage {
    match degrees % 360 {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    }
}

/// Stretch the histogram so the darkest and brightest `cutoff_percent` of
/// pixels saturate.
pub fn autocontrast(image: &GrayImage, cutoff_percent: f32) -> GrayImage {
    let mut hist = [0u64; 256];
    for p in image.pixels() {
        hist[p[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return image.clone();
    }
    let cut = (total as f64 * cutoff_percent as f64 / 100.0) as u64;

    let mut lo = 0usize;
    let mut acc = 0u64;
    while lo < 255 {
        acc += hist[lo];
        if acc > cut {
            break;
        }
        lo += 1;
    }
    let mut hi = 255usize;
    acc = 0;
    while hi > 0 {
        acc += hist[hi];
        if acc > cut {
            break;
        }
        hi -= 1;
    }
    if hi <= lo {
        return image.clone();
    }

    let scale = 255.0 / (hi - lo) as f32;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f32 - lo as f32) * scale).round().clamp(0.0, 255.0) as u8;
    }
    map_pixels(image, |v| lut[v as usize])
}

/// Classic unsharp mask: add `percent` of the difference from a Gaussian
/// blur wherever it exceeds `threshold`.
pub fn unsharp_mask(image: &GrayImage, radius: f32, percent: u32, threshold: u8) -> GrayImage {
    let blurred = gaussian_blur_f32(image, radius.max(0.1));
    let amount = percent as f32 / 100.0;
    let mut out = image.clone();
    for (o, b) in out.pixels_mut().zip(blurred.pixels()) {
        let diff = o[0] as i32 - b[0] as i32;
        if diff.unsigned_abs() >= threshold as u32 {
            o[0] = (o[0] as f32 + diff as f32 * amount).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// 3×3 median filter.
pub fn median3(image: &GrayImage) -> GrayImage {
    median_filter(image, 1, 1)
}

/// Adaptive Gaussian threshold: a pixel becomes white when it is brighter
/// than its Gaussian-weighted `block`×`block` neighbourhood minus `c`.
pub fn adaptive_threshold(image: &GrayImage, block: u32, c: i32) -> GrayImage {
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local = gaussian_blur_f32(image, sigma);
    let mut out = GrayImage::new(image.width(), image.height());
    for ((o, p), m) in out.pixels_mut().zip(image.pixels()).zip(local.pixels()) {
        o[0] = if p[0] as i32 > m[0] as i32 - c { 255 } else { 0 };
    }
    out
}

/// Steps 4–8 of the preparation chain on an already oriented image.
pub fn enhance_for_recognition(image: GrayImage, dpi: Option<u32>, config: &OcrConfig) -> GrayImage {
    let dpi = dpi.unwrap_or(config.assumed_dpi);
    let image = ensure_dpi(image, dpi, config.target_dpi, config.max_long_side);
    let image = autocontrast(&image, 0.5);
    let image = unsharp_mask(&image, 1.2, 150, 3);
    let image = median3(&image);
    adaptive_threshold(&image, 35, 15)
}

/// Downscale by `factor` (Lanczos), used for the reduced-resolution retry.
pub fn downscale(image: &GrayImage, factor: f64) -> GrayImage {
    let (w, h) = image.dimensions();
    let (nw, nh) = scaled(w, h, factor);
    imageops::resize(image, nw, nh, FilterType::Lanczos3)
}

fn scaled(w: u32, h: u32, factor: f64) -> (u32, u32) {
    (
        ((w as f64 * factor).round() as u32).max(1),
        ((h as f64 * factor).round() as u32).max(1),
    )
}

fn map_pixels(image: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = f(p[0]);
    }
    out
}
