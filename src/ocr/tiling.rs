//! Slicing oversized or elongated images into overlapping tiles.
//!
//! | Image                                   | Tiles                      |
//! |-----------------------------------------|----------------------------|
//! | long side ≤ `max_dim` and area ≤ limit  | one tile (the whole image) |
//! | `w ≥ h` and (`w > max_dim` or `w/h ≥ 3`)| vertical stripes           |
//! | `h > max_dim` or `h/w ≥ 3`              | horizontal stripes         |
//! | anything else                           | 2×2 grid                   |
//!
//! Stripes are `stripe` pixels thick and overlap by `overlap` pixels so no
//! glyph on a seam is lost. Tiles are returned in reading order.

use crate::config::TilingConfig;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A rectangle in image coordinates: `left`/`top` inclusive,
/// `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileBox {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Reading-order key.
    pub fn order_key(&self) -> (u32, u32) {
        (self.top, self.left)
    }

    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        image::imageops::crop_imm(image, self.left, self.top, self.width(), self.height())
            .to_image()
    }
}

/// Compute the tiles covering a `width`×`height` image, sorted by
/// `(top, left)`.
pub fn tile_boxes(width: u32, height: u32, config: &TilingConfig) -> Vec<TileBox> {
    let (w, h) = (width, height);
    if w == 0 || h == 0 {
        return vec![TileBox::full(w, h)];
    }
    if w.max(h) <= config.max_dim && (w as u64) * (h as u64) <= config.max_area {
        return vec![TileBox::full(w, h)];
    }

    let stripe = config.stripe.max(1);
    let step = stripe.saturating_sub(config.overlap).max(1);

    let mut boxes = if w >= h && (w > config.max_dim || w as f64 / h as f64 >= 3.0) {
        spans(w, stripe, step)
            .map(|(x0, x1)| TileBox {
                left: x0,
                top: 0,
                right: x1,
                bottom: h,
            })
            .collect::<Vec<_>>()
    } else if h > config.max_dim || h as f64 / w as f64 >= 3.0 {
        spans(h, stripe, step)
            .map(|(y0, y1)| TileBox {
                left: 0,
                top: y0,
                right: w,
                bottom: y1,
            })
            .collect()
    } else {
        let (mx, my) = (w / 2, h / 2);
        vec![
            TileBox { left: 0, top: 0, right: mx, bottom: my },
            TileBox { left: mx, top: 0, right: w, bottom: my },
            TileBox { left: 0, top: my, right: mx, bottom: h },
            TileBox { left: mx, top: my, right: w, bottom: h },
        ]
    };

    boxes.sort_by_key(TileBox::order_key);
    boxes
}

/// `[start, end)` spans of length `stripe` every `step` pixels, the last one
/// clipped to `len`.
fn spans(len: u32, stripe: u32, step: u32) -> impl Iterator<Item = (u32, u32)> {
    let mut next = Some(0u32);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(stripe).min(len);
        next = if end >= len { None } else { Some(start + step) };
        Some((start, end))
    })
}
