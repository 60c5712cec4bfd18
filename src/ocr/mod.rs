//! Budgeted image OCR.
//!
//! The engine ([`OcrEngine`]) prepares an image once (long-side cap,
//! grayscale, orientation fix, DPI normalisation, contrast, sharpening,
//! denoise, binarisation) and then climbs a ladder of recognition tiers:
//!
//! ```text
//!  Fast   (uniform block)  ──conf < target && elapsed ≤ budget──▶
//!  Strong (multi-column)   ──conf < target && elapsed ≤ budget──▶
//!  Tile   (strong, per tile, budget re-checked between tiles)
//! ```
//!
//! The best attempt seen is returned, so callers always get the most
//! confident partial result achievable within the budget.
//!
//! Recognition itself sits behind the [`Recognizer`] trait; the shipped
//! implementation is [`tesseract::TesseractCli`].

pub mod density;
pub mod engine;
pub mod preprocess;
pub mod tesseract;
pub mod tiling;

use crate::error::RecognitionError;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;

pub use engine::{OcrEngine, OcrOutcome};
pub use tiling::TileBox;

/// Page segmentation mode passed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentationMode {
    /// Orientation and script detection only (psm 0).
    OsdOnly,
    /// Fully automatic page segmentation (psm 3).
    Auto,
    /// A single column of text of variable sizes (psm 4).
    SingleColumn,
    /// A single uniform block of text (psm 6).
    UniformBlock,
}

impl SegmentationMode {
    pub fn psm(self) -> u8 {
        match self {
            SegmentationMode::OsdOnly => 0,
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::UniformBlock => 6,
        }
    }
}

/// Recognition engine mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineMode {
    /// Neural-net line recogniser only (oem 1).
    LstmOnly,
    /// Whatever the installation defaults to (oem 3).
    Default,
}

impl EngineMode {
    pub fn oem(self) -> u8 {
        match self {
            EngineMode::LstmOnly => 1,
            EngineMode::Default => 3,
        }
    }
}

/// Everything a recognizer needs besides the pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecognitionOptions {
    pub segmentation_mode: SegmentationMode,
    pub engine_mode: EngineMode,
    pub language: String,
    pub extra_config: Vec<String>,
}

/// Text and mean word confidence (0–100) of one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

impl Recognition {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A text recognizer.
///
/// Implementations must be callable from several threads; the engine
/// nevertheless serialises all calls through one process-wide permit.
pub trait Recognizer: Send + Sync {
    /// Recognise the text of a grayscale image.
    fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, RecognitionError>;

    /// Clockwise rotation (0, 90, 180, 270) that makes the image upright,
    /// or `None` when detection is unavailable or inconclusive.
    fn detect_orientation(&self, image: &GrayImage) -> Option<u32>;
}

/// One rung of the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OcrTier {
    Fast,
    Strong,
    Tile,
}

impl OcrTier {
    pub const LADDER: [OcrTier; 3] = [OcrTier::Fast, OcrTier::Strong, OcrTier::Tile];

    pub fn segmentation_mode(self) -> SegmentationMode {
        match self {
            OcrTier::Fast => SegmentationMode::UniformBlock,
            OcrTier::Strong | OcrTier::Tile => SegmentationMode::SingleColumn,
        }
    }
}

/// One recorded recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrAttempt {
    pub tile_box: TileBox,
    pub tier: OcrTier,
    pub text: String,
    pub confidence: f32,
    pub elapsed: Duration,
}

/// An image handed to the engine, with its pixel density when known.
#[derive(Debug, Clone)]
pub struct OcrImage {
    pub image: image::DynamicImage,
    pub dpi: Option<u32>,
}

impl OcrImage {
    pub fn new(image: image::DynamicImage) -> Self {
        Self { image, dpi: None }
    }

    pub fn with_dpi(image: image::DynamicImage, dpi: u32) -> Self {
        Self {
            image,
            dpi: Some(dpi),
        }
    }

    /// Decode `bytes`, keeping the density declared in the file header.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let mut decoded = Self::new(image::load_from_memory(bytes)?);
        decoded.dpi = density::declared_dpi(bytes);
        Ok(decoded)
    }
}

/// Memoisation key for one recognition call: a digest of the exact pixels
/// plus the options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecognitionKey {
    digest: u64,
    width: u32,
    height: u32,
    options: RecognitionOptions,
}

impl RecognitionKey {
    pub fn new(image: &GrayImage, options: &RecognitionOptions) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        image.as_raw().hash(&mut hasher);
        Self {
            digest: hasher.finish(),
            width: image.width(),
            height: image.height(),
            options: options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_modes() {
        assert_eq!(OcrTier::Fast.segmentation_mode().psm(), 6);
        assert_eq!(OcrTier::Strong.segmentation_mode().psm(), 4);
        assert_eq!(OcrTier::Tile.segmentation_mode().psm(), 4);
        assert!(OcrTier::Fast < OcrTier::Strong && OcrTier::Strong < OcrTier::Tile);
    }

    #[test]
    fn recognition_key_depends_on_pixels_and_options() {
        let opts = RecognitionOptions {
            segmentation_mode: SegmentationMode::UniformBlock,
            engine_mode: EngineMode::LstmOnly,
            language: "por".into(),
            extra_config: vec![],
        };
        let a = GrayImage::from_pixel(4, 4, image::Luma([0]));
        let b = GrayImage::from_pixel(4, 4, image::Luma([255]));
        assert_eq!(RecognitionKey::new(&a, &opts), RecognitionKey::new(&a, &opts));
        assert_ne!(RecognitionKey::new(&a, &opts), RecognitionKey::new(&b, &opts));

        let other = RecognitionOptions {
            language: "eng".into(),
            ..opts.clone()
        };
        assert_ne!(RecognitionKey::new(&a, &opts), RecognitionKey::new(&a, &other));
    }
}
