//! Result types returned by the extraction pipelines.

use crate::document::DocumentKind;
use serde::{Deserialize, Serialize};

/// Outcome of extracting one document.
///
/// An unsupported content type produces [`ExtractionResult::unsupported`]:
/// no text, no kind, no previews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Recognised or decoded text. `None` only for unsupported inputs.
    pub text: Option<String>,
    /// Detected document kind.
    pub file_type: Option<DocumentKind>,
    /// Base64 JPEG previews of PDF pages no tier could read.
    pub preview_images: Vec<String>,
}

impl ExtractionResult {
    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn text(kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_type: Some(kind),
            preview_images: Vec::new(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.file_type.is_some()
    }
}

/// Loudness profile of an audio source. Computed once per source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioProfile {
    /// Container duration; `None` when the probe could not read it.
    pub duration_seconds: Option<f64>,
    /// Mean volume reported by `volumedetect`.
    pub mean_volume_dbfs: f64,
    /// Whether the source is quiet enough to get loudnorm + denoise.
    pub needs_gain: bool,
}

impl AudioProfile {
    pub fn new(duration_seconds: Option<f64>, mean_volume_dbfs: f64, threshold_dbfs: f64) -> Self {
        Self {
            duration_seconds,
            mean_volume_dbfs,
            needs_gain: mean_volume_dbfs < threshold_dbfs,
        }
    }
}

/// Speech-ready MP3 (16 kHz, mono) held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAudio {
    #[serde(skip)]
    pub mp3: Vec<u8>,
    pub duration_seconds: f64,
    pub file_name: String,
}

/// One JPEG frame captured from a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub timestamp_seconds: f64,
    pub file_name: String,
}

/// Synthesise the output name of a normalised recording from its URL:
/// the basename with its extension replaced by `.mp3`, or `media.mp3` when
/// the URL has no basename.
pub fn mp3_file_name(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let base = path.rsplit('/').next().unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };
    if stem.is_empty() {
        "media.mp3".to_string()
    } else {
        format!("{stem}.mp3")
    }
}

/// `frame_000.jpg`, `frame_001.jpg`, …
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:03}.jpg")
}
