//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use edgequake_extract::error::{ExtractError, RecognitionError};
use edgequake_extract::ocr::RecognitionOptions;
use edgequake_extract::pdf::PageSource;
use edgequake_extract::{ExtractionConfig, Fetched, Fetcher, Recognition, Recognizer};
use image::{DynamicImage, GrayImage, Luma};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ── Fetcher ──────────────────────────────────────────────────────────────────

/// Serves canned responses and counts requests per URL.
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, (Vec<u8>, String)>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, bytes: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.responses
            .insert(url.to_string(), (bytes.into(), content_type.to_string()));
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched, ExtractError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        match self.responses.get(url) {
            Some((bytes, ct)) => Ok(Fetched::with_content_type(bytes.clone(), ct)),
            None => Err(ExtractError::FetchStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

// ── Recognizer ───────────────────────────────────────────────────────────────

type Script = Box<dyn Fn(&GrayImage, &RecognitionOptions) -> Result<Recognition, RecognitionError> + Send + Sync>;

/// Recognizer whose answer is computed by a closure.
pub struct FnRecognizer {
    script: Script,
    pub calls: AtomicUsize,
}

impl FnRecognizer {
    pub fn new(
        script: impl Fn(&GrayImage, &RecognitionOptions) -> Result<Recognition, RecognitionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `text` with `confidence`.
    pub fn constant(text: &str, confidence: f32) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| {
            Ok(Recognition {
                text: text.clone(),
                confidence,
            })
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for FnRecognizer {
    fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(image, options)
    }

    fn detect_orientation(&self, _image: &GrayImage) -> Option<u32> {
        None
    }
}

// ── PDF page ─────────────────────────────────────────────────────────────────

/// A synthetic page. Its raster is white with a dark bar in the middle.
pub struct FakePage {
    pub text: Result<String, String>,
    pub images: usize,
    pub size: (f32, f32),
    pub renderable: bool,
    pub renders: AtomicUsize,
}

impl FakePage {
    pub fn new(text: &str, images: usize) -> Self {
        Self {
            text: Ok(text.to_string()),
            images,
            // wide and short keeps rasters small
            size: (200.0, 10.0),
            renderable: true,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn unrenderable(mut self) -> Self {
        self.renderable = false;
        self
    }
}

impl PageSource for FakePage {
    fn native_text(&self) -> Result<String, ExtractError> {
        self.text
            .clone()
            .map_err(|detail| ExtractError::RasterisationFailed { page: 1, detail })
    }

    fn embedded_image_count(&self) -> usize {
        self.images
    }

    fn size_points(&self) -> (f32, f32) {
        self.size
    }

    fn render(&self, scale: f32) -> Result<DynamicImage, ExtractError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if !self.renderable {
            return Err(ExtractError::RasterisationFailed {
                page: 1,
                detail: "broken content stream".into(),
            });
        }
        let w = ((self.size.0 * scale).round() as u32).max(1);
        let h = ((self.size.1 * scale).round() as u32).max(1);
        let img = GrayImage::from_fn(w, h, |x, y| {
            if y > h / 3 && y < 2 * h / 3 && x > w / 4 && x < 3 * w / 4 {
                Luma([20])
            } else {
                Luma([235])
            }
        });
        Ok(DynamicImage::ImageLuma8(img))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Default config with every external tool pointed at a path that does not
/// exist, so nothing shells out by accident.
pub fn offline_config() -> ExtractionConfig {
    let missing = PathBuf::from("/nonexistent/edgequake-test-tool");
    ExtractionConfig::builder()
        .ffmpeg(&missing)
        .ffprobe(&missing)
        .tesseract(&missing)
        .build()
        .unwrap()
}

/// PNG bytes of a `w`×`h` gray image.
pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = GrayImage::from_pixel(w, h, Luma([200]));
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Like [`png_bytes`] with a `pHYs` chunk declaring `dpi`.
pub fn png_bytes_at_dpi(w: u32, h: u32, dpi: u32) -> Vec<u8> {
    let ppm = (dpi as f64 / 0.0254).round() as u32;
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: ppm,
            yppu: ppm,
            unit: png::Unit::Meter,
        }));
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&vec![200u8; (w * h) as usize])
            .unwrap();
    }
    out
}

/// 16-bit PCM mono WAV containing a 440 Hz tone.
pub fn tone_wav(rate: u32, secs: f32) -> Vec<u8> {
    let frames = (rate as f32 * secs) as u32;
    let data_len = frames * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&rate.to_le_bytes());
    wav.extend_from_slice(&(rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let s = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
        wav.extend_from_slice(&s.to_le_bytes());
    }
    wav
}
