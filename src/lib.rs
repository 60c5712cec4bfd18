//! # edgequake-extract
//!
//! Turn heterogeneous media into text, images and speech-ready audio.
//!
//! ## What it does
//!
//! * **Documents**: PDF, DOCX, XLSX and plain text are dispatched on their
//!   `Content-Type`. PDFs go through a four-tier page cascade: the native
//!   text layer, OCR of pages with a few embedded images, OCR of the rendered
//!   page, and finally a JPEG preview when nothing could be read.
//! * **Images**: a budgeted OCR ladder (fast → strong → tiled) that stops as
//!   soon as the mean word confidence reaches the target or the time budget
//!   is spent, returning the best attempt so far.
//! * **Audio**: any audio or video URL becomes a 16 kHz mono 64 kbps MP3,
//!   with loudness normalisation and denoising for quiet sources and an
//!   in-process decode/encode fallback when ffmpeg fails.
//! * **Video**: JPEG frames at the start, middle and end.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Fetch        reqwest, retry on connection failure, memoised
//!  ├─ 2. Materialise  scratch file with scoped deletion (media only)
//!  ├─ 3. Extract      pdfium / docx-rs / calamine / tesseract / ffmpeg
//!  ├─ 4. Polish       deterministic text cleanup
//!  └─ 5. Output       ExtractionResult / ImageText / NormalizedAudio / FrameSample
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_extract::{ExtractionConfig, MediaExtractor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = MediaExtractor::new(ExtractionConfig::default())?;
//!
//!     let doc = extractor.extract_document("https://example.com/nota.pdf")?;
//!     println!("{}", doc.text.unwrap_or_default());
//!
//!     let audio = extractor.normalize_audio("https://example.com/voz.ogg", false, true)?;
//!     eprintln!("{}: {:.1}s", audio.file_name, audio.duration_seconds);
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! | Variable | Default | Used by |
//! |----------|---------|---------|
//! | `FFMPEG_BIN` | `ffmpeg` | audio, video |
//! | `FFPROBE_BIN` | `ffprobe` | audio, video |
//! | `TESSERACT_BIN` | `tesseract` | PDF and image OCR |
//! | `RNNOISE_MODEL` | `/usr/local/share/rnnoise-model.rnn` | denoise of quiet audio |
//! | `PDFIUM_LIB_PATH` | system library | PDF |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mediaextract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audio;
pub mod batch;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod ocr;
pub mod output;
pub mod pdf;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod video;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audio::{accumulate_mp3, mp3_duration, mp3_to_data_uri, Mp3Source};
pub use batch::{process_batch, JobOutput, JobResult, MediaJob};
pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, FrameFailurePolicy, RenderedPageStrategy,
};
pub use document::DocumentKind;
pub use error::{ExtractError, RecognitionError};
pub use extractor::{ImageText, MediaExtractor};
pub use fetch::{Fetched, Fetcher, RetryPolicy};
pub use ocr::{OcrEngine, OcrImage, OcrOutcome, OcrTier, Recognition, Recognizer};
pub use output::{AudioProfile, ExtractionResult, FrameSample, NormalizedAudio};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
