//! Error types for the edgequake-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal for one media item**: the item cannot be
//!   processed at all (fetch failed, PDF is password protected, the source has
//!   no audio track). Returned as `Err(ExtractError)` from the top-level
//!   pipeline functions.
//!
//! * [`RecognitionError`]: **Non-fatal**: a single OCR tile could not be
//!   recognised. The engine retries it once at reduced resolution and, if that
//!   still fails, the tile contributes empty text while the rest of the image
//!   is still read.
//!
//! An unsupported content type is not an error value at all: the dispatcher
//! returns an empty [`crate::output::ExtractionResult`] and logs a warning.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// Connection-level failure that survived every retry attempt.
    #[error("Failed to fetch '{url}' after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Server answered with a non-2xx status. Never retried.
    #[error("Fetching '{url}' returned HTTP {status}")]
    FetchStatus { url: String, status: u16 },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF requires a password; no page is processed.
    #[error("PDF is password protected: '{path}'")]
    ProtectedDocument { path: PathBuf },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// pdfium could not render or read a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Media errors ──────────────────────────────────────────────────────
    /// The source file has no audio stream. Fatal for the audio pipeline.
    #[error("Media file '{path}' has no audio stream")]
    NoAudioStream { path: PathBuf },

    /// An external binary exited with a non-zero status.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolExecution {
        tool: String,
        status: String,
        stderr: String,
    },

    /// An external binary could not be started at all.
    #[error("Failed to start '{tool}': {source}\nInstall it or point the matching *_BIN variable at it.")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool output could not be interpreted (e.g. a non-numeric duration).
    #[error("Unexpected output from {tool}: {detail}")]
    ToolOutput { tool: String, detail: String },

    /// The decode-library fallback could not decode the audio.
    #[error("Audio decode failed: {0}")]
    AudioDecode(String),

    /// The MP3 encoder rejected its configuration or input.
    #[error("MP3 encoding failed: {0}")]
    AudioEncode(String),

    // ── OCR / imaging errors ──────────────────────────────────────────────
    /// Whole-image recognition failed (not a single tile).
    #[error("Recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    /// Image decoding or encoding failed.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    // ── I/O and setup ─────────────────────────────────────────────────────
    /// Scratch-file or read/write failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal recognition failure for one image or tile.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RecognitionError {
    /// The recognizer process failed.
    #[error("recognizer failed: {0}")]
    Engine(String),

    /// The recognizer ran but its output could not be parsed.
    #[error("unreadable recognizer output: {0}")]
    Output(String),

    /// The tile could not be handed to the recognizer.
    #[error("could not prepare tile: {0}")]
    Input(String),
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
