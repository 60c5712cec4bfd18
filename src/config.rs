//! Configuration types for media extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Every stage reads its own sub-config
//! (`ocr`, `pdf`, `audio`, `video`, `fetch`, `cache`, `tools`) so a stage can
//! be constructed and tested in isolation with nothing but its slice of the
//! settings.
//!
//! External binaries are resolved from the environment by
//! [`ToolPaths::from_env`], which is what [`ExtractionConfig::default`] uses.

use crate::error::ExtractError;
use crate::fetch::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for every extraction pipeline.
///
/// # Example
/// ```rust
/// use edgequake_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .ocr_language("por+eng")
///     .time_budget_secs(4.0)
///     .confidence_target(75.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr.confidence_target, 75.0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub ocr: OcrConfig,
    pub pdf: PdfConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub tools: ToolPaths,
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// Settings for the budgeted image-OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Recognizer language string, `+`-joined. Default: `por+eng`.
    pub language: String,

    /// Wall-clock budget checked between escalation tiers. Default: 6.0 s.
    ///
    /// The check happens only *between* tiers, so a call can overrun the
    /// budget by at most the duration of one tier.
    pub time_budget_secs: f64,

    /// Mean word confidence (0–100) at which escalation stops. Default: 70.
    pub confidence_target: f32,

    /// DPI images are upscaled to before recognition. Default: 300.
    pub target_dpi: u32,

    /// DPI assumed when an image carries no density metadata. Default: 72.
    pub assumed_dpi: u32,

    /// Long-side cap applied before recognition. Default: 3000 px.
    pub max_long_side: u32,

    /// Long side to upscale toward when `allow_upscale` is set. Default: 2200 px.
    pub upscale_target_long_side: u32,

    /// Allow the long-side normaliser to enlarge small images. Default: false.
    pub allow_upscale: bool,

    /// Tiling limits for oversized or elongated images.
    pub tiling: TilingConfig,

    /// Extra recognizer flags appended to every call.
    pub extra_config: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "por+eng".to_string(),
            time_budget_secs: 6.0,
            confidence_target: 70.0,
            target_dpi: 300,
            assumed_dpi: 72,
            max_long_side: 3000,
            upscale_target_long_side: 2200,
            allow_upscale: false,
            tiling: TilingConfig::default(),
            extra_config: vec![
                "-c".to_string(),
                "load_system_dawg=0".to_string(),
                "-c".to_string(),
                "load_freq_dawg=0".to_string(),
            ],
        }
    }
}

/// Longest OCR budget the builder accepts.
pub const MAX_TIME_BUDGET_SECS: f64 = 86_400.0;

impl OcrConfig {
    /// `time_budget_secs` as a [`Duration`]. Negative or NaN values mean no
    /// budget at all, values too large to represent mean an unbounded one.
    pub fn time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_budget_secs).unwrap_or(
            if self.time_budget_secs > 0.0 {
                Duration::MAX
            } else {
                Duration::ZERO
            },
        )
    }
}

/// Limits that decide when and how an image is sliced into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Longest side accepted without tiling. Default: 7000 px.
    pub max_dim: u32,
    /// Stripe thickness along the long axis. Default: 2600 px.
    pub stripe: u32,
    /// Overlap between consecutive stripes. Default: 80 px.
    pub overlap: u32,
    /// Largest area accepted without tiling. Default: 64 MP.
    pub max_area: u64,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            max_dim: 7000,
            stripe: 2600,
            overlap: 80,
            max_area: 64_000_000,
        }
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// What the third cascade tier does with the rendered page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderedPageStrategy {
    /// A single fast-tier recognition pass. (default)
    #[default]
    FastOnly,
    /// The full budgeted ladder (fast → strong → tiles).
    Budgeted,
}

/// Settings for the per-page PDF cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Language for the embedded-image and rendered-page tiers. Default: `por`.
    pub language: String,
    /// DPI of the full-page pass in the embedded-image tier. Default: 300.
    pub embedded_image_dpi: u32,
    /// Pages with more embedded images than this skip tier 2. Default: 2.
    pub max_embedded_images: usize,
    /// Long side the rendered-page tier aims for. Default: 2000 px.
    pub render_target_long_side: u32,
    /// Hard cap on the rendered raster's long side. Default: 2800 px.
    pub render_max_long_side: u32,
    /// Long side of preview images. Default: 1024 px.
    pub preview_max_side: u32,
    /// JPEG quality of preview images. Default: 85.
    pub preview_jpeg_quality: u8,
    /// Tier-3 behaviour. Default: [`RenderedPageStrategy::FastOnly`].
    pub rendered_page_strategy: RenderedPageStrategy,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            language: "por".to_string(),
            embedded_image_dpi: 300,
            max_embedded_images: 2,
            render_target_long_side: 2000,
            render_max_long_side: 2800,
            preview_max_side: 1024,
            preview_jpeg_quality: 85,
            rendered_page_strategy: RenderedPageStrategy::default(),
        }
    }
}

// ── Audio ────────────────────────────────────────────────────────────────

/// Settings for the audio normalisation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sources quieter than this (mean dBFS) get loudnorm + denoise. Default: -35.0.
    pub gain_threshold_dbfs: f64,
    /// High-pass cutoff. Default: 80 Hz.
    pub highpass_hz: u32,
    /// Output sample rate. Default: 16000 Hz.
    pub sample_rate: u32,
    /// Output bitrate. Default: 64 kbps.
    pub bitrate_kbps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            gain_threshold_dbfs: -35.0,
            highpass_hz: 80,
            sample_rate: 16_000,
            bitrate_kbps: 64,
        }
    }
}

// ── Video ────────────────────────────────────────────────────────────────

/// What the sampler does when extracting one frame fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameFailurePolicy {
    /// Propagate the first failure; no frames are returned. (default)
    #[default]
    Abort,
    /// Log the failure and continue with the remaining timestamps.
    Skip,
}

/// Settings for the video frame sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// ffmpeg `-qscale:v` for frame captures (2–31, lower is better). Default: 3.
    pub jpeg_qscale: u8,
    /// Duration used when the probe reports nothing usable. Default: 3.0 s.
    pub assumed_duration_secs: f64,
    /// Distance of the last sample from the end. Default: 0.2 s.
    pub end_offset_secs: f64,
    /// Per-frame failure handling. Default: [`FrameFailurePolicy::Abort`].
    pub frame_failure: FrameFailurePolicy,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            jpeg_qscale: 3,
            assumed_duration_secs: 3.0,
            end_offset_secs: 0.2,
            frame_failure: FrameFailurePolicy::default(),
        }
    }
}

// ── Fetch / cache ────────────────────────────────────────────────────────

/// Settings for the content fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout. Default: 30 s.
    pub timeout_secs: u64,
    /// Retry policy for connection-level failures.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Eviction strategy for memoisation caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionKind {
    /// Least recently used. (default)
    #[default]
    Lru,
    /// Frequency-aware admission (moka's TinyLFU).
    TinyLfu,
}

/// Settings shared by every memoisation cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disable to make every lookup a miss. Default: true.
    pub enabled: bool,
    /// Maximum entries per cache. Default: 256.
    pub max_entries: u64,
    /// Time-to-live per entry; `None` keeps entries until evicted. Default: 1 h.
    pub ttl_secs: Option<u64>,
    /// Eviction strategy. Default: [`EvictionKind::Lru`].
    pub eviction: EvictionKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 256,
            ttl_secs: Some(3600),
            eviction: EvictionKind::default(),
        }
    }
}

// ── External tools ───────────────────────────────────────────────────────

/// Locations of external binaries and model files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    /// `FFMPEG_BIN`, default `ffmpeg`.
    pub ffmpeg: PathBuf,
    /// `FFPROBE_BIN`, default `ffprobe`.
    pub ffprobe: PathBuf,
    /// `TESSERACT_BIN`, default `tesseract`.
    pub tesseract: PathBuf,
    /// `RNNOISE_MODEL`, default `/usr/local/share/rnnoise-model.rnn`.
    pub rnnoise_model: PathBuf,
    /// `PDFIUM_LIB_PATH`; the system library is used when unset.
    pub pdfium_lib: Option<PathBuf>,
}

impl ToolPaths {
    /// Resolve every tool from its environment variable, falling back to the
    /// executable name on `PATH`.
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| -> PathBuf {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            ffmpeg: var("FFMPEG_BIN", "ffmpeg"),
            ffprobe: var("FFPROBE_BIN", "ffprobe"),
            tesseract: var("TESSERACT_BIN", "tesseract"),
            rnnoise_model: var("RNNOISE_MODEL", "/usr/local/share/rnnoise-model.rnn"),
            pdfium_lib: std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from_env()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn ocr_language(mut self, language: impl Into<String>) -> Self {
        self.config.ocr.language = language.into();
        self
    }

    pub fn pdf_language(mut self, language: impl Into<String>) -> Self {
        self.config.pdf.language = language.into();
        self
    }

    pub fn time_budget_secs(mut self, secs: f64) -> Self {
        self.config.ocr.time_budget_secs = if secs.is_nan() {
            0.0
        } else {
            secs.clamp(0.0, MAX_TIME_BUDGET_SECS)
        };
        self
    }

    pub fn confidence_target(mut self, target: f32) -> Self {
        self.config.ocr.confidence_target = target.clamp(0.0, 100.0);
        self
    }

    pub fn max_long_side(mut self, px: u32) -> Self {
        self.config.ocr.max_long_side = px.max(100);
        self
    }

    pub fn tiling(mut self, tiling: TilingConfig) -> Self {
        self.config.ocr.tiling = tiling;
        self
    }

    pub fn rendered_page_strategy(mut self, strategy: RenderedPageStrategy) -> Self {
        self.config.pdf.rendered_page_strategy = strategy;
        self
    }

    pub fn gain_threshold_dbfs(mut self, dbfs: f64) -> Self {
        self.config.audio.gain_threshold_dbfs = dbfs;
        self
    }

    pub fn frame_failure_policy(mut self, policy: FrameFailurePolicy) -> Self {
        self.config.video.frame_failure = policy;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch.timeout_secs = secs.max(1);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.fetch.retry = policy;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.ffmpeg = path.into();
        self
    }

    pub fn ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.ffprobe = path.into();
        self
    }

    pub fn tesseract(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.tesseract = path.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        let t = &c.ocr.tiling;
        if !(0.0..=MAX_TIME_BUDGET_SECS).contains(&c.ocr.time_budget_secs) {
            return Err(ExtractError::InvalidConfig(format!(
                "OCR time budget must be 0–{} s, got {}",
                MAX_TIME_BUDGET_SECS, c.ocr.time_budget_secs
            )));
        }
        if t.overlap >= t.stripe {
            return Err(ExtractError::InvalidConfig(format!(
                "tile overlap ({}) must be smaller than the stripe ({})",
                t.overlap, t.stripe
            )));
        }
        if t.max_dim == 0 || t.max_area == 0 {
            return Err(ExtractError::InvalidConfig(
                "tiling limits must be non-zero".into(),
            ));
        }
        if c.ocr.language.trim().is_empty() || c.pdf.language.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.fetch.retry.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "retry policy needs at least one attempt".into(),
            ));
        }
        if !(2..=31).contains(&c.video.jpeg_qscale) {
            return Err(ExtractError::InvalidConfig(format!(
                "frame qscale must be 2–31, got {}",
                c.video.jpeg_qscale
            )));
        }
        if c.cache.enabled && c.cache.max_entries == 0 {
            return Err(ExtractError::InvalidConfig(
                "an enabled cache needs max_entries ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
