//! [`MediaExtractor`]: one handle wiring every pipeline to shared caches.

use crate::audio::AudioNormalizer;
use crate::cache::PipelineCaches;
use crate::config::ExtractionConfig;
use crate::document::{validate_dispatch_table, DocumentExtractor};
use crate::error::Result;
use crate::fetch::{CachedFetcher, Fetcher, HttpFetcher};
use crate::ocr::tesseract::TesseractCli;
use crate::ocr::{OcrEngine, OcrImage, OcrTier, Recognizer};
use crate::output::{ExtractionResult, FrameSample, NormalizedAudio};
use crate::pipeline::input::Materializer;
use crate::probe::MediaProbe;
use crate::video::VideoSampler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Text read from a standalone image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageText {
    pub text: String,
    pub confidence: f32,
    /// Ladder step that produced `text`.
    pub tier: Option<OcrTier>,
}

/// Entry point for documents, images, audio and video.
///
/// Every method is synchronous and blocks on network, subprocess and OCR
/// work; use [`crate::batch::process_batch`] to run many items in parallel.
///
/// # Example
/// ```rust,no_run
/// use edgequake_extract::{ExtractionConfig, MediaExtractor};
///
/// let extractor = MediaExtractor::new(ExtractionConfig::default()).unwrap();
/// let result = extractor.extract_document("https://example.com/nota.pdf").unwrap();
/// println!("{}", result.text.unwrap_or_default());
/// ```
pub struct MediaExtractor {
    config: ExtractionConfig,
    caches: Arc<PipelineCaches>,
    fetcher: Arc<CachedFetcher>,
    engine: OcrEngine,
    audio: AudioNormalizer,
    video: VideoSampler,
}

impl MediaExtractor {
    /// Build with the HTTP fetcher and the tesseract binary from `config`.
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.fetch.timeout_secs),
            config.fetch.retry,
        )?;
        let recognizer = TesseractCli::new(&config.tools.tesseract);
        Self::with_components(config, Arc::new(fetcher), Arc::new(recognizer))
    }

    /// Build with an injected fetcher and recognizer.
    pub fn with_components(
        config: ExtractionConfig,
        fetcher: Arc<dyn Fetcher>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Result<Self> {
        validate_dispatch_table()?;

        let caches = Arc::new(PipelineCaches::new(&config.cache));
        let fetcher = Arc::new(CachedFetcher::new(fetcher, Arc::clone(&caches)));
        let materializer = Arc::new(Materializer::new(
            Arc::clone(&fetcher),
            Arc::clone(&caches),
        ));
        let probe = Arc::new(MediaProbe::new(
            &config.tools.ffmpeg,
            &config.tools.ffprobe,
            Arc::clone(&caches),
        ));

        let engine = OcrEngine::new(
            recognizer,
            config.ocr.clone(),
            caches.recognition.clone(),
        );
        let audio = AudioNormalizer::new(
            Arc::clone(&materializer),
            Arc::clone(&probe),
            Arc::clone(&caches),
            &config.tools.ffmpeg,
            &config.tools.rnnoise_model,
            config.audio.clone(),
        );
        let video = VideoSampler::new(
            materializer,
            probe,
            Arc::clone(&caches),
            &config.tools.ffmpeg,
            config.video.clone(),
        );

        debug!("MediaExtractor ready: {:?}", config.tools);
        Ok(Self {
            config,
            caches,
            fetcher,
            engine,
            audio,
            video,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn engine(&self) -> &OcrEngine {
        &self.engine
    }

    /// Extract text from a document URL, dispatching on its `Content-Type`.
    pub fn extract_document(&self, url: &str) -> Result<ExtractionResult> {
        self.caches
            .documents
            .get_or_try_insert(url.to_string(), || {
                let fetched = self.fetcher.fetch(url)?;
                let extractor = DocumentExtractor::new(
                    &self.engine,
                    &self.config.pdf,
                    self.config.tools.pdfium_lib.as_deref(),
                );
                let result = extractor.extract(url, &fetched);
                // The result is memoised; the raw bytes need not be.
                self.fetcher.invalidate(url);
                result
            })
    }

    /// Budgeted OCR of an image URL with the configured language, budget and
    /// confidence target.
    pub fn recognize_image(&self, url: &str) -> Result<ImageText> {
        let fetched = self.fetcher.fetch(url)?;
        self.fetcher.invalidate(url);
        let image = OcrImage::decode(&fetched.bytes)?;
        info!(
            "OCR of {} ({}x{}, {} dpi)",
            url,
            image.image.width(),
            image.image.height(),
            image.dpi.map_or_else(|| "unknown".to_string(), |d| d.to_string())
        );

        let outcome = self.engine.recognize_default(&image);
        Ok(ImageText {
            text: outcome.text,
            confidence: outcome.confidence,
            tier: outcome.tier,
        })
    }

    /// 16 kHz mono MP3 of the audio track of `url`.
    pub fn normalize_audio(
        &self,
        url: &str,
        use_vad: bool,
        delete_tmp: bool,
    ) -> Result<NormalizedAudio> {
        self.audio.normalize(url, use_vad, delete_tmp)
    }

    /// Representative frames of a video.
    pub fn sample_video(
        &self,
        url: &str,
        max_frames: usize,
        delete_tmp: bool,
    ) -> Result<Arc<Vec<FrameSample>>> {
        self.video.sample(url, max_frames, delete_tmp)
    }
}
