//! The budgeted recognition ladder.
//!
//! ## Recognition permit
//!
//! The recognizer is not assumed to be re-entrant and is memory hungry, so
//! every recognition call in the process (orientation detection included)
//! holds [`RECOGNITION_PERMIT`] for its duration. Preparation work runs
//! outside the permit on the caller's thread.
//!
//! ## Failure handling
//!
//! A failed call is retried once on an 80 % Lanczos downscale. If that also
//! fails the attempt yields empty text with confidence 0 and the ladder moves
//! on. Nothing in here returns an error: the caller always receives the best
//! partial result.

use super::preprocess::{self, enhance_for_recognition, normalize_long_side, rotate_clockwise};
use super::tiling::{tile_boxes, TileBox};
use super::{
    EngineMode, OcrAttempt, OcrImage, OcrTier, Recognition, RecognitionKey, RecognitionOptions,
    Recognizer, SegmentationMode,
};
use crate::cache::MemoCache;
use crate::config::OcrConfig;
use image::GrayImage;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Process-wide single permit for recognition calls.
static RECOGNITION_PERMIT: Mutex<()> = Mutex::new(());

fn acquire_permit() -> MutexGuard<'static, ()> {
    RECOGNITION_PERMIT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scale used for the single retry of a failed call.
const RETRY_SCALE: f64 = 0.8;

/// Result of [`OcrEngine::recognize`].
#[derive(Debug, Clone, Default)]
pub struct OcrOutcome {
    pub text: String,
    pub confidence: f32,
    /// Tier that produced `text`; `None` when nothing ran.
    pub tier: Option<OcrTier>,
    /// Every attempt made, in ladder order.
    pub attempts: Vec<OcrAttempt>,
}

impl OcrOutcome {
    fn best_of(attempts: Vec<OcrAttempt>) -> Self {
        let best = attempts
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.confidence
                    .total_cmp(&b.confidence)
                    // ties go to the earlier attempt
                    .then(ib.cmp(ia))
            })
            .map(|(i, _)| i);
        match best {
            Some(i) => Self {
                text: attempts[i].text.clone(),
                confidence: attempts[i].confidence,
                tier: Some(attempts[i].tier),
                attempts,
            },
            None => Self::default(),
        }
    }
}

/// Budgeted OCR over an injected [`Recognizer`].
pub struct OcrEngine {
    recognizer: Arc<dyn Recognizer>,
    config: OcrConfig,
    cache: MemoCache<RecognitionKey, Recognition>,
}

impl OcrEngine {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        config: OcrConfig,
        cache: MemoCache<RecognitionKey, Recognition>,
    ) -> Self {
        Self {
            recognizer,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Recognise `image` with the full ladder, stopping once `confidence_target`
    /// is met or `time_budget` is spent.
    pub fn recognize(
        &self,
        image: &OcrImage,
        language: &str,
        time_budget: Duration,
        confidence_target: f32,
    ) -> OcrOutcome {
        let started = Instant::now();
        let prepared = self.prepare(image);
        let mut attempts = Vec::with_capacity(OcrTier::LADDER.len());

        for tier in OcrTier::LADDER {
            let attempt = match tier {
                OcrTier::Fast | OcrTier::Strong => self.whole_image(&prepared, tier, language),
                OcrTier::Tile => match self.tiled(&prepared, language, started, time_budget) {
                    Some(a) => a,
                    None => break,
                },
            };
            debug!(
                tier = ?attempt.tier,
                confidence = attempt.confidence,
                elapsed_ms = attempt.elapsed.as_millis() as u64,
                "ocr attempt"
            );

            let reached = attempt.confidence >= confidence_target;
            attempts.push(attempt);
            if reached {
                break;
            }
            if started.elapsed() > time_budget {
                debug!("OCR budget of {:?} spent after {:?}", time_budget, tier);
                break;
            }
        }

        let outcome = OcrOutcome::best_of(attempts);
        info!(
            "OCR finished: tier {:?}, confidence {:.1}, {} chars in {:?}",
            outcome.tier,
            outcome.confidence,
            outcome.text.len(),
            started.elapsed()
        );
        outcome
    }

    /// Recognise `image` with the configured defaults.
    pub fn recognize_default(&self, image: &OcrImage) -> OcrOutcome {
        self.recognize(
            image,
            &self.config.language,
            self.config.time_budget(),
            self.config.confidence_target,
        )
    }

    /// One preparation + one recognition pass in `mode`, no escalation.
    pub fn recognize_once(
        &self,
        image: &OcrImage,
        language: &str,
        mode: SegmentationMode,
    ) -> Recognition {
        let prepared = self.prepare(image);
        self.recognize_with_retry(&prepared, &self.options(mode, language))
    }

    /// Full preparation chain.
    pub fn prepare(&self, image: &OcrImage) -> GrayImage {
        let upscale = self
            .config
            .allow_upscale
            .then_some(self.config.upscale_target_long_side);
        let normalized = normalize_long_side(&image.image, self.config.max_long_side, upscale);

        // Scaling changes the effective density.
        let dpi = image.dpi.map(|dpi| {
            let scale = normalized.width() as f64 / image.image.width().max(1) as f64;
            ((dpi as f64) * scale).round().max(1.0) as u32
        });

        let gray = normalized.to_luma8();
        let oriented = self.fix_orientation(gray);
        enhance_for_recognition(oriented, dpi, &self.config)
    }

    fn fix_orientation(&self, image: GrayImage) -> GrayImage {
        let rotation = {
            let _permit = acquire_permit();
            self.recognizer.detect_orientation(&image)
        };
        match rotation {
            Some(deg) if deg % 360 != 0 => {
                debug!("Rotating image {} degrees clockwise", deg);
                rotate_clockwise(image, deg)
            }
            _ => image,
        }
    }

    fn options(&self, mode: SegmentationMode, language: &str) -> RecognitionOptions {
        RecognitionOptions {
            segmentation_mode: mode,
            engine_mode: EngineMode::LstmOnly,
            language: language.to_string(),
            extra_config: self.config.extra_config.clone(),
        }
    }

    fn whole_image(&self, prepared: &GrayImage, tier: OcrTier, language: &str) -> OcrAttempt {
        let started = Instant::now();
        let options = self.options(tier.segmentation_mode(), language);
        let rec = self.recognize_with_retry(prepared, &options);
        OcrAttempt {
            tile_box: TileBox::full(prepared.width(), prepared.height()),
            tier,
            text: rec.text,
            confidence: rec.confidence,
            elapsed: started.elapsed(),
        }
    }

    /// Tile tier. `None` when slicing yields a single tile, which the
    /// strong tier has already read.
    fn tiled(
        &self,
        prepared: &GrayImage,
        language: &str,
        ladder_started: Instant,
        budget: Duration,
    ) -> Option<OcrAttempt> {
        let boxes = tile_boxes(prepared.width(), prepared.height(), &self.config.tiling);
        if boxes.len() <= 1 {
            return None;
        }

        let started = Instant::now();
        let options = self.options(OcrTier::Tile.segmentation_mode(), language);
        let mut results = Vec::with_capacity(boxes.len());
        for (i, tile) in boxes.iter().enumerate() {
            if i > 0 && ladder_started.elapsed() > budget {
                debug!("OCR budget spent after {}/{} tiles", i, boxes.len());
                break;
            }
            let rec = self.recognize_with_retry(&tile.crop(prepared), &options);
            results.push((*tile, rec));
        }

        let (text, confidence) = join_tiles(results);
        Some(OcrAttempt {
            tile_box: TileBox::full(prepared.width(), prepared.height()),
            tier: OcrTier::Tile,
            text,
            confidence,
            elapsed: started.elapsed(),
        })
    }

    fn recognize_with_retry(&self, image: &GrayImage, options: &RecognitionOptions) -> Recognition {
        match self.recognize_cached(image, options) {
            Ok(rec) => rec,
            Err(first) => {
                warn!("Recognition failed ({}); retrying at 80%", first);
                let smaller = preprocess::downscale(image, RETRY_SCALE);
                match self.recognize_cached(&smaller, options) {
                    Ok(rec) => rec,
                    Err(second) => {
                        warn!("Recognition failed again ({}); using empty text", second);
                        Recognition::empty()
                    }
                }
            }
        }
    }

    fn recognize_cached(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, crate::error::RecognitionError> {
        let key = RecognitionKey::new(image, options);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let rec = {
            let _permit = acquire_permit();
            self.recognizer.recognize(image, options)?
        };
        self.cache.insert(key, rec.clone());
        Ok(rec)
    }
}

/// Join per-tile results in `(top, left)` order: trimmed non-empty texts
/// separated by newlines, confidence averaged over every tile read.
pub fn join_tiles(mut results: Vec<(TileBox, Recognition)>) -> (String, f32) {
    results.sort_by_key(|(b, _)| b.order_key());
    let confidence = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|(_, r)| r.confidence).sum::<f32>() / results.len() as f32
    };
    let text = results
        .iter()
        .map(|(_, r)| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (text, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognitionError;
    use image::{DynamicImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed confidence per segmentation mode and counts calls.
    struct ScriptedRecognizer {
        fast: f32,
        strong: f32,
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl ScriptedRecognizer {
        fn new(fast: f32, strong: f32) -> Self {
            Self {
                fast,
                strong,
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize(
            &self,
            image: &GrayImage,
            options: &RecognitionOptions,
        ) -> Result<Recognition, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(RecognitionError::Engine("scripted".into()));
            }
            let confidence = match options.segmentation_mode {
                SegmentationMode::UniformBlock => self.fast,
                _ => self.strong,
            };
            Ok(Recognition {
                text: format!("psm{} {}x{}", options.segmentation_mode.psm(), image.width(), image.height()),
                confidence,
            })
        }

        fn detect_orientation(&self, _image: &GrayImage) -> Option<u32> {
            None
        }
    }

    fn engine(rec: Arc<ScriptedRecognizer>) -> OcrEngine {
        OcrEngine::new(rec, OcrConfig::default(), MemoCache::disabled("test"))
    }

    fn page() -> OcrImage {
        OcrImage::with_dpi(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([200]))),
            300,
        )
    }

    #[test]
    fn confident_fast_tier_stops_the_ladder() {
        let rec = Arc::new(ScriptedRecognizer::new(95.0, 10.0));
        let out = engine(rec.clone()).recognize(&page(), "por", Duration::from_secs(60), 70.0);
        assert_eq!(out.tier, Some(OcrTier::Fast));
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn escalates_to_strong_and_returns_best() {
        let rec = Arc::new(ScriptedRecognizer::new(40.0, 65.0));
        let out = engine(rec).recognize(&page(), "por", Duration::from_secs(60), 70.0);
        // 200×100 is a single tile, so the ladder ends after the strong tier.
        assert_eq!(out.attempts.len(), 2);
        assert_eq!(out.tier, Some(OcrTier::Strong));
        assert_eq!(out.confidence, 65.0);
    }

    #[test]
    fn best_attempt_wins_even_if_later_tiers_are_worse() {
        let rec = Arc::new(ScriptedRecognizer::new(50.0, 30.0));
        let out = engine(rec).recognize(&page(), "por", Duration::from_secs(60), 70.0);
        assert_eq!(out.tier, Some(OcrTier::Fast));
        assert_eq!(out.confidence, 50.0);
    }

    #[test]
    fn spent_budget_stops_after_one_tier() {
        let mut scripted = ScriptedRecognizer::new(10.0, 10.0);
        scripted.delay = Duration::from_millis(5);
        let rec = Arc::new(scripted);
        let out = engine(rec.clone()).recognize(&page(), "por", Duration::from_millis(1), 70.0);
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_recognizer_is_retried_once_then_empty() {
        let mut scripted = ScriptedRecognizer::new(0.0, 0.0);
        scripted.fail = true;
        let rec = Arc::new(scripted);
        let out = engine(rec.clone()).recognize_once(&page(), "por", SegmentationMode::Auto);
        assert_eq!(out, Recognition::empty());
        assert_eq!(rec.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tiles_are_joined_in_reading_order() {
        let tb = |left, top| TileBox { left, top, right: left + 10, bottom: top + 10 };
        let r = |t: &str, c| Recognition { text: t.into(), confidence: c };
        let shuffled = vec![
            (tb(10, 10), r("d", 40.0)),
            (tb(0, 0), r("a", 80.0)),
            (tb(0, 10), r("c", 60.0)),
            (tb(10, 0), r("b", 20.0)),
        ];
        let (text, conf) = join_tiles(shuffled);
        assert_eq!(text, "a\nb\nc\nd");
        assert_eq!(conf, 50.0);
    }

    #[test]
    fn empty_tiles_count_toward_confidence_but_not_text() {
        let tb = |top| TileBox { left: 0, top, right: 10, bottom: top + 10 };
        let (text, conf) = join_tiles(vec![
            (tb(0), Recognition { text: "x".into(), confidence: 80.0 }),
            (tb(10), Recognition::empty()),
        ]);
        assert_eq!(text, "x");
        assert_eq!(conf, 40.0);
    }

    /// Weak on whole-image passes, reads tiles by call order and fails on
    /// any image at most `fail_at_or_below` pixels wide.
    struct StripeRecognizer {
        full_width: u32,
        fail_at_or_below: u32,
        tile_confidences: Vec<f32>,
        tile_calls: AtomicUsize,
        widths: Mutex<Vec<u32>>,
    }

    impl Recognizer for StripeRecognizer {
        fn recognize(
            &self,
            image: &GrayImage,
            options: &RecognitionOptions,
        ) -> Result<Recognition, RecognitionError> {
            self.widths.lock().unwrap().push(image.width());
            if options.segmentation_mode == SegmentationMode::UniformBlock {
                return Ok(Recognition { text: "fast".into(), confidence: 20.0 });
            }
            if image.width() == self.full_width {
                return Ok(Recognition { text: "strong".into(), confidence: 30.0 });
            }
            if image.width() <= self.fail_at_or_below {
                return Err(RecognitionError::Engine("unreadable stripe".into()));
            }
            let n = self.tile_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Recognition {
                text: format!("  tile{n}\n"),
                confidence: self.tile_confidences[n],
            })
        }

        fn detect_orientation(&self, _image: &GrayImage) -> Option<u32> {
            None
        }
    }

    #[test]
    fn tile_tier_runs_when_whole_image_passes_fall_short() {
        let rec = Arc::new(StripeRecognizer {
            full_width: 300,
            fail_at_or_below: 100,
            tile_confidences: vec![60.0, 90.0],
            tile_calls: AtomicUsize::new(0),
            widths: Mutex::new(Vec::new()),
        });
        let config = OcrConfig {
            // 300 px wide: stripes [0,120) [100,220) [200,300)
            tiling: crate::config::TilingConfig {
                max_dim: 100,
                stripe: 120,
                overlap: 20,
                max_area: 64_000_000,
            },
            ..OcrConfig::default()
        };
        let engine = OcrEngine::new(rec.clone(), config, MemoCache::disabled("test"));
        let image = OcrImage::with_dpi(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 60, Luma([200]))),
            300,
        );

        let out = engine.recognize(&image, "por", Duration::from_secs(60), 95.0);

        assert_eq!(out.attempts.len(), 3);
        assert_eq!(out.tier, Some(OcrTier::Tile));
        assert_eq!(out.text, "tile0\ntile1");
        // the failed third stripe counts as 0
        assert_eq!(out.confidence, 50.0);
        // fast, strong, two good stripes, the last stripe and its 80 % retry
        assert_eq!(*rec.widths.lock().unwrap(), vec![300, 300, 120, 120, 100, 80]);
    }

    #[test]
    fn prepared_image_is_binary() {
        let rec = Arc::new(ScriptedRecognizer::new(0.0, 0.0));
        let prepared = engine(rec).prepare(&page());
        assert!(prepared.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
