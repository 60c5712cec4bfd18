//! The per-page PDF text cascade.
//!
//! Each page climbs four tiers and stops at the first one that yields
//! non-empty text:
//!
//! | Tier | Source                    | When                                   |
//! |------|---------------------------|----------------------------------------|
//! | 1    | native text layer         | always                                 |
//! | 2    | 300 DPI full-page OCR     | page carries 1..=`max_embedded_images` |
//! | 3    | rendered grayscale raster | always                                 |
//! | 4    | JPEG preview              | nothing above produced text            |
//!
//! A page that exhausts every tier never fails the document: it contributes
//! a preview image (or nothing, if even rendering failed).
//!
//! The cascade works on the [`PageSource`] trait so it can be driven by
//! pdfium ([`crate::pipeline::render`]) or by test doubles.

use crate::config::{PdfConfig, RenderedPageStrategy};
use crate::document::DocumentKind;
use crate::error::Result;
use crate::ocr::{OcrEngine, OcrImage, SegmentationMode};
use crate::output::ExtractionResult;
use crate::pipeline::{encode, postprocess};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// One page of a PDF as the cascade sees it.
pub trait PageSource {
    /// Text of the native text layer (may be empty).
    fn native_text(&self) -> Result<String>;

    /// Number of image objects placed on the page.
    fn embedded_image_count(&self) -> usize;

    /// Page size in points (width, height).
    fn size_points(&self) -> (f32, f32);

    /// Render the page with `scale` pixels per point.
    fn render(&self, scale: f32) -> Result<DynamicImage>;
}

/// Which cascade tier produced a page's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageTier {
    Native,
    EmbeddedImage,
    RenderedPage,
    Preview,
}

/// Result of running the cascade on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    /// 1-based page number.
    pub page: usize,
    /// `None` when even rendering failed.
    pub tier: Option<PageTier>,
    /// Cleaned text; empty for preview pages.
    pub text: String,
    /// Base64 JPEG for preview pages.
    pub preview: Option<String>,
}

/// Result of [`PdfCascade::ocr_page_budgeted`].
#[derive(Debug, Clone)]
pub struct BudgetedPage {
    pub text: String,
    pub confidence: f32,
    /// The raster that was recognised; `None` for native text.
    pub raster: Option<GrayImage>,
}

/// Runs the cascade with a shared OCR engine.
pub struct PdfCascade<'a> {
    engine: &'a OcrEngine,
    config: &'a PdfConfig,
}

impl<'a> PdfCascade<'a> {
    pub fn new(engine: &'a OcrEngine, config: &'a PdfConfig) -> Self {
        Self { engine, config }
    }

    /// Run the four tiers on one page.
    pub fn extract_page(&self, page_no: usize, page: &dyn PageSource) -> PageOutcome {
        let outcome = |tier, text: String| PageOutcome {
            page: page_no,
            tier: Some(tier),
            text,
            preview: None,
        };

        // ── Tier 1: native text ──────────────────────────────────────────
        match page.native_text() {
            Ok(text) => {
                let text = postprocess::clean_text(&text);
                if !text.is_empty() {
                    debug!("Page {}: native text ({} chars)", page_no, text.len());
                    return outcome(PageTier::Native, text);
                }
            }
            Err(e) => warn!("Page {}: text layer unreadable: {}", page_no, e),
        }

        // ── Tier 2: pages that are a scan of one or two images ───────────
        let images = page.embedded_image_count();
        if (1..=self.config.max_embedded_images).contains(&images) {
            let dpi = self.config.embedded_image_dpi;
            match page.render(dpi as f32 / POINTS_PER_INCH) {
                Ok(raster) => {
                    let rec = self.engine.recognize_once(
                        &OcrImage::with_dpi(raster, dpi),
                        &self.config.language,
                        SegmentationMode::Auto,
                    );
                    let text = postprocess::clean_text(&rec.text);
                    if !text.is_empty() {
                        debug!("Page {}: embedded-image OCR ({} chars)", page_no, text.len());
                        return outcome(PageTier::EmbeddedImage, text);
                    }
                }
                Err(e) => warn!("Page {}: {} DPI render failed: {}", page_no, dpi, e),
            }
        }

        // ── Tier 3: rendered page OCR ────────────────────────────────────
        let (raster, dpi) = match self.render_for_ocr(page) {
            Ok(r) => r,
            Err(e) => {
                warn!("Page {}: render failed, page skipped: {}", page_no, e);
                return PageOutcome {
                    page: page_no,
                    tier: None,
                    text: String::new(),
                    preview: None,
                };
            }
        };
        let image = OcrImage::with_dpi(DynamicImage::ImageLuma8(raster.clone()), dpi);
        let text = match self.config.rendered_page_strategy {
            RenderedPageStrategy::FastOnly => {
                self.engine
                    .recognize_once(&image, &self.config.language, SegmentationMode::UniformBlock)
                    .text
            }
            RenderedPageStrategy::Budgeted => {
                let ocr = self.engine.config();
                self.engine
                    .recognize(
                        &image,
                        &self.config.language,
                        ocr.time_budget(),
                        ocr.confidence_target,
                    )
                    .text
            }
        };
        let text = postprocess::clean_text(&text);
        if !text.is_empty() {
            debug!("Page {}: rendered-page OCR ({} chars)", page_no, text.len());
            return outcome(PageTier::RenderedPage, text);
        }

        // ── Tier 4: preview image ────────────────────────────────────────
        let preview = encode::encode_preview(
            &DynamicImage::ImageLuma8(raster),
            self.config.preview_max_side,
            self.config.preview_jpeg_quality,
        );
        match preview {
            Ok(b64) => {
                debug!("Page {}: no text, preview attached", page_no);
                PageOutcome {
                    page: page_no,
                    tier: Some(PageTier::Preview),
                    text: String::new(),
                    preview: Some(b64),
                }
            }
            Err(e) => {
                warn!("Page {}: preview encoding failed: {}", page_no, e);
                PageOutcome {
                    page: page_no,
                    tier: None,
                    text: String::new(),
                    preview: None,
                }
            }
        }
    }

    /// Native text when present (confidence 100), otherwise the budgeted
    /// ladder on the rendered raster.
    pub fn ocr_page_budgeted(&self, page: &dyn PageSource) -> Result<BudgetedPage> {
        if let Ok(text) = page.native_text() {
            let text = postprocess::clean_text(&text);
            if !text.is_empty() {
                return Ok(BudgetedPage {
                    text,
                    confidence: 100.0,
                    raster: None,
                });
            }
        }

        let (raster, dpi) = self.render_for_ocr(page)?;
        let outcome = self.engine.recognize_default(&OcrImage::with_dpi(
            DynamicImage::ImageLuma8(raster.clone()),
            dpi,
        ));
        Ok(BudgetedPage {
            text: postprocess::clean_text(&outcome.text),
            confidence: outcome.confidence,
            raster: Some(raster),
        })
    }

    /// Grayscale raster aimed at `render_target_long_side`, never below half
    /// scale, with the long side capped at `render_max_long_side`. Returns
    /// the raster and its effective DPI.
    pub fn render_for_ocr(&self, page: &dyn PageSource) -> Result<(GrayImage, u32)> {
        let (w, h) = page.size_points();
        let zoom = render_zoom(
            w.max(h),
            self.config.render_target_long_side,
            self.config.render_max_long_side,
        );
        let gray = page.render(zoom)?.to_luma8();

        let cap = self.config.render_max_long_side;
        let long = gray.width().max(gray.height());
        let (gray, scale) = if long > cap {
            let s = cap as f64 / long as f64;
            let nw = ((gray.width() as f64 * s).round() as u32).max(1);
            let nh = ((gray.height() as f64 * s).round() as u32).max(1);
            (
                image::imageops::resize(&gray, nw, nh, FilterType::Lanczos3),
                s,
            )
        } else {
            (gray, 1.0)
        };

        let dpi = (POINTS_PER_INCH as f64 * zoom as f64 * scale).round().max(1.0) as u32;
        Ok((gray, dpi))
    }
}

/// `max(0.5, min(target/long, cap/long))`.
pub fn render_zoom(long_side_points: f32, target: u32, cap: u32) -> f32 {
    if long_side_points <= 0.0 {
        return 1.0;
    }
    let by_target = target as f32 / long_side_points;
    let by_cap = cap as f32 / long_side_points;
    by_target.min(by_cap).max(0.5)
}

/// Join page outcomes into the document result: `Page N:\n<text>` blocks
/// separated by blank lines, previews in page order.
pub fn assemble(mut pages: Vec<PageOutcome>) -> ExtractionResult {
    pages.sort_by_key(|p| p.page);
    let text = pages
        .iter()
        .filter(|p| !p.text.is_empty())
        .map(|p| format!("Page {}:\n{}", p.page, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let preview_images: Vec<String> = pages.iter().filter_map(|p| p.preview.clone()).collect();

    info!(
        "PDF assembled: {} pages, {} with text, {} previews",
        pages.len(),
        pages.iter().filter(|p| !p.text.is_empty()).count(),
        preview_images.len()
    );

    ExtractionResult {
        text: Some(text.trim().to_string()),
        file_type: Some(DocumentKind::Pdf),
        preview_images,
    }
}
