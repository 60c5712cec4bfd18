//! PDF cascade behaviour against synthetic pages.

mod common;

use common::{FakePage, FnRecognizer};
use edgequake_extract::cache::MemoCache;
use edgequake_extract::config::{OcrConfig, PdfConfig, RenderedPageStrategy};
use edgequake_extract::ocr::SegmentationMode;
use edgequake_extract::pdf::{assemble, PageTier, PdfCascade};
use edgequake_extract::{DocumentKind, OcrEngine, Recognition};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn engine(recognizer: Arc<FnRecognizer>) -> OcrEngine {
    OcrEngine::new(
        recognizer,
        OcrConfig::default(),
        MemoCache::disabled("recognition"),
    )
}

/// Answers by segmentation mode: `Auto` is the embedded-image tier,
/// `UniformBlock` the rendered-page tier.
fn by_mode(auto: &'static str, uniform: &'static str) -> Arc<FnRecognizer> {
    Arc::new(FnRecognizer::new(move |_, opts| {
        let text = match opts.segmentation_mode {
            SegmentationMode::Auto => auto,
            SegmentationMode::UniformBlock => uniform,
            _ => "",
        };
        Ok(Recognition {
            text: text.to_string(),
            confidence: 80.0,
        })
    }))
}

#[test]
fn native_text_short_circuits_ocr() {
    let rec = by_mode("scan", "render");
    let engine = engine(Arc::clone(&rec));
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let page = FakePage::new("  Nota fiscal \r\n\r\n\r\n\r\nTotal  ", 1);
    let out = cascade.extract_page(1, &page);
    assert_eq!(out.tier, Some(PageTier::Native));
    assert_eq!(out.text, "Nota fiscal\n\nTotal");
    assert_eq!(rec.call_count(), 0);
    assert_eq!(page.renders.load(Ordering::SeqCst), 0);
}

#[test]
fn one_or_two_images_use_full_page_ocr() {
    let rec = by_mode("scanned text", "render");
    let engine = engine(Arc::clone(&rec));
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    for images in [1, 2] {
        let out = cascade.extract_page(1, &FakePage::new("", images));
        assert_eq!(out.tier, Some(PageTier::EmbeddedImage), "{images} image(s)");
        assert_eq!(out.text, "scanned text");
    }
}

#[test]
fn many_images_skip_to_rendered_page() {
    let rec = by_mode("scanned text", "rendered text");
    let engine = engine(Arc::clone(&rec));
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let page = FakePage::new("", 5);
    let out = cascade.extract_page(3, &page);
    assert_eq!(out.page, 3);
    assert_eq!(out.tier, Some(PageTier::RenderedPage));
    assert_eq!(out.text, "rendered text");
    // tier 2 never rendered at 300 DPI
    assert_eq!(page.renders.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_embedded_ocr_falls_through_to_rendered_page() {
    let rec = by_mode("   ", "rendered text");
    let engine = engine(Arc::clone(&rec));
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let out = cascade.extract_page(1, &FakePage::new("", 1));
    assert_eq!(out.tier, Some(PageTier::RenderedPage));
}

#[test]
fn unreadable_page_gets_a_preview() {
    let rec = by_mode("", "");
    let engine = engine(rec);
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let out = cascade.extract_page(2, &FakePage::new("", 0));
    assert_eq!(out.tier, Some(PageTier::Preview));
    assert!(out.text.is_empty());
    let preview = out.preview.expect("preview attached");
    // base64 of the JPEG SOI marker
    assert!(preview.starts_with("/9j/"));
}

#[test]
fn render_failure_skips_the_page_without_failing() {
    let rec = by_mode("", "");
    let engine = engine(rec);
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let out = cascade.extract_page(4, &FakePage::new("", 1).unrenderable());
    assert_eq!(out.tier, None);
    assert!(out.text.is_empty());
    assert!(out.preview.is_none());
}

#[test]
fn budgeted_strategy_escalates_on_rendered_pages() {
    // Fast tier is weak, strong tier is confident.
    let rec = Arc::new(FnRecognizer::new(|_, opts| {
        Ok(match opts.segmentation_mode {
            SegmentationMode::UniformBlock => Recognition {
                text: "weak".into(),
                confidence: 20.0,
            },
            _ => Recognition {
                text: "strong".into(),
                confidence: 90.0,
            },
        })
    }));
    let engine = engine(rec);
    let config = PdfConfig {
        rendered_page_strategy: RenderedPageStrategy::Budgeted,
        ..PdfConfig::default()
    };
    let cascade = PdfCascade::new(&engine, &config);

    let out = cascade.extract_page(1, &FakePage::new("", 0));
    assert_eq!(out.tier, Some(PageTier::RenderedPage));
    assert_eq!(out.text, "strong");
}

#[test]
fn budgeted_page_prefers_native_text() {
    let rec = by_mode("", "");
    let engine = engine(Arc::clone(&rec));
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let native = cascade
        .ocr_page_budgeted(&FakePage::new("hello", 0))
        .unwrap();
    assert_eq!(native.text, "hello");
    assert_eq!(native.confidence, 100.0);
    assert!(native.raster.is_none());
    assert_eq!(rec.call_count(), 0);

    let scanned = cascade.ocr_page_budgeted(&FakePage::new("", 0)).unwrap();
    let raster = scanned.raster.expect("raster kept");
    assert_eq!(raster.width().max(raster.height()), 2000);
}

#[test]
fn document_assembly_keeps_page_order_and_previews() {
    let rec = by_mode("scan", "");
    let engine = engine(rec);
    let config = PdfConfig::default();
    let cascade = PdfCascade::new(&engine, &config);

    let pages = [
        FakePage::new("first", 0),
        FakePage::new("", 1),
        FakePage::new("", 0),
        FakePage::new("last", 0),
    ];
    let outcomes = pages
        .iter()
        .enumerate()
        .map(|(i, p)| cascade.extract_page(i + 1, p))
        .collect();
    let result = assemble(outcomes);

    assert_eq!(result.file_type, Some(DocumentKind::Pdf));
    assert_eq!(
        result.text.as_deref(),
        Some("Page 1:\nfirst\n\nPage 2:\nscan\n\nPage 4:\nlast")
    );
    assert_eq!(result.preview_images.len(), 1);
}
