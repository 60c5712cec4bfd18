//! MediaExtractor wiring with fake fetcher and recognizer; no network, no
//! external tools.

mod common;

use common::{offline_config, png_bytes, png_bytes_at_dpi, tone_wav, FakeFetcher, FnRecognizer};
use edgequake_extract::config::FrameFailurePolicy;
use edgequake_extract::{
    DocumentKind, ExtractError, ExtractionConfig, MediaExtractor, OcrTier, Recognition,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn extractor_with(
    config: ExtractionConfig,
    fetcher: Arc<FakeFetcher>,
    recognizer: Arc<FnRecognizer>,
) -> MediaExtractor {
    MediaExtractor::with_components(config, fetcher, recognizer).unwrap()
}

fn extractor(fetcher: Arc<FakeFetcher>) -> MediaExtractor {
    extractor_with(
        offline_config(),
        fetcher,
        Arc::new(FnRecognizer::constant("", 0.0)),
    )
}

// ── Documents ────────────────────────────────────────────────────────────────

#[test]
fn plain_text_is_passed_through_unchanged() {
    let body = "\u{FEFF}Recibo   \r\n\r\n\r\n\r\nValor: 10\n";
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/a.txt",
        body,
        "Text/Plain; charset=utf-8",
    ));
    let ex = extractor(fetcher);

    let r = ex.extract_document("https://x/a.txt").unwrap();
    assert_eq!(r.file_type, Some(DocumentKind::PlainText));
    assert_eq!(r.text.as_deref(), Some(body));
    assert!(r.preview_images.is_empty());
}

#[test]
fn unknown_content_type_is_unsupported_not_an_error() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/a.zip",
        vec![0u8; 16],
        "application/zip",
    ));
    let r = extractor(fetcher).extract_document("https://x/a.zip").unwrap();
    assert!(!r.is_supported());
    assert_eq!(r.text, None);
    assert_eq!(r.file_type, None);
}

#[test]
fn image_documents_carry_no_text() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/a.jpg",
        png_bytes(4, 4),
        "image/jpeg",
    ));
    let r = extractor(fetcher).extract_document("https://x/a.jpg").unwrap();
    assert_eq!(r.file_type, Some(DocumentKind::Image));
    assert_eq!(r.text.as_deref(), Some(""));
}

#[test]
fn docx_paragraphs_are_extracted() {
    use docx_rs::{Docx, Paragraph, Run};

    let mut buf = Cursor::new(Vec::new());
    Docx::new()
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Contrato de locação")))
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Prazo: 12 meses")))
        .build()
        .pack(&mut buf)
        .unwrap();

    let fetcher = Arc::new(FakeFetcher::default().with("https://x/c.docx", buf.into_inner(), DOCX));
    let r = extractor(fetcher).extract_document("https://x/c.docx").unwrap();
    assert_eq!(r.file_type, Some(DocumentKind::Docx));
    assert_eq!(
        r.text.as_deref(),
        Some("Contrato de locação\nPrazo: 12 meses")
    );
}

#[test]
fn xlsx_sheets_are_rendered_under_headers() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/inventario.xlsx",
        include_bytes!("fixtures/inventario.xlsx").to_vec(),
        XLSX,
    ));
    let r = extractor(fetcher)
        .extract_document("https://x/inventario.xlsx")
        .unwrap();
    assert_eq!(r.file_type, Some(DocumentKind::Xlsx));
    assert_eq!(
        r.text.as_deref(),
        Some(
            "Sheet: Estoque\n\
             Item      Qty\n\
             Parafuso  12\n\
             Porca     3.5\n\
             \n\
             Sheet: Preços\n\
             Item   R$\n\
             Porca  0.25"
        )
    );
}

#[test]
fn document_results_are_memoised() {
    let fetcher = Arc::new(FakeFetcher::default().with("https://x/a.txt", "hi", "text/plain"));
    let ex = extractor(Arc::clone(&fetcher));

    let first = ex.extract_document("https://x/a.txt").unwrap();
    let second = ex.extract_document("https://x/a.txt").unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.calls("https://x/a.txt"), 1);
}

#[test]
fn fetch_failures_propagate() {
    let ex = extractor(Arc::new(FakeFetcher::default()));
    let err = ex.extract_document("https://x/missing.pdf").unwrap_err();
    assert!(matches!(err, ExtractError::FetchStatus { status: 404, .. }));
}

// ── Images ───────────────────────────────────────────────────────────────────

#[test]
fn confident_image_stops_at_fast_tier() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/nota.png",
        png_bytes(64, 32),
        "image/png",
    ));
    let recognizer = Arc::new(FnRecognizer::constant("Total R$ 10,00", 91.0));
    let ex = extractor_with(offline_config(), fetcher, Arc::clone(&recognizer));

    let out = ex.recognize_image("https://x/nota.png").unwrap();
    assert_eq!(out.text, "Total R$ 10,00");
    assert_eq!(out.confidence, 91.0);
    assert_eq!(out.tier, Some(OcrTier::Fast));
    assert_eq!(recognizer.call_count(), 1);
}

#[test]
fn declared_dpi_decides_whether_an_image_is_upscaled() {
    let fetcher = Arc::new(
        FakeFetcher::default()
            .with("https://x/scan300.png", png_bytes_at_dpi(64, 32, 300), "image/png")
            .with("https://x/scan.png", png_bytes(64, 32), "image/png"),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sizes = Arc::clone(&seen);
    let recognizer = Arc::new(FnRecognizer::new(move |image, _| {
        sizes.lock().unwrap().push(image.dimensions());
        Ok(Recognition {
            text: "ok".into(),
            confidence: 90.0,
        })
    }));
    let ex = extractor_with(offline_config(), fetcher, recognizer);

    ex.recognize_image("https://x/scan300.png").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(64, 32)]);

    // no density header: assumed 72 dpi, upscaled toward 300
    ex.recognize_image("https://x/scan.png").unwrap();
    assert_eq!(seen.lock().unwrap()[1], (267, 133));
}

#[test]
fn undecodable_image_is_an_error() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/bad.png",
        b"not an image".to_vec(),
        "image/png",
    ));
    let err = extractor(fetcher).recognize_image("https://x/bad.png").unwrap_err();
    assert!(matches!(err, ExtractError::Image(_)));
}

// ── Audio ────────────────────────────────────────────────────────────────────

#[test]
fn missing_ffmpeg_falls_back_to_in_process_transcode() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/tone.wav?sig=abc",
        tone_wav(44_100, 0.5),
        "audio/wav",
    ));
    let ex = extractor(Arc::clone(&fetcher));

    let audio = ex
        .normalize_audio("https://x/tone.wav?sig=abc", false, true)
        .unwrap();
    assert_eq!(audio.file_name, "tone.mp3");
    assert!((audio.duration_seconds - 0.5).abs() < 0.01);
    assert!(audio.mp3.windows(2).any(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0));

    // memoised per (url, vad, delete_tmp)
    ex.normalize_audio("https://x/tone.wav?sig=abc", false, true)
        .unwrap();
    assert_eq!(fetcher.calls("https://x/tone.wav?sig=abc"), 1);
}

#[test]
fn retained_input_is_reused_without_refetching() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/keep.wav",
        tone_wav(16_000, 0.25),
        "audio/wav",
    ));
    let ex = extractor(Arc::clone(&fetcher));

    ex.normalize_audio("https://x/keep.wav", false, false).unwrap();
    // different memo key, same retained file
    ex.normalize_audio("https://x/keep.wav", true, false).unwrap();
    assert_eq!(fetcher.calls("https://x/keep.wav"), 1);
}

#[test]
fn undecodable_audio_fails_after_fallback() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/noise.bin",
        vec![0x42u8; 512],
        "application/octet-stream",
    ));
    let err = extractor(fetcher)
        .normalize_audio("https://x/noise.bin", false, true)
        .unwrap_err();
    assert!(matches!(err, ExtractError::AudioDecode(_)));
}

// ── Video ────────────────────────────────────────────────────────────────────

#[test]
fn frame_failures_abort_by_default() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/v.mp4",
        vec![0u8; 64],
        "video/mp4",
    ));
    let result = extractor(fetcher).sample_video("https://x/v.mp4", 3, true);
    assert!(result.is_err());
}

#[test]
fn frame_failures_can_be_skipped() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        "https://x/v.mp4",
        vec![0u8; 64],
        "video/mp4",
    ));
    let mut config = offline_config();
    config.video.frame_failure = FrameFailurePolicy::Skip;
    let ex = extractor_with(config, fetcher, Arc::new(FnRecognizer::constant("", 0.0)));

    let frames = ex.sample_video("https://x/v.mp4", 3, true).unwrap();
    assert!(frames.is_empty());
}
