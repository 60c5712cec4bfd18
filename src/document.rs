//! Document dispatch: `Content-Type` → extractor.
//!
//! Dispatch goes through the exhaustive [`DocumentKind`] enum, so adding a
//! kind without an extractor is a compile error. [`validate_dispatch_table`]
//! additionally checks at engine construction that every kind round-trips
//! through its canonical MIME type.

use crate::config::PdfConfig;
use crate::error::{ExtractError, Result};
use crate::fetch::Fetched;
use crate::ocr::OcrEngine;
use crate::output::ExtractionResult;
use crate::pdf::{self, PdfCascade};
use crate::pipeline::{office, postprocess, render};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Every document family the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Xlsx,
    #[serde(rename = "txt")]
    PlainText,
    Image,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Pdf,
        DocumentKind::Docx,
        DocumentKind::Xlsx,
        DocumentKind::PlainText,
        DocumentKind::Image,
    ];

    /// Classify a `Content-Type` header value. Parameters are ignored and
    /// the comparison is case-insensitive.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentKind::Docx)
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(DocumentKind::Xlsx)
            }
            "text/plain" => Some(DocumentKind::PlainText),
            m if m.starts_with("image/") => Some(DocumentKind::Image),
            _ => None,
        }
    }

    /// The MIME type this kind is published under.
    pub fn canonical_mime(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            DocumentKind::PlainText => "text/plain",
            DocumentKind::Image => "image/png",
        }
    }

    /// Short tag used in results and logs.
    pub fn tag(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::PlainText => "txt",
            DocumentKind::Image => "image",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Check that every kind is reachable from its own canonical MIME type.
pub fn validate_dispatch_table() -> Result<()> {
    for kind in DocumentKind::ALL {
        let mime = kind.canonical_mime();
        if DocumentKind::from_content_type(mime) != Some(kind) {
            return Err(ExtractError::InvalidConfig(format!(
                "dispatch table does not map '{mime}' back to {kind:?}"
            )));
        }
    }
    Ok(())
}

/// Routes fetched documents to their extractor.
pub struct DocumentExtractor<'a> {
    engine: &'a OcrEngine,
    pdf: &'a PdfConfig,
    pdfium_lib: Option<&'a Path>,
}

impl<'a> DocumentExtractor<'a> {
    pub fn new(engine: &'a OcrEngine, pdf: &'a PdfConfig, pdfium_lib: Option<&'a Path>) -> Self {
        Self {
            engine,
            pdf,
            pdfium_lib,
        }
    }

    /// Extract text from already fetched content. `label` names the source
    /// in logs and errors.
    pub fn extract(&self, label: &str, fetched: &Fetched) -> Result<ExtractionResult> {
        let content_type = fetched.content_type().unwrap_or_default();
        let Some(kind) = DocumentKind::from_content_type(content_type) else {
            warn!("Unsupported content type '{}' for {}", content_type, label);
            return Ok(ExtractionResult::unsupported());
        };
        info!("Extracting {} as {}", label, kind);

        let bytes = fetched.bytes.as_slice();
        let result = match kind {
            DocumentKind::Pdf => self.extract_pdf(label, bytes)?,
            DocumentKind::Docx => {
                ExtractionResult::text(kind, postprocess::clean_text(&office::docx_text(bytes)))
            }
            DocumentKind::Xlsx => {
                ExtractionResult::text(kind, postprocess::clean_text(&office::xlsx_text(bytes)))
            }
            // passed through as decoded, without cleanup
            DocumentKind::PlainText => {
                ExtractionResult::text(kind, String::from_utf8_lossy(bytes).into_owned())
            }
            DocumentKind::Image => ExtractionResult::text(kind, ""),
        };
        Ok(result)
    }

    /// Run the page cascade over every page of a PDF.
    pub fn extract_pdf(&self, label: &str, bytes: &[u8]) -> Result<ExtractionResult> {
        let pdfium = render::bind_pdfium(self.pdfium_lib)?;
        let cascade = PdfCascade::new(self.engine, self.pdf);
        let mut pages = Vec::new();
        render::for_each_page(&pdfium, bytes, label, |page_no, page| {
            pages.push(cascade.extract_page(page_no, page));
        })?;
        Ok(pdf::assemble(pages))
    }
}
