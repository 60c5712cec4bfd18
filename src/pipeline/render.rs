//! pdfium-backed [`PageSource`] and document loading.
//!
//! pdfium works on an in-memory byte slice here, so PDFs never need a
//! scratch file. The library is bound from `PDFIUM_LIB_PATH` (a file or the
//! directory containing it) when set, otherwise from the system search path.
//!
//! ## Why a visitor?
//!
//! `PdfPage` borrows its `PdfDocument`, which borrows the bindings and the
//! bytes. Handing pages to a closure keeps all three alive for exactly the
//! duration of the cascade without self-referential structs.

use crate::error::{ExtractError, Result};
use crate::pdf::PageSource;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Bind to pdfium, preferring an explicit library location.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            debug!("Binding pdfium from directory {}", path.display());
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => {
            debug!("Binding pdfium from {}", path.display());
            Pdfium::bind_to_library(path)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Open `bytes` as a PDF and hand every page, in order, to `visit` along
/// with its 1-based number. Returns the page count.
///
/// `label` identifies the document in errors (usually its URL).
pub fn for_each_page(
    pdfium: &Pdfium,
    bytes: &[u8],
    label: &str,
    mut visit: impl FnMut(usize, &dyn PageSource),
) -> Result<usize> {
    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ExtractError::ProtectedDocument { path: label.into() }
        } else {
            ExtractError::CorruptDocument {
                path: label.into(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    for (idx, page) in pages.iter().enumerate() {
        let source = PdfiumPage {
            page,
            number: idx + 1,
        };
        visit(idx + 1, &source);
    }
    Ok(total)
}

struct PdfiumPage<'a> {
    page: PdfPage<'a>,
    number: usize,
}

impl PageSource for PdfiumPage<'_> {
    fn native_text(&self) -> Result<String> {
        self.page
            .text()
            .map(|t| t.all())
            .map_err(|e| ExtractError::RasterisationFailed {
                page: self.number,
                detail: format!("{:?}", e),
            })
    }

    fn embedded_image_count(&self) -> usize {
        self.page
            .objects()
            .iter()
            .filter(|o| o.object_type() == PdfPageObjectType::Image)
            .count()
    }

    fn size_points(&self) -> (f32, f32) {
        (self.page.width().value, self.page.height().value)
    }

    fn render(&self, scale: f32) -> Result<DynamicImage> {
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = self.page.render_with_config(&config).map_err(|e| {
            ExtractError::RasterisationFailed {
                page: self.number,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {:.2}x → {}x{} px",
            self.number,
            scale,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
