//! Document pipeline stages.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and a backend (pdfium, docx-rs, calamine) can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ (pdf cascade) ──▶ encode ──▶ postprocess
//! (fetch)   (pdfium)    (ocr / text)     (JPEG)     (cleanup)
//!       └─▶ office ─────────────────────────────────▶ postprocess
//! ```
//!
//! 1. [`input`]: materialise a fetched URL as a scratch file with
//!    scoped deletion
//! 2. [`render`]: bind pdfium and expose each page as a `PageSource`
//! 3. [`encode`]: JPEG preview thumbnails, base64-wrapped
//! 4. [`office`]: DOCX paragraphs and XLSX sheets as plain text
//! 5. [`postprocess`]: deterministic text-cleanup rules

pub mod encode;
pub mod input;
pub mod office;
pub mod postprocess;
pub mod render;
