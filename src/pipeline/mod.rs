//! Pipeline stages shared by the envelope and letter batches.
//!
//! Each submodule implements exactly one transformation step, so every step
//! is testable on its own and the two batches differ only in which stages
//! they chain together.
//!
//! ## Data Flow
//!
//! ```text
//! records ──▶ resolve ──▶ layout ──▶ envelope ──────────────▶ merge
//!  (CSV)       (fields)    (mm)       (pdfium page)             (pdfium)
//!                 └──────▶ template ──▶ office ───────────────▶ merge
//!                          (.docx)      (headless converter)
//! ```
//!
//! 1. [`records`]: read CSV files into field-keyed records and sort them
//! 2. [`resolve`]: derive names, address lines, category and salutation
//! 3. [`layout`]: fixed envelope coordinates and Helvetica text metrics
//! 4. [`envelope`]: draw one envelope page; runs on a blocking thread
//!    because pdfium is not async-safe
//! 5. [`template`]: fill placeholder tokens in a `.docx` letter template
//! 6. [`office`]: convert a filled letter to PDF with an external process
//! 7. [`merge`]: concatenate per-record PDFs into the combined output

pub mod envelope;
pub mod layout;
pub mod merge;
pub mod office;
pub mod records;
pub mod resolve;
pub mod template;

use crate::error::MailMergeError;
use pdfium_render::prelude::Pdfium;

/// Bind to the pdfium library, downloading it on first use.
///
/// `PDFIUM_LIB_PATH` selects an existing copy instead.
pub fn bind_pdfium() -> Result<Pdfium, MailMergeError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| MailMergeError::PdfiumBindingFailed(e.to_string()))
}
