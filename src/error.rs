//! Error types for the donor-mailmerge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MailMergeError`] is **fatal**: the batch cannot proceed at all
//!   (template or logo missing, malformed CSV, merge failure). Returned as
//!   `Err(MailMergeError)` from the top-level `generate_*` functions.
//!
//! * [`RecordError`] is **non-fatal**: a single record failed (the converter
//!   exited non-zero, timed out) but every other record is fine. Stored inside
//!   [`crate::output::RecordResult`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad row.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the donor-mailmerge library.
#[derive(Debug, Error)]
pub enum MailMergeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A CSV file could be opened but not parsed.
    #[error("Malformed CSV '{path}': {detail}")]
    CsvParse { path: PathBuf, detail: String },

    /// The letter template does not exist.
    #[error("Template file '{path}' not found.\nPass the template as the last argument or use --template.")]
    TemplateNotFound { path: PathBuf },

    /// The template exists but is not a readable `.docx` package.
    #[error("Template '{path}' is not a valid .docx document: {detail}")]
    TemplateInvalid { path: PathBuf, detail: String },

    /// The envelope logo image does not exist or cannot be decoded.
    #[error("Logo image '{path}' could not be loaded: {detail}")]
    LogoUnavailable { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium failed while drawing or saving an envelope.
    #[error("Failed to render '{path}': {detail}")]
    RenderFailed { path: PathBuf, detail: String },

    /// A per-record PDF could not be appended to the combined document.
    #[error("Failed to merge '{path}' into the combined PDF: {detail}")]
    MergeFailed { path: PathBuf, detail: String },

    /// Some records succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchOutput::into_result`] when the caller
    /// wants to treat any record failure as an error.
    #[error("{failed}/{total} records failed")]
    PartialFailure {
        generated: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create an output directory or write an output file.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single record.
///
/// The batch continues; the record's PDF is simply absent from the combined
/// output.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordError {
    /// Writing the filled `.docx` failed.
    #[error("{record}: filling template failed: {detail}")]
    TemplateFill { record: String, detail: String },

    /// The converter process could not be spawned at all.
    #[error("{record}: could not start converter '{program}': {detail}")]
    ConverterUnavailable {
        record: String,
        program: String,
        detail: String,
    },

    /// The converter ran but reported failure.
    #[error("{record}: converter exited with {status}: {stderr}")]
    ConversionFailed {
        record: String,
        status: String,
        stderr: String,
    },

    /// The converter did not finish within the configured timeout and was killed.
    #[error("{record}: conversion timed out after {secs}s")]
    ConversionTimeout { record: String, secs: u64 },

    /// The converter exited successfully but produced no PDF.
    #[error("{record}: converter reported success but '{}' is missing", path.display())]
    OutputMissing { record: String, path: PathBuf },
}
