//! Concatenate per-record PDFs into one combined document.
//!
//! Any input that cannot be opened aborts the whole merge: by the time we get
//! here every path has just been written by this process, so a failure means
//! something is badly wrong rather than one bad record.

use crate::error::MailMergeError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Append every PDF in `inputs`, in order, and save the result to `output`.
///
/// Returns the page count of the combined document.
pub fn merge_pdfs(
    pdfium: &Pdfium,
    inputs: &[PathBuf],
    output: &Path,
) -> Result<usize, MailMergeError> {
    let mut combined = pdfium
        .create_new_pdf()
        .map_err(|e| MailMergeError::MergeFailed {
            path: output.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    for path in inputs {
        let source = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| MailMergeError::MergeFailed {
                path: path.clone(),
                detail: format!("{:?}", e),
            })?;
        combined
            .pages_mut()
            .append(&source)
            .map_err(|e| MailMergeError::MergeFailed {
                path: path.clone(),
                detail: format!("{:?}", e),
            })?;
        debug!("Appended {}", path.display());
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MailMergeError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;
    }

    combined
        .save_to_file(output)
        .map_err(|e| MailMergeError::MergeFailed {
            path: output.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = combined.pages().len() as usize;
    info!(
        "Combined {} PDFs into {} ({} pages)",
        inputs.len(),
        output.display(),
        pages
    );
    Ok(pages)
}

/// Page count of an existing PDF.
pub fn page_count(pdfium: &Pdfium, path: &Path) -> Result<usize, MailMergeError> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| MailMergeError::MergeFailed {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;
    Ok(document.pages().len() as usize)
}
