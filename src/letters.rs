//! Letter batch: fill the thank-you template per member, convert each filled
//! document to PDF, then combine them.
//!
//! ## Concurrency
//!
//! Conversions dominate the run time (one office-suite process per letter),
//! so up to `concurrency` letters are in flight at once via
//! `buffer_unordered`. Template filling is synchronous zip work and runs on
//! the blocking pool. All tasks are joined before merging, and the combined
//! PDF is ordered by file name rather than completion order.

use crate::config::LetterConfig;
use crate::error::{MailMergeError, RecordError};
use crate::output::{BatchOutput, RecordOutcome, RecordResult, SkipReason};
use crate::pipeline::merge::merge_pdfs;
use crate::pipeline::office::OfficeConverter;
use crate::pipeline::records::{load_records, sort_records, KeyStyle, Record};
use crate::pipeline::resolve::{resolve_letter, LetterAddressee};
use crate::pipeline::template::{Replacements, Template};
use crate::pipeline::bind_pdfium;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Date format used for the `DATE` token, e.g. "March 04, 2025".
pub const DATE_FORMAT: &str = "%B %d, %Y";

/// One letter to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLetter {
    /// 1-based position in sorted order.
    pub index: usize,
    pub addressee: LetterAddressee,
    pub docx: PathBuf,
    /// A later record writes the same files; this one is skipped.
    pub superseded: bool,
}

/// Resolve every record into a letter and its filled-document path.
///
/// Records sharing a file stem would write the same `.docx` and PDF from
/// concurrent tasks, so only the last of them is converted.
pub fn plan_letters(records: &[Record], docx_dir: &Path) -> Vec<PlannedLetter> {
    let addressees: Vec<LetterAddressee> = records.iter().map(resolve_letter).collect();

    let mut owner: HashMap<&str, usize> = HashMap::new();
    for (i, addressee) in addressees.iter().enumerate() {
        if let Some(earlier) = owner.insert(addressee.file_stem.as_str(), i + 1) {
            warn!(
                "Records {} and {} share the file name '{}'; only the later letter is written",
                earlier,
                i + 1,
                addressee.file_stem
            );
        }
    }
    let last: Vec<bool> = addressees
        .iter()
        .enumerate()
        .map(|(i, a)| owner.get(a.file_stem.as_str()) == Some(&(i + 1)))
        .collect();

    addressees
        .into_iter()
        .zip(last)
        .enumerate()
        .map(|(i, (addressee, is_last))| PlannedLetter {
            index: i + 1,
            docx: docx_dir.join(format!("{}.docx", addressee.file_stem)),
            addressee,
            superseded: !is_last,
        })
        .collect()
}

/// Token values for one addressee.
pub fn replacements_for(addressee: &LetterAddressee, date: &str) -> Replacements {
    Replacements::new()
        .set("SALUTATION", addressee.salutation.as_str())
        .set("NAME", addressee.name.as_str())
        .set("ADDRESS", addressee.address_block.as_str())
        // The city line is already part of ADDRESS.
        .set("CITY_STATE_ZIP", "")
        .set("DATE", date)
        .set("AMOUNT", addressee.amount.as_str())
}

fn letter_date(config: &LetterConfig) -> String {
    match &config.date_override {
        Some(text) => text.clone(),
        None => chrono::Local::now().format(DATE_FORMAT).to_string(),
    }
}

/// Generate one filled `.docx` and one PDF per record and, unless disabled,
/// the combined letter PDF.
///
/// A letter whose conversion fails is recorded in the returned
/// [`BatchOutput`] and left out of the combined PDF; the rest of the batch
/// carries on.
///
/// # Errors
/// Fatal errors only: missing or invalid template, malformed CSV, output
/// directories that cannot be created, pdfium binding or merge failure.
pub async fn generate_letters(
    inputs: &[PathBuf],
    config: &LetterConfig,
) -> Result<BatchOutput, MailMergeError> {
    let start = Instant::now();
    let template = Template::open(&config.template_path)?;
    info!("Using template {}", template.path().display());

    for dir in [&config.docx_dir, &config.pdf_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| MailMergeError::OutputWriteFailed {
                path: dir.clone(),
                source: e,
            })?;
    }

    let loaded = load_records(inputs, KeyStyle::Normalized)?;
    let mut records = loaded.records;
    let key = sort_records(&mut records);
    info!("Loaded {} records, sorted by {:?}", records.len(), key);

    let plan = plan_letters(&records, &config.docx_dir);
    let total = plan.len();
    let date = letter_date(config);
    let converter = config.office_converter();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let results: Vec<RecordResult> = stream::iter(plan.into_iter().map(|letter| {
        let template = template.clone();
        let converter = converter.clone();
        let replacements = replacements_for(&letter.addressee, &date);
        let pdf_dir = config.pdf_dir.clone();
        let cb = config.progress_callback.clone();
        async move {
            process_letter(letter, total, template, replacements, converter, pdf_dir, cb).await
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    let mut output = BatchOutput::from_records(results, loaded.missing);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, output.stats.generated);
    }
    for failed in output.failures() {
        if let RecordOutcome::Failed { error } = &failed.outcome {
            warn!("Letter {} failed: {}", failed.index, error);
        }
    }

    let mut paths = output.generated_paths();
    paths.sort();
    paths.dedup();

    if !config.combine {
        debug!("Combined letter PDF disabled");
    } else if paths.is_empty() {
        warn!("No letters generated; combined PDF not written");
    } else {
        let combined_path = config.combined_path.clone();
        let target = combined_path.clone();
        let pages = tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium()?;
            merge_pdfs(&pdfium, &paths, &target)
        })
        .await
        .map_err(|e| MailMergeError::Internal(format!("Merge task panicked: {e}")))??;
        output.combined = Some(combined_path);
        output.combined_pages = pages;
    }

    output.stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Letters complete: {}/{} generated, {} failed, {}ms",
        output.stats.generated, total, output.stats.failed, output.stats.duration_ms
    );
    Ok(output)
}

async fn process_letter(
    letter: PlannedLetter,
    total: usize,
    template: Template,
    replacements: Replacements,
    converter: OfficeConverter,
    pdf_dir: PathBuf,
    cb: Option<ProgressCallback>,
) -> RecordResult {
    let label = letter.addressee.file_stem.clone();
    if letter.superseded {
        let reason = SkipReason::Superseded;
        if let Some(ref cb) = cb {
            cb.on_record_skipped(letter.index, total, &label, reason.describe());
        }
        return RecordResult {
            index: letter.index,
            label,
            outcome: RecordOutcome::Skipped { reason },
        };
    }
    if let Some(ref cb) = cb {
        cb.on_record_start(letter.index, total, &label);
    }

    let result = fill_and_convert(
        &label,
        &letter.docx,
        template,
        replacements,
        &converter,
        &pdf_dir,
    )
    .await;
    let outcome = match result {
        Ok(pdf) => {
            if let Some(ref cb) = cb {
                cb.on_record_complete(letter.index, total, &label);
            }
            RecordOutcome::Generated { pdf }
        }
        Err(error) => {
            if let Some(ref cb) = cb {
                cb.on_record_error(letter.index, total, &label, &error.to_string());
            }
            RecordOutcome::Failed { error }
        }
    };

    RecordResult {
        index: letter.index,
        label,
        outcome,
    }
}

async fn fill_and_convert(
    label: &str,
    docx: &Path,
    template: Template,
    replacements: Replacements,
    converter: &OfficeConverter,
    pdf_dir: &Path,
) -> Result<PathBuf, RecordError> {
    let fill_failed = |detail: String| RecordError::TemplateFill {
        record: label.to_string(),
        detail,
    };

    let target = docx.to_path_buf();
    tokio::task::spawn_blocking(move || template.fill_to_file(&replacements, &target))
        .await
        .map_err(|e| fill_failed(format!("fill task panicked: {e}")))?
        .map_err(|e| fill_failed(e.to_string()))?;

    converter.convert(label, docx, pdf_dir).await
}
