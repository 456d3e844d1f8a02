//! Envelope batch: one printed #10 envelope per member with a street address.
//!
//! Rendering is sequential on a single blocking thread. pdfium holds global
//! state and is not `Send`, so the binding, every render and the final merge
//! all happen inside one `spawn_blocking` call.

use crate::config::EnvelopeConfig;
use crate::error::MailMergeError;
use crate::output::{BatchOutput, RecordOutcome, RecordResult, SkipReason};
use crate::pipeline::envelope::{load_logo, EnvelopeRenderer};
use crate::pipeline::merge::merge_pdfs;
use crate::pipeline::records::{
    load_records, sort_records, KeyStyle, Record, ACCOUNT_NAME, FIRST_NAME, LAST_NAME,
};
use crate::pipeline::resolve::{resolve_envelope, sanitize_file_stem, EnvelopeAddressee};
use crate::pipeline::bind_pdfium;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// What to do with one sorted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopePlan {
    Render {
        addressee: EnvelopeAddressee,
        output: PathBuf,
    },
    Skip {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEnvelope {
    /// 1-based position in sorted order.
    pub index: usize,
    pub label: String,
    pub plan: EnvelopePlan,
}

/// Decide, without touching the filesystem, which records get an envelope
/// and where each PDF goes.
///
/// When several records map to the same file, only the last one renders; the
/// earlier ones are skipped as [`SkipReason::Superseded`].
pub fn plan_envelopes(records: &[Record], output_dir: &Path) -> Vec<PlannedEnvelope> {
    let resolved: Vec<Option<(EnvelopeAddressee, String)>> = records
        .iter()
        .map(|record| {
            resolve_envelope(record).map(|addressee| {
                let file_name =
                    format!("{}_Envelope.pdf", sanitize_file_stem(&addressee.file_label));
                (addressee, file_name)
            })
        })
        .collect();

    let mut owner: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in resolved.iter().enumerate() {
        if let Some((_, file_name)) = entry {
            if let Some(earlier) = owner.insert(file_name.as_str(), i + 1) {
                warn!(
                    "Records {} and {} both map to {}; the later one overwrites it",
                    earlier,
                    i + 1,
                    file_name
                );
            }
        }
    }

    records
        .iter()
        .zip(&resolved)
        .enumerate()
        .map(|(i, (record, entry))| {
            let index = i + 1;
            match entry {
                Some((addressee, file_name)) if owner.get(file_name.as_str()) == Some(&index) => {
                    PlannedEnvelope {
                        index,
                        label: addressee.file_label.clone(),
                        plan: EnvelopePlan::Render {
                            output: output_dir.join(file_name),
                            addressee: addressee.clone(),
                        },
                    }
                }
                Some((addressee, _)) => PlannedEnvelope {
                    index,
                    label: addressee.file_label.clone(),
                    plan: EnvelopePlan::Skip {
                        reason: SkipReason::Superseded,
                    },
                },
                None => PlannedEnvelope {
                    index,
                    label: record_label(record, index),
                    plan: EnvelopePlan::Skip {
                        reason: SkipReason::MissingStreetAddress,
                    },
                },
            }
        })
        .collect()
}

fn record_label(record: &Record, index: usize) -> String {
    let account = record.text(ACCOUNT_NAME);
    if !account.is_empty() {
        return account.to_string();
    }
    let name = format!("{} {}", record.text(FIRST_NAME), record.text(LAST_NAME));
    match name.trim() {
        "" => format!("record {index}"),
        n => n.to_string(),
    }
}

/// Generate one envelope PDF per record and, unless disabled, the combined
/// envelope PDF.
///
/// # Errors
/// Fatal errors only: malformed CSV, missing or undecodable logo, pdfium
/// binding or render failure, merge failure. Records without a street
/// address are reported as skipped in the returned [`BatchOutput`].
pub async fn generate_envelopes(
    inputs: &[PathBuf],
    config: &EnvelopeConfig,
) -> Result<BatchOutput, MailMergeError> {
    let start = Instant::now();
    let loaded = load_records(inputs, KeyStyle::Verbatim)?;
    let mut records = loaded.records;
    let key = sort_records(&mut records);
    info!("Loaded {} records, sorted by {:?}", records.len(), key);

    let plan = plan_envelopes(&records, &config.output_dir);
    let config = config.clone();

    let (results, combined) = tokio::task::spawn_blocking(move || render_batch(plan, &config))
        .await
        .map_err(|e| MailMergeError::Internal(format!("Envelope task panicked: {e}")))??;

    let mut output = BatchOutput::from_records(results, loaded.missing);
    if let Some((path, pages)) = combined {
        output.combined = Some(path);
        output.combined_pages = pages;
    }
    output.stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Envelopes complete: {} generated, {} skipped, {}ms",
        output.stats.generated, output.stats.skipped, output.stats.duration_ms
    );
    Ok(output)
}

type RenderedBatch = (Vec<RecordResult>, Option<(PathBuf, usize)>);

fn render_batch(
    plan: Vec<PlannedEnvelope>,
    config: &EnvelopeConfig,
) -> Result<RenderedBatch, MailMergeError> {
    // The logo is checked before anything is written.
    let logo = load_logo(&config.logo_path)?;
    std::fs::create_dir_all(&config.output_dir).map_err(|e| MailMergeError::OutputWriteFailed {
        path: config.output_dir.clone(),
        source: e,
    })?;

    let pdfium = bind_pdfium()?;
    let renderer = EnvelopeRenderer::new(
        &pdfium,
        config.layout.clone(),
        logo,
        config.return_address.clone(),
    );
    let cb = config.progress_callback.as_ref();
    let total = plan.len();
    if let Some(cb) = cb {
        cb.on_batch_start(total);
    }

    let mut results = Vec::with_capacity(total);
    let mut generated = Vec::new();
    for item in plan {
        let outcome = match item.plan {
            EnvelopePlan::Skip { reason } => {
                info!("Skipping {}: {}", item.label, reason.describe());
                if let Some(cb) = cb {
                    cb.on_record_skipped(item.index, total, &item.label, reason.describe());
                }
                RecordOutcome::Skipped { reason }
            }
            EnvelopePlan::Render { addressee, output } => {
                if let Some(cb) = cb {
                    cb.on_record_start(item.index, total, &item.label);
                }
                renderer.render(&addressee, &output)?;
                if let Some(cb) = cb {
                    cb.on_record_complete(item.index, total, &item.label);
                }
                generated.push(output.clone());
                RecordOutcome::Generated { pdf: output }
            }
        };
        results.push(RecordResult {
            index: item.index,
            label: item.label,
            outcome,
        });
    }

    if let Some(cb) = cb {
        cb.on_batch_complete(total, generated.len());
    }

    let combined = if !config.combine {
        None
    } else if generated.is_empty() {
        warn!("No envelopes generated; combined PDF not written");
        None
    } else {
        let pages = merge_pdfs(&pdfium, &generated, &config.combined_path)?;
        Some((config.combined_path.clone(), pages))
    };
    Ok((results, combined))
}
