//! Batch results: what happened to every record, plus totals.
//!
//! [`BatchOutput`] is serializable so the binaries can write it out as a JSON
//! manifest, giving the operator a record of which members did not get an
//! envelope or letter and why.

use crate::error::{MailMergeError, RecordError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Why a record was deliberately left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingStreetAddress,
    /// A later record maps to the same output file.
    Superseded,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::MissingStreetAddress => "no street address",
            SkipReason::Superseded => "file name reused by a later record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Generated { pdf: PathBuf },
    Skipped { reason: SkipReason },
    Failed { error: RecordError },
}

/// The outcome for one input record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResult {
    /// 1-based position in sorted order.
    pub index: usize,
    /// Human-readable name (file stem or display name).
    pub label: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

impl RecordResult {
    pub fn pdf(&self) -> Option<&Path> {
        match &self.outcome {
            RecordOutcome::Generated { pdf } => Some(pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Records loaded from all input files.
    pub total_records: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Input files that could not be opened.
    pub missing_inputs: Vec<PathBuf>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutput {
    /// One entry per record, in sorted order.
    pub records: Vec<RecordResult>,
    /// Combined PDF, when one was written.
    pub combined: Option<PathBuf>,
    /// Page count of the combined PDF.
    pub combined_pages: usize,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Build the output from per-record results, sorting them by index and
    /// filling in the counters.
    pub fn from_records(mut records: Vec<RecordResult>, missing_inputs: Vec<PathBuf>) -> Self {
        records.sort_by_key(|r| r.index);
        let count = |pred: fn(&RecordOutcome) -> bool| {
            records.iter().filter(|r| pred(&r.outcome)).count()
        };
        let stats = BatchStats {
            total_records: records.len(),
            generated: count(|o| matches!(o, RecordOutcome::Generated { .. })),
            skipped: count(|o| matches!(o, RecordOutcome::Skipped { .. })),
            failed: count(|o| matches!(o, RecordOutcome::Failed { .. })),
            missing_inputs,
            duration_ms: 0,
        };
        Self {
            records,
            combined: None,
            combined_pages: 0,
            stats,
        }
    }

    /// Paths of every generated PDF, in record order.
    pub fn generated_paths(&self) -> Vec<PathBuf> {
        self.records
            .iter()
            .filter_map(|r| r.pdf().map(Path::to_path_buf))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordResult> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Failed { .. }))
    }

    /// Treat any failed record as an error.
    pub fn into_result(self) -> Result<Self, MailMergeError> {
        if self.stats.failed > 0 {
            return Err(MailMergeError::PartialFailure {
                generated: self.stats.generated,
                failed: self.stats.failed,
                total: self.stats.total_records,
            });
        }
        Ok(self)
    }
}

/// Write `output` as pretty-printed JSON.
pub fn write_manifest(output: &BatchOutput, path: &Path) -> Result<(), MailMergeError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| MailMergeError::Internal(format!("manifest serialisation: {e}")))?;
    std::fs::write(path, json).map_err(|e| MailMergeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
