//! # donor-mailmerge
//!
//! Produce printed mailings for member records exported as CSV: a #10
//! envelope per member and a thank-you letter per member, each as its own PDF
//! plus one combined PDF for the printer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV files
//!  │
//!  ├─ 1. Load     read every file, skip missing ones
//!  ├─ 2. Sort     account name, else first + last name
//!  ├─ 3. Resolve  names, address lines, donor category, salutation
//!  ├─ 4. Render   envelopes: pdfium page   letters: fill .docx → office converter
//!  └─ 5. Merge    concatenate per-record PDFs into the combined file
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use donor_mailmerge::{generate_letters, LetterConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LetterConfig::builder()
//!         .template_path("New Member Letter Template.docx")
//!         .concurrency(2)
//!         .build()?;
//!     let output = generate_letters(&[PathBuf::from("members.csv")], &config).await?;
//!     eprintln!(
//!         "{} letters, {} failed",
//!         output.stats.generated, output.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `envelopes` and `letters` binaries (clap + anyhow + indicatif) |
//!
//! ## External tools
//!
//! Letters need a headless office suite able to run
//! `--headless --convert-to pdf` (LibreOffice by default). Envelopes and the
//! combined PDFs use pdfium, downloaded on first use unless `PDFIUM_LIB_PATH`
//! points at an existing copy.

// ── Modules ──────────────────────────────────────────────────────────────

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod envelopes;
pub mod error;
pub mod letters;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EnvelopeConfig, EnvelopeConfigBuilder, LetterConfig, LetterConfigBuilder};
pub use envelopes::{generate_envelopes, plan_envelopes};
pub use error::{MailMergeError, RecordError};
pub use letters::{generate_letters, plan_letters};
pub use output::{write_manifest, BatchOutput, BatchStats, RecordOutcome, RecordResult, SkipReason};
pub use pipeline::layout::EnvelopeLayout;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
