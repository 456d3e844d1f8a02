//! Progress-callback trait for per-record batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via the config builders'
//! `progress_callback` setter to receive events as each record is rendered,
//! skipped, or fails. The trait is `Send + Sync` because letters are produced
//! by concurrent tasks.
//!
//! # Example
//!
//! ```rust
//! use donor_mailmerge::{BatchProgressCallback, LetterConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_record_complete(&self, _index: usize, total: usize, label: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}/{total} {label}");
//!     }
//! }
//!
//! let config = LetterConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by a batch as it processes each record.
///
/// `index` is the 1-based position of the record in sorted order. All methods
/// default to no-ops, so implementors override only what they need. In the
/// letters batch record events may arrive concurrently and out of order.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after loading and sorting, before any record is processed.
    fn on_batch_start(&self, total_records: usize) {
        let _ = total_records;
    }

    fn on_record_start(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// A PDF was produced for the record.
    fn on_record_complete(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// The record was deliberately left out (e.g. no street address).
    fn on_record_skipped(&self, index: usize, total: usize, label: &str, reason: &str) {
        let _ = (index, total, label, reason);
    }

    /// The record failed; the batch continues.
    fn on_record_error(&self, index: usize, total: usize, label: &str, error: &str) {
        let _ = (index, total, label, error);
    }

    /// Called once after every record has been attempted and before merging.
    fn on_batch_complete(&self, total_records: usize, generated: usize) {
        let _ = (total_records, generated);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the batch configs.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
