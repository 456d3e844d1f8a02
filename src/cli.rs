//! Pieces shared by the `envelopes` and `letters` binaries: terminal
//! progress, logging setup, pdfium provisioning and the end-of-run summary.

use crate::output::{BatchOutput, RecordOutcome};
use crate::progress::BatchProgressCallback;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

pub fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
pub fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
pub fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
pub fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
pub fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
pub fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Logging ──────────────────────────────────────────────────────────────────

/// Install the stderr subscriber. `RUST_LOG` overrides the computed level.
///
/// Library INFO logs are suppressed while the progress bar is shown; the bar
/// carries the same information.
pub fn init_logging(verbose: bool, quiet: bool, show_progress: bool) {
    let filter = if verbose {
        "debug"
    } else if quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

// ── PDFium ───────────────────────────────────────────────────────────────────

/// Make sure a pdfium library is available before the batch starts, showing
/// a download bar on the first run.
pub fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;
    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

// ── Cancellation ─────────────────────────────────────────────────────────────

/// Run `batch` until it finishes or Ctrl-C arrives. On Ctrl-C the batch
/// future is dropped, which kills any running converter processes.
pub async fn run_until_interrupted<T, F>(batch: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = batch => result,
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("Interrupted; outputs written so far are kept")
        }
    }
}

// ── Progress bar ─────────────────────────────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per record.
/// Records may finish out of order when letters convert concurrently.
pub struct CliProgressCallback {
    bar: ProgressBar,
    noun: &'static str,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// `noun` names the unit in the bar, e.g. "letters".
    pub fn new(noun: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading records…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            noun,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_records: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}",
            self.noun
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total_records as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_records} records to process…"))
        ));
    }

    fn on_record_start(&self, index: usize, _total: usize, label: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(label.to_string());
    }

    fn on_record_complete(&self, index: usize, total: usize, label: &str) {
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            green("✓"),
            index,
            total,
            label,
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_record_skipped(&self, index: usize, total: usize, label: &str, reason: &str) {
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            yellow("–"),
            index,
            total,
            label,
            dim(reason),
        ));
        self.bar.inc(1);
    }

    fn on_record_error(&self, index: usize, total: usize, label: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}  {}",
            red("✗"),
            index,
            total,
            label,
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_records: usize, _generated: usize) {
        self.bar.finish_and_clear();
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the end-of-run summary to stderr: totals, the combined file, and
/// every record that did not produce a PDF.
pub fn print_summary(output: &BatchOutput, noun: &str) {
    let s = &output.stats;
    let mark = if s.failed == 0 { green("✔") } else { yellow("⚠") };
    eprintln!(
        "{}  {} {} generated  {} skipped  {} failed  {}ms",
        mark,
        bold(&s.generated.to_string()),
        noun,
        s.skipped,
        if s.failed == 0 {
            s.failed.to_string()
        } else {
            red(&s.failed.to_string())
        },
        s.duration_ms,
    );
    for path in &s.missing_inputs {
        eprintln!("   {} input not found: {}", yellow("!"), path.display());
    }
    match &output.combined {
        Some(path) => eprintln!(
            "   combined → {}  {}",
            bold(&path.display().to_string()),
            dim(&format!("({} pages)", output.combined_pages)),
        ),
        None => eprintln!("   {}", dim("no combined PDF written")),
    }
    for record in &output.records {
        match &record.outcome {
            RecordOutcome::Skipped { reason } => eprintln!(
                "   {} skipped {}: {}",
                yellow("–"),
                record.label,
                reason.describe()
            ),
            RecordOutcome::Failed { error } => {
                eprintln!("   {} {}", red("✗"), error)
            }
            RecordOutcome::Generated { .. } => {}
        }
    }
}

// ── Argument helpers ─────────────────────────────────────────────────────────

/// Split positional arguments into CSV inputs and an optional template: when
/// there are at least two arguments, a last one ending in `.docx` that exists
/// on disk is the template.
pub fn split_template_arg(mut args: Vec<PathBuf>) -> (Vec<PathBuf>, Option<PathBuf>) {
    let is_template =
        args.len() > 1 && args.last().is_some_and(|p| is_docx(p) && p.is_file());
    let template = if is_template { args.pop() } else { None };
    (args, template)
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}
