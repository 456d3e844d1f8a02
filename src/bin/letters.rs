//! CLI binary: personalised thank-you letters from member CSV exports.
//!
//! A thin shim over the library crate that maps CLI flags to `LetterConfig`
//! and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use donor_mailmerge::cli::{
    ensure_pdfium, init_logging, print_summary, run_until_interrupted, split_template_arg,
    CliProgressCallback,
};
use donor_mailmerge::config::DEFAULT_TEMPLATE;
use donor_mailmerge::{generate_letters, write_manifest, BatchProgressCallback, LetterConfig};
use std::path::PathBuf;
use std::sync::Arc;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Letters from one export using "New Member Letter Template.docx"
  letters members.csv

  # Several exports and a different template (last argument)
  letters businesses.csv households.csv "Renewal Letter.docx"

  # Fixed date, more parallel conversions, and a JSON report
  letters members.csv --date "March 04, 2025" --concurrency 8 --manifest report.json

TEMPLATE TOKENS:
  SALUTATION  NAME  ADDRESS  CITY_STATE_ZIP  DATE  AMOUNT
  Tokens may span formatting runs; each is replaced wherever it appears in
  the body, headers and footers.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter (e.g. debug)

SETUP:
  Conversion needs LibreOffice (or a compatible --converter) on PATH:
    libreoffice --headless --convert-to pdf --outdir <dir> <file.docx>
"#;

/// Generate thank-you letter PDFs from member CSV files and a .docx template.
#[derive(Parser, Debug)]
#[command(
    name = "letters",
    version,
    about = "Generate thank-you letter PDFs from member CSV files and a .docx template",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV files to read, optionally followed by the template (.docx).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Letter template; overrides a trailing .docx argument.
    #[arg(long, env = "LETTERS_TEMPLATE")]
    template: Option<PathBuf>,

    /// Directory for the filled .docx letters.
    #[arg(long, env = "LETTERS_DOCX_DIR", default_value = "letters")]
    docx_dir: PathBuf,

    /// Directory for the per-member letter PDFs.
    #[arg(long, env = "LETTERS_PDF_DIR", default_value = "pdfs")]
    pdf_dir: PathBuf,

    /// Path of the combined PDF.
    #[arg(long, env = "LETTERS_COMBINED", default_value = "Combined_Letters.pdf")]
    combined: PathBuf,

    /// Number of conversions running at once.
    #[arg(short, long, env = "LETTERS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-letter conversion timeout in seconds.
    #[arg(long, env = "LETTERS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Converter executable.
    #[arg(long, env = "LETTERS_CONVERTER", default_value = "libreoffice")]
    converter: String,

    /// Text for the DATE token instead of today's date.
    #[arg(long, env = "LETTERS_DATE")]
    date: Option<String>,

    /// Write a JSON report of every record's outcome.
    #[arg(long, env = "LETTERS_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Skip writing the combined PDF.
    #[arg(long)]
    no_combine: bool,

    /// Exit with an error when any letter failed.
    #[arg(long)]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "LETTERS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LETTERS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LETTERS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress;
    init_logging(cli.verbose, cli.quiet, show_progress);

    let (inputs, trailing_template) = split_template_arg(cli.inputs.clone());
    let template = cli
        .template
        .clone()
        .or(trailing_template)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE));

    if !cli.no_combine {
        ensure_pdfium(cli.quiet)?;
    }

    let progress: Option<Arc<dyn BatchProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new("letters") as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, template, progress)?;

    let output = run_until_interrupted(async {
        generate_letters(&inputs, &config)
            .await
            .context("Letter generation failed")
    })
    .await?;

    if let Some(ref path) = cli.manifest {
        write_manifest(&output, path)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    }
    if !cli.quiet {
        print_summary(&output, "letters");
    }
    if cli.strict {
        output.into_result().context("Some letters failed")?;
    }
    Ok(())
}

/// Map CLI args to `LetterConfig`.
fn build_config(
    cli: &Cli,
    template: PathBuf,
    progress: Option<Arc<dyn BatchProgressCallback>>,
) -> Result<LetterConfig> {
    let mut builder = LetterConfig::builder()
        .template_path(template)
        .docx_dir(&cli.docx_dir)
        .pdf_dir(&cli.pdf_dir)
        .combined_path(&cli.combined)
        .concurrency(cli.concurrency)
        .conversion_timeout_secs(cli.timeout)
        .converter(cli.converter.clone())
        .combine(!cli.no_combine);

    if let Some(ref date) = cli.date {
        builder = builder.date(date.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
