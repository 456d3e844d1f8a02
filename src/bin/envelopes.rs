//! CLI binary: print-ready #10 envelopes from member CSV exports.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `EnvelopeConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use donor_mailmerge::cli::{
    ensure_pdfium, init_logging, print_summary, run_until_interrupted, CliProgressCallback,
};
use donor_mailmerge::{
    generate_envelopes, write_manifest, BatchProgressCallback, EnvelopeConfig, EnvelopeLayout,
};
use std::path::PathBuf;
use std::sync::Arc;

const AFTER_HELP: &str = r#"EXAMPLES:
  # One envelope per member, combined into Combined_Envelopes.pdf
  envelopes members.csv

  # Several exports at once
  envelopes businesses.csv households.csv

  # Custom output locations and a JSON report
  envelopes members.csv --output-dir out/env --combined out/all.pdf --manifest report.json

  # Adjust positions for a different printer
  envelopes members.csv --layout layout.json

LAYOUT FILE:
  JSON object with any of the fields of the default layout (millimetres);
  missing fields keep their defaults, e.g. {"logo_width": 25.0}.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter (e.g. debug)
"#;

/// Generate addressed envelope PDFs from member CSV files.
#[derive(Parser, Debug)]
#[command(
    name = "envelopes",
    version,
    about = "Generate addressed envelope PDFs from member CSV files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV files to read, in order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the per-member envelope PDFs.
    #[arg(long, env = "ENVELOPES_OUTPUT_DIR", default_value = "Envelopes")]
    output_dir: PathBuf,

    /// Path of the combined PDF.
    #[arg(long, env = "ENVELOPES_COMBINED", default_value = "Combined_Envelopes.pdf")]
    combined: PathBuf,

    /// Logo image placed beside the return address.
    #[arg(long, env = "ENVELOPES_LOGO", default_value = "BLUEMOUNDS-F-01.png")]
    logo: PathBuf,

    /// JSON file overriding the envelope layout.
    #[arg(long, env = "ENVELOPES_LAYOUT")]
    layout: Option<PathBuf>,

    /// Return address line; repeat the flag or separate lines with `|`.
    #[arg(long = "return-address", env = "ENVELOPES_RETURN_ADDRESS", value_delimiter = '|')]
    return_address: Vec<String>,

    /// Write a JSON report of every record's outcome.
    #[arg(long, env = "ENVELOPES_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Skip writing the combined PDF.
    #[arg(long)]
    no_combine: bool,

    /// Disable progress bar.
    #[arg(long, env = "ENVELOPES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ENVELOPES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ENVELOPES_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress;
    init_logging(cli.verbose, cli.quiet, show_progress);
    ensure_pdfium(cli.quiet)?;

    let progress: Option<Arc<dyn BatchProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new("envelopes") as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let output = run_until_interrupted(async {
        generate_envelopes(&cli.inputs, &config)
            .await
            .context("Envelope generation failed")
    })
    .await?;

    if let Some(ref path) = cli.manifest {
        write_manifest(&output, path)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    }
    if !cli.quiet {
        print_summary(&output, "envelopes");
    }
    Ok(())
}

/// Map CLI args to `EnvelopeConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<Arc<dyn BatchProgressCallback>>,
) -> Result<EnvelopeConfig> {
    let mut builder = EnvelopeConfig::builder()
        .output_dir(&cli.output_dir)
        .combined_path(&cli.combined)
        .logo_path(&cli.logo)
        .combine(!cli.no_combine);

    if let Some(ref path) = cli.layout {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout {}", path.display()))?;
        let layout: EnvelopeLayout = serde_json::from_str(&text)
            .with_context(|| format!("Invalid layout JSON in {}", path.display()))?;
        builder = builder.layout(layout);
    }
    if !cli.return_address.is_empty() {
        builder = builder.return_address(cli.return_address.iter().cloned());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
