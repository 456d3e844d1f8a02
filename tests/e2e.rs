//! End-to-end integration tests for donor-mailmerge.
//!
//! The letter tests stand in a tiny shell script for the office converter, so
//! they run anywhere `sh` exists. Tests that need a real pdfium library
//! (envelope rendering, combined PDFs) are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use donor_mailmerge::pipeline::merge::page_count;
use donor_mailmerge::pipeline::records::{load_records, KeyStyle};
use donor_mailmerge::pipeline::{bind_pdfium, office::OfficeConverter};
use donor_mailmerge::{
    generate_envelopes, generate_letters, plan_envelopes, write_manifest, BatchOutput,
    BatchProgressCallback, EnvelopeConfig, LetterConfig, MailMergeError, RecordError,
    RecordOutcome, SkipReason,
};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Stand-in for `libreoffice --headless --convert-to pdf`: writes
/// `<outdir>/<stem>.pdf`, and fails for any file whose name contains "Broken".
const FAKE_CONVERTER: &str = r#"
    while [ $# -gt 1 ]; do
        if [ "$1" = "--outdir" ]; then outdir="$2"; fi
        shift
    done
    base=$(basename "$1" .docx)
    case "$base" in
        *Broken*) echo "cannot convert $base" >&2; exit 3 ;;
    esac
    printf '%%PDF-1.4\n' > "$outdir/$base.pdf"
"#;

const MEMBERS_CSV: &str = "\
Account Name,First Name,Last Name,Address (Street),Address (City),Address (State/Province),Address (Postal Code),Business Friend of Blue Mound State Park
Zenith Corp,,,9 Elm St,Verona,WI,53593,x
,Jane,Doe,1 Main St,Madison,WI,53703,
Broken Inc,,,5 Oak Rd,Dodgeville,WI,53533,x
";

const BODY: &str = concat!(
    r#"<w:document><w:body>"#,
    r#"<w:p><w:r><w:t>DATE</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>NAME</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>ADDRESS</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Dear SALU</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>TATION,</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>Thank you for your $AMOUNT gift.</w:t></w:r></w:p>"#,
    r#"</w:body></w:document>"#,
);

fn write_template(path: &Path) {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        ("[Content_Types].xml", "<Types/>"),
        ("word/document.xml", BODY),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    std::fs::write(path, bytes).unwrap();
}

/// Text content of the filled document body, tags removed.
fn letter_text(docx: &Path) -> String {
    let bytes = std::fs::read(docx).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    let mut text = String::new();
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

/// Route library logs to the test harness; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("members.csv"), MEMBERS_CSV).unwrap();
        write_template(&dir.path().join("Letter.docx"));
        init_tracing();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn letter_config(&self) -> donor_mailmerge::LetterConfigBuilder {
        LetterConfig::builder()
            .template_path(self.path("Letter.docx"))
            .docx_dir(self.path("letters"))
            .pdf_dir(self.path("pdfs"))
            .combined_path(self.path("Combined_Letters.pdf"))
            .converter("sh")
            .converter_args(["-c", FAKE_CONVERTER, "sh"])
            .conversion_timeout_secs(30)
            .date("March 04, 2025")
            .combine(false)
    }
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
}

impl BatchProgressCallback for CountingCallback {
    fn on_batch_start(&self, total_records: usize) {
        self.started.store(total_records, Ordering::SeqCst);
    }
    fn on_record_complete(&self, _index: usize, _total: usize, _label: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_record_error(&self, _index: usize, _total: usize, _label: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Letters (no pdfium needed) ───────────────────────────────────────────────

#[tokio::test]
async fn test_letters_fill_convert_and_report() {
    let ws = Workspace::new();
    let counter = Arc::new(CountingCallback::default());
    let config = ws
        .letter_config()
        .concurrency(2)
        .progress_callback(counter.clone())
        .build()
        .unwrap();

    let inputs = vec![ws.path("members.csv"), ws.path("absent.csv")];
    let output = generate_letters(&inputs, &config).await.unwrap();

    // Sorted by account name; the blank account sorts first.
    let labels: Vec<&str> = output.records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, ["Jane_Doe", "Broken_Inc", "Zenith_Corp"]);
    assert_eq!(output.stats.total_records, 3);
    assert_eq!(output.stats.generated, 2);
    assert_eq!(output.stats.failed, 1);
    assert_eq!(output.stats.missing_inputs, [ws.path("absent.csv")]);
    assert!(output.combined.is_none());

    match &output.records[1].outcome {
        RecordOutcome::Failed {
            error: RecordError::ConversionFailed { stderr, .. },
        } => assert!(stderr.contains("cannot convert Broken_Inc"), "stderr: {stderr}"),
        other => panic!("expected conversion failure, got {other:?}"),
    }
    assert!(ws.path("pdfs/Jane_Doe.pdf").is_file());
    assert!(ws.path("pdfs/Zenith_Corp.pdf").is_file());
    // The filled document is kept even when conversion fails.
    assert!(ws.path("letters/Broken_Inc.docx").is_file());

    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);

    let err = output.into_result().unwrap_err();
    assert!(matches!(
        err,
        MailMergeError::PartialFailure {
            generated: 2,
            failed: 1,
            total: 3
        }
    ));
}

#[tokio::test]
async fn test_letter_tokens_are_substituted() {
    let ws = Workspace::new();
    let config = ws.letter_config().build().unwrap();
    generate_letters(&[ws.path("members.csv")], &config)
        .await
        .unwrap();

    let business = letter_text(&ws.path("letters/Zenith_Corp.docx"));
    assert!(business.contains("March 04, 2025"), "{business}");
    assert!(business.contains("Dear Zenith Corp,"), "{business}");
    assert!(business.contains("$100 gift"), "{business}");
    assert!(business.contains("Verona, WI 53593"), "{business}");

    let individual = letter_text(&ws.path("letters/Jane_Doe.docx"));
    assert!(individual.contains("Dear Jane,"), "{individual}");
    assert!(individual.contains("Jane Doe"), "{individual}");
    assert!(individual.contains("$25 gift"), "{individual}");
    for token in ["SALUTATION", "AMOUNT", "DATE", "ADDRESS"] {
        assert!(!individual.contains(token), "{token} left in {individual}");
    }
}

#[tokio::test]
async fn test_letter_conversion_timeout_is_per_record() {
    let ws = Workspace::new();
    let config = ws
        .letter_config()
        .converter_args(["-c", "sleep 5", "sh"])
        .conversion_timeout_secs(1)
        .build()
        .unwrap();

    let output = generate_letters(&[ws.path("members.csv")], &config)
        .await
        .unwrap();
    assert_eq!(output.stats.failed, 3);
    assert!(output.records.iter().all(|r| matches!(
        r.outcome,
        RecordOutcome::Failed {
            error: RecordError::ConversionTimeout { secs: 1, .. }
        }
    )));
}

#[tokio::test]
async fn test_manifest_round_trips() {
    let ws = Workspace::new();
    let config = ws.letter_config().build().unwrap();
    let output = generate_letters(&[ws.path("members.csv")], &config)
        .await
        .unwrap();

    let manifest = ws.path("report.json");
    write_manifest(&output, &manifest).unwrap();
    let text = std::fs::read_to_string(&manifest).unwrap();
    let back: BatchOutput = serde_json::from_str(&text).unwrap();
    assert_eq!(back.stats, output.stats);
    assert_eq!(back.records.len(), 3);
}

#[test]
fn test_missing_template_aborts_before_output() {
    let ws = Workspace::new();
    let config = ws
        .letter_config()
        .template_path(ws.path("Nope.docx"))
        .build()
        .unwrap();

    let err = tokio_test::block_on(generate_letters(&[ws.path("members.csv")], &config))
        .unwrap_err();
    assert!(matches!(err, MailMergeError::TemplateNotFound { .. }));
    assert!(!ws.path("letters").exists());
    assert!(!ws.path("pdfs").exists());
}

#[test]
fn test_malformed_csv_is_fatal() {
    let ws = Workspace::new();
    let bad = ws.path("bad.csv");
    std::fs::write(&bad, b"Account Name,City\n\xff\xfe,\xff\n").unwrap();
    let config = ws.letter_config().build().unwrap();

    let err = tokio_test::block_on(generate_letters(&[bad], &config)).unwrap_err();
    assert!(matches!(err, MailMergeError::CsvParse { .. }), "got {err:?}");
}

#[test]
fn test_converter_arguments_match_libreoffice() {
    let converter = LetterConfig::default().office_converter();
    let args = converter.command_args(
        Path::new("/tmp/p"),
        Path::new("letters/Jane_Doe.docx"),
        Path::new("pdfs"),
    );
    let tail: Vec<String> = args[1..]
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        tail,
        ["--headless", "--convert-to", "pdf", "--outdir", "pdfs", "letters/Jane_Doe.docx"]
    );
    assert_eq!(
        OfficeConverter::expected_output(Path::new("letters/Jane_Doe.docx"), Path::new("pdfs")),
        PathBuf::from("pdfs/Jane_Doe.pdf")
    );
}

#[tokio::test]
async fn test_letters_sharing_a_file_name_convert_once() {
    let ws = Workspace::new();
    let mut csv = String::from(MEMBERS_CSV.lines().next().unwrap());
    csv.push('\n');
    for n in 1..=40 {
        csv.push_str(&format!("Same Co,,,{n} Main St,Verona,WI,53593,x\n"));
    }
    std::fs::write(ws.path("same.csv"), csv).unwrap();
    let config = ws.letter_config().concurrency(16).build().unwrap();

    let output = generate_letters(&[ws.path("same.csv")], &config)
        .await
        .unwrap();
    assert_eq!(output.stats.generated, 1);
    assert_eq!(output.stats.skipped, 39);
    assert_eq!(output.stats.failed, 0);
    assert_eq!(
        output.records[0].outcome,
        RecordOutcome::Skipped {
            reason: SkipReason::Superseded
        }
    );
    assert_eq!(output.records[39].pdf(), Some(ws.path("pdfs/Same_Co.pdf").as_path()));

    // The surviving letter is the last record's, and its zip is intact.
    let text = letter_text(&ws.path("letters/Same_Co.docx"));
    assert!(text.contains("40 Main St"), "{text}");
    assert_eq!(std::fs::read_dir(ws.path("pdfs")).unwrap().count(), 1);
}

#[tokio::test]
async fn test_zero_concurrency_field_still_converts() {
    let ws = Workspace::new();
    let mut config = ws.letter_config().build().unwrap();
    config.concurrency = 0;

    let output = tokio::time::timeout(
        Duration::from_secs(30),
        generate_letters(&[ws.path("members.csv")], &config),
    )
    .await
    .expect("letter batch stalled")
    .unwrap();
    assert_eq!(output.stats.generated, 2);
}

// ── Envelopes ────────────────────────────────────────────────────────────────

#[test]
fn test_envelope_plan_skips_records_without_street() {
    let ws = Workspace::new();
    let csv = ws.path("envelopes.csv");
    std::fs::write(
        &csv,
        "First Name,Last Name,Street Address,City,State,Zip Code\n\
         Ann,Lee,12 Pine Rd,Barneveld,WI,53507\n\
         Bob,Ray,,Mount Horeb,WI,53572\n\
         Cy,Fox,3 Ash Ct,Blue Mounds,WI,53517\n",
    )
    .unwrap();

    let loaded = load_records(&[csv], KeyStyle::Verbatim).unwrap();
    let plan = plan_envelopes(&loaded.records, Path::new("Envelopes"));
    let skipped: Vec<&str> = plan
        .iter()
        .filter(|p| {
            matches!(
                p.plan,
                donor_mailmerge::envelopes::EnvelopePlan::Skip {
                    reason: SkipReason::MissingStreetAddress
                }
            )
        })
        .map(|p| p.label.as_str())
        .collect();
    assert_eq!(skipped, ["Bob Ray"]);
    assert_eq!(plan.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_envelopes_render_and_combine() {
    e2e_skip_unless_ready!();

    let ws = Workspace::new();
    let logo = ws.path("logo.png");
    image::RgbImage::from_pixel(120, 40, image::Rgb([30, 90, 40]))
        .save(&logo)
        .unwrap();
    let csv = ws.path("envelopes.csv");
    std::fs::write(
        &csv,
        "Account Name,Address (Street),Address (City),Address (State/Province),Address (Postal Code)\n\
         Zenith Corp,9 Elm St,Verona,WI,53593\n\
         No Street LLC,,Verona,WI,53593\n\
         Acme / Sons,1 Main St,Madison,WI,53703\n",
    )
    .unwrap();

    let config = EnvelopeConfig::builder()
        .logo_path(&logo)
        .output_dir(ws.path("Envelopes"))
        .combined_path(ws.path("Combined_Envelopes.pdf"))
        .build()
        .unwrap();
    let output = generate_envelopes(&[csv], &config).await.unwrap();

    assert_eq!(output.stats.generated, 2);
    assert_eq!(output.stats.skipped, 1);
    assert!(ws.path("Envelopes/Acme_-_Sons_Envelope.pdf").is_file());
    assert!(ws.path("Envelopes/Zenith_Corp_Envelope.pdf").is_file());
    assert!(!ws.path("Envelopes/No_Street_LLC_Envelope.pdf").exists());

    // Combined page count equals the number of generated envelopes.
    assert_eq!(output.combined_pages, output.stats.generated);
    let combined = output.combined.clone().unwrap();
    let pages = tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium().unwrap();
        page_count(&pdfium, &combined).unwrap()
    })
    .await
    .unwrap();
    assert_eq!(pages, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_envelopes_with_no_addresses_write_no_combined_file() {
    e2e_skip_unless_ready!();

    let ws = Workspace::new();
    let logo = ws.path("logo.png");
    image::RgbImage::new(10, 10).save(&logo).unwrap();
    let csv = ws.path("empty.csv");
    std::fs::write(&csv, "Account Name,Address (Street)\nNobody,\n").unwrap();

    let config = EnvelopeConfig::builder()
        .logo_path(&logo)
        .output_dir(ws.path("Envelopes"))
        .combined_path(ws.path("Combined_Envelopes.pdf"))
        .build()
        .unwrap();
    let output = generate_envelopes(&[csv], &config).await.unwrap();
    assert_eq!(output.stats.generated, 0);
    assert!(output.combined.is_none());
    assert!(!ws.path("Combined_Envelopes.pdf").exists());
}

/// Stand-in converter that "converts" `<stem>.docx` by copying a real
/// one-page PDF rendered earlier as `@SRC@/<stem>_Envelope.pdf`.
const COPYING_CONVERTER: &str = r#"
    while [ $# -gt 1 ]; do
        if [ "$1" = "--outdir" ]; then outdir="$2"; fi
        shift
    done
    base=$(basename "$1" .docx)
    case "$base" in
        *Broken*) echo "cannot convert $base" >&2; exit 3 ;;
    esac
    cp '@SRC@'/"$base"_Envelope.pdf "$outdir/$base.pdf"
"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_letters_combined_in_file_name_order() {
    e2e_skip_unless_ready!();

    let ws = Workspace::new();
    let logo = ws.path("logo.png");
    image::RgbImage::new(10, 10).save(&logo).unwrap();
    let source_csv = ws.path("sources.csv");
    std::fs::write(
        &source_csv,
        "Account Name,First Name,Last Name,Address (Street)\n\
         Zenith Corp,,,9 Elm St\n\
         ,Jane,Doe,1 Main St\n",
    )
    .unwrap();
    let sources = ws.path("sources");
    let envelope_config = EnvelopeConfig::builder()
        .logo_path(&logo)
        .output_dir(&sources)
        .combine(false)
        .build()
        .unwrap();
    generate_envelopes(&[source_csv], &envelope_config)
        .await
        .unwrap();

    let script = COPYING_CONVERTER.replace("@SRC@", &sources.to_string_lossy());
    let config = ws
        .letter_config()
        .converter_args(["-c", script.as_str(), "sh"])
        .combine(true)
        .build()
        .unwrap();
    let output = generate_letters(&[ws.path("members.csv")], &config)
        .await
        .unwrap();

    assert_eq!(output.stats.generated, 2);
    assert_eq!(output.stats.failed, 1);
    assert_eq!(output.combined.as_deref(), Some(ws.path("Combined_Letters.pdf").as_path()));
    assert_eq!(output.combined_pages, output.stats.generated);

    let combined = ws.path("Combined_Letters.pdf");
    let texts = tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium().unwrap();
        let document = pdfium.load_pdf_from_file(&combined, None).unwrap();
        document
            .pages()
            .iter()
            .map(|page| page.text().unwrap().all())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Jane Doe"), "{}", texts[0]);
    assert!(texts[1].contains("Zenith Corp"), "{}", texts[1]);
}
