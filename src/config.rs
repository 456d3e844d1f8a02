//! Configuration types for the envelope and letter batches.
//!
//! Each batch is controlled through one struct ([`EnvelopeConfig`],
//! [`LetterConfig`]) built via its builder. Defaults reproduce the layout and
//! file names the mailing has always used, so a bare `::default()` is enough
//! for the usual run from the mailing folder.

use crate::error::MailMergeError;
use crate::pipeline::layout::EnvelopeLayout;
use crate::pipeline::office::{OfficeConverter, DEFAULT_CONVERTER};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Return address printed in the top-left corner of every envelope.
pub const DEFAULT_RETURN_ADDRESS: [&str; 3] = [
    "Friends of Blue Mound State Park",
    "PO Box 287",
    "Mount Horeb, WI 53572",
];

pub const DEFAULT_LOGO: &str = "BLUEMOUNDS-F-01.png";
pub const DEFAULT_ENVELOPE_DIR: &str = "Envelopes";
pub const DEFAULT_COMBINED_ENVELOPES: &str = "Combined_Envelopes.pdf";

pub const DEFAULT_TEMPLATE: &str = "New Member Letter Template.docx";
pub const DEFAULT_DOCX_DIR: &str = "letters";
pub const DEFAULT_PDF_DIR: &str = "pdfs";
pub const DEFAULT_COMBINED_LETTERS: &str = "Combined_Letters.pdf";

// ── Envelopes ────────────────────────────────────────────────────────────

/// Configuration for an envelope batch.
///
/// # Example
/// ```rust
/// use donor_mailmerge::EnvelopeConfig;
///
/// let config = EnvelopeConfig::builder()
///     .output_dir("out/envelopes")
///     .combine(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.return_address.len(), 3);
/// ```
#[derive(Clone)]
pub struct EnvelopeConfig {
    /// Page size and element positions, in millimetres.
    pub layout: EnvelopeLayout,

    /// Return address lines, top to bottom. Default: [`DEFAULT_RETURN_ADDRESS`].
    pub return_address: Vec<String>,

    /// Logo drawn beside the return address. Must exist; a missing logo
    /// aborts the batch before anything is written.
    pub logo_path: PathBuf,

    /// Directory receiving one `<name>_Envelope.pdf` per record.
    pub output_dir: PathBuf,

    /// Combined PDF of all envelopes, in generation order.
    pub combined_path: PathBuf,

    /// Write the combined PDF. Default: true.
    pub combine: bool,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            layout: EnvelopeLayout::default(),
            return_address: DEFAULT_RETURN_ADDRESS.iter().map(|s| s.to_string()).collect(),
            logo_path: PathBuf::from(DEFAULT_LOGO),
            output_dir: PathBuf::from(DEFAULT_ENVELOPE_DIR),
            combined_path: PathBuf::from(DEFAULT_COMBINED_ENVELOPES),
            combine: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EnvelopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeConfig")
            .field("layout", &self.layout)
            .field("return_address", &self.return_address)
            .field("logo_path", &self.logo_path)
            .field("output_dir", &self.output_dir)
            .field("combined_path", &self.combined_path)
            .field("combine", &self.combine)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl EnvelopeConfig {
    pub fn builder() -> EnvelopeConfigBuilder {
        EnvelopeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EnvelopeConfig`].
#[derive(Debug)]
pub struct EnvelopeConfigBuilder {
    config: EnvelopeConfig,
}

impl EnvelopeConfigBuilder {
    pub fn layout(mut self, layout: EnvelopeLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn return_address<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.return_address = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn logo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.logo_path = path.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn combined_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.combined_path = path.into();
        self
    }

    pub fn combine(mut self, v: bool) -> Self {
        self.config.combine = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EnvelopeConfig, MailMergeError> {
        let c = &self.config;
        c.layout.validate().map_err(MailMergeError::InvalidConfig)?;
        if c.return_address.is_empty() {
            return Err(MailMergeError::InvalidConfig(
                "Return address needs at least one line".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(MailMergeError::InvalidConfig(
                "Envelope output directory must not be empty".into(),
            ));
        }
        if c.combine && c.combined_path.as_os_str().is_empty() {
            return Err(MailMergeError::InvalidConfig(
                "Combined envelope path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Letters ──────────────────────────────────────────────────────────────

/// Configuration for a letter batch.
#[derive(Clone)]
pub struct LetterConfig {
    /// `.docx` template containing the placeholder tokens.
    pub template_path: PathBuf,

    /// Directory receiving the filled `.docx` files, kept after conversion.
    pub docx_dir: PathBuf,

    /// Directory receiving the converted per-record PDFs.
    pub pdf_dir: PathBuf,

    /// Combined PDF of all letters, ordered by file name.
    pub combined_path: PathBuf,

    /// Number of conversions in flight at once. Default: 4.
    ///
    /// Each conversion is a full office-suite process, so this is bounded by
    /// memory rather than CPU on most machines.
    pub concurrency: usize,

    /// Per-letter converter timeout in seconds. Default: 120.
    ///
    /// The first conversion on a cold machine can take tens of seconds while
    /// the office suite initialises its profile.
    pub conversion_timeout_secs: u64,

    /// Converter executable. Default: `libreoffice`.
    pub converter: String,

    /// Extra arguments placed before the generated converter arguments.
    pub converter_args: Vec<String>,

    /// Text used for the date token instead of today's date.
    pub date_override: Option<String>,

    /// Write the combined PDF. Default: true.
    pub combine: bool,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LetterConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE),
            docx_dir: PathBuf::from(DEFAULT_DOCX_DIR),
            pdf_dir: PathBuf::from(DEFAULT_PDF_DIR),
            combined_path: PathBuf::from(DEFAULT_COMBINED_LETTERS),
            concurrency: 4,
            conversion_timeout_secs: 120,
            converter: DEFAULT_CONVERTER.to_string(),
            converter_args: Vec::new(),
            date_override: None,
            combine: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LetterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LetterConfig")
            .field("template_path", &self.template_path)
            .field("docx_dir", &self.docx_dir)
            .field("pdf_dir", &self.pdf_dir)
            .field("combined_path", &self.combined_path)
            .field("concurrency", &self.concurrency)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("converter", &self.converter)
            .field("converter_args", &self.converter_args)
            .field("date_override", &self.date_override)
            .field("combine", &self.combine)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl LetterConfig {
    pub fn builder() -> LetterConfigBuilder {
        LetterConfigBuilder {
            config: Self::default(),
        }
    }

    /// The converter this config describes.
    pub fn office_converter(&self) -> OfficeConverter {
        OfficeConverter::new(self.converter.clone())
            .leading_args(self.converter_args.iter().cloned())
            .timeout(Duration::from_secs(self.conversion_timeout_secs))
    }
}

/// Builder for [`LetterConfig`].
#[derive(Debug)]
pub struct LetterConfigBuilder {
    config: LetterConfig,
}

impl LetterConfigBuilder {
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn docx_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.docx_dir = dir.into();
        self
    }

    pub fn pdf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdf_dir = dir.into();
        self
    }

    pub fn combined_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.combined_path = path.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn converter(mut self, program: impl Into<String>) -> Self {
        self.config.converter = program.into();
        self
    }

    pub fn converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn date(mut self, text: impl Into<String>) -> Self {
        self.config.date_override = Some(text.into());
        self
    }

    pub fn combine(mut self, v: bool) -> Self {
        self.config.combine = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The template is not opened here; a missing template is reported when
    /// the batch starts.
    pub fn build(self) -> Result<LetterConfig, MailMergeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(MailMergeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.conversion_timeout_secs == 0 {
            return Err(MailMergeError::InvalidConfig(
                "Conversion timeout must be ≥ 1 second".into(),
            ));
        }
        if c.converter.trim().is_empty() {
            return Err(MailMergeError::InvalidConfig(
                "Converter program must not be empty".into(),
            ));
        }
        if c.docx_dir == c.pdf_dir {
            return Err(MailMergeError::InvalidConfig(format!(
                "Letter and PDF directories must differ, both are '{}'",
                c.docx_dir.display()
            )));
        }
        Ok(self.config)
    }
}
