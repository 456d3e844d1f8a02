//! Office-document → PDF conversion through an external headless converter.
//!
//! Each call spawns one converter process (LibreOffice by default) with its
//! own throw-away user profile, so several conversions can run side by side
//! without fighting over the profile lock. The process is bounded by a
//! timeout and is killed if the timeout fires or the calling future is
//! dropped.

use crate::error::RecordError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default converter executable.
pub const DEFAULT_CONVERTER: &str = "libreoffice";

/// Longest stderr excerpt kept in a [`RecordError`].
const STDERR_TAIL: usize = 400;

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    program: String,
    /// Arguments placed before the generated ones.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER)
    }
}

impl OfficeConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for converting `input` into `out_dir`.
    pub fn command_args(&self, profile_dir: &Path, input: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.push(format!("-env:UserInstallation=file://{}", profile_dir.display()).into());
        args.extend(
            ["--headless", "--convert-to", "pdf", "--outdir"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(out_dir.as_os_str().to_owned());
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Path the converter writes for `input`: `<out_dir>/<stem>.pdf`.
    pub fn expected_output(input: &Path, out_dir: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or(input.as_os_str());
        let mut name = stem.to_os_string();
        name.push(".pdf");
        out_dir.join(name)
    }

    /// Convert `input` to PDF in `out_dir`, returning the PDF path.
    ///
    /// `record` labels any error for the operator.
    pub async fn convert(
        &self,
        record: &str,
        input: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, RecordError> {
        let unavailable = |detail: String| RecordError::ConverterUnavailable {
            record: record.to_string(),
            program: self.program.clone(),
            detail,
        };

        let profile = tempfile::Builder::new()
            .prefix("mailmerge-profile-")
            .tempdir()
            .map_err(|e| unavailable(format!("profile directory: {e}")))?;

        let child = Command::new(&self.program)
            .args(self.command_args(profile.path(), input, out_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(e.to_string()))?;
        debug!("Converting {} with {}", input.display(), self.program);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RecordError::ConversionFailed {
                    record: record.to_string(),
                    status: "wait failed".into(),
                    stderr: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    "Conversion of {} exceeded {:?}; converter killed",
                    input.display(),
                    self.timeout
                );
                return Err(RecordError::ConversionTimeout {
                    record: record.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(RecordError::ConversionFailed {
                record: record.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let pdf = Self::expected_output(input, out_dir);
        if !pdf.is_file() {
            return Err(RecordError::OutputMissing {
                record: record.to_string(),
                path: pdf,
            });
        }
        Ok(pdf)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_TAIL) {
        Some((cut, _)) => format!("…{}", &text[cut..]),
        None => text.to_string(),
    }
}
