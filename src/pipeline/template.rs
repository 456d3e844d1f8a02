//! Letter templates: fill placeholder tokens in a `.docx` package.
//!
//! Word splits paragraph text into runs wherever formatting, spell-check
//! state or editing history changes, so a token typed as `SALUTATION` may be
//! stored as `SALU` + `TATION`. Substitution therefore works on the full text
//! of each paragraph and then rebuilds the runs:
//!
//! * characters outside a token stay in the run they came from, keeping
//!   their formatting;
//! * a replacement value is placed in the run where its token began;
//! * a newline in a value becomes a `<w:br/>` line break.
//!
//! All tokens are matched in a single pass, so text inserted for one token is
//! never scanned for another.

use crate::error::MailMergeError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Placeholder tokens recognised in letter templates, longest first.
pub const TOKENS: [&str; 6] = [
    "CITY_STATE_ZIP",
    "SALUTATION",
    "ADDRESS",
    "AMOUNT",
    "NAME",
    "DATE",
];

/// The main document part every `.docx` must contain.
const BODY_PART: &str = "word/document.xml";

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    let alternation = TOKENS.map(regex::escape).join("|");
    Regex::new(&alternation).expect("token alternation is a valid regex")
});

/// A `<w:t>` text element, or the end of a paragraph.
static RE_TEXT_OR_PARAGRAPH_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*[^/>])?>(.*?)</w:t>|</w:p>")
        .expect("static regex is valid")
});

static RE_FILLED_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^word/(document|header\d*|footer\d*)\.xml$").expect("static regex is valid")
});

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("package has no word/document.xml")]
    MissingBody,
}

/// Values substituted for each token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    values: HashMap<&'static str, String>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value for `token`. Unknown tokens are ignored.
    pub fn set(mut self, token: &str, value: impl Into<String>) -> Self {
        if let Some(known) = TOKENS.iter().find(|t| **t == token) {
            self.values.insert(*known, value.into());
        }
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }
}

/// A template held in memory, shared by every letter task.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl Template {
    /// Read and check a `.docx` template.
    pub fn open(path: &Path) -> Result<Self, MailMergeError> {
        if !path.is_file() {
            return Err(MailMergeError::TemplateNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|e| MailMergeError::TemplateInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, MailMergeError> {
        let invalid = |detail: String| MailMergeError::TemplateInvalid {
            path: path.to_path_buf(),
            detail,
        };
        {
            let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))
                .map_err(|e| invalid(e.to_string()))?;
            if archive.by_name(BODY_PART).is_err() {
                return Err(invalid(TemplateError::MissingBody.to_string()));
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            bytes: bytes.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a filled copy of the template to `output`.
    pub fn fill_to_file(
        &self,
        replacements: &Replacements,
        output: &Path,
    ) -> Result<(), TemplateError> {
        let file = std::fs::File::create(output)?;
        self.fill_into(replacements, file)?;
        debug!("Filled template → {}", output.display());
        Ok(())
    }

    /// Produce a filled copy of the template in memory.
    pub fn fill_to_vec(&self, replacements: &Replacements) -> Result<Vec<u8>, TemplateError> {
        let mut buf = Cursor::new(Vec::new());
        self.fill_into(replacements, &mut buf)?;
        Ok(buf.into_inner())
    }

    fn fill_into<W: Write + std::io::Seek>(
        &self,
        replacements: &Replacements,
        sink: W,
    ) -> Result<W, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(&self.bytes[..]))?;
        let mut writer = ZipWriter::new(sink);

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if RE_FILLED_PART.is_match(&name) {
                let mut xml = String::new();
                entry.read_to_string(&mut xml)?;
                let filled = fill_part_xml(&xml, replacements);
                let options =
                    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
                writer.start_file(name, options)?;
                writer.write_all(filled.as_bytes())?;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }

        Ok(writer.finish()?)
    }
}

/// Substitute tokens in one WordprocessingML part.
pub fn fill_part_xml(xml: &str, replacements: &Replacements) -> String {
    struct TextElement {
        span: std::ops::Range<usize>,
        text: String,
    }

    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    let mut paragraph: Vec<TextElement> = Vec::new();

    let mut flush = |paragraph: &mut Vec<TextElement>| {
        let runs: Vec<String> = paragraph.iter().map(|e| e.text.clone()).collect();
        if let Some(filled) = substitute_runs(&runs, replacements) {
            for (element, new_text) in paragraph.iter().zip(filled) {
                if new_text != element.text {
                    edits.push((element.span.clone(), text_element_xml(&new_text)));
                }
            }
        }
        paragraph.clear();
    };

    for caps in RE_TEXT_OR_PARAGRAPH_END.captures_iter(xml) {
        let Some(whole) = caps.get(0) else { continue };
        match caps.get(1) {
            Some(inner) => paragraph.push(TextElement {
                span: whole.range(),
                text: unescape_xml(inner.as_str()),
            }),
            None => flush(&mut paragraph),
        }
    }
    flush(&mut paragraph);

    if edits.is_empty() {
        return xml.to_string();
    }

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (span, replacement) in edits {
        out.push_str(&xml[cursor..span.start]);
        out.push_str(&replacement);
        cursor = span.end;
    }
    out.push_str(&xml[cursor..]);
    out
}

/// Substitute tokens across the concatenated text of `runs` and split the
/// result back into the same number of runs. `None` when nothing matched.
pub fn substitute_runs(runs: &[String], replacements: &Replacements) -> Option<Vec<String>> {
    let full = runs.concat();
    if !RE_TOKEN.is_match(&full) {
        return None;
    }

    let mut owners = Vec::with_capacity(full.len());
    for (i, run) in runs.iter().enumerate() {
        owners.extend(std::iter::repeat(i).take(run.len()));
    }

    let mut out = vec![String::new(); runs.len()];
    let mut cursor = 0;
    let mut changed = false;

    for m in RE_TOKEN.find_iter(&full) {
        let Some(value) = replacements.get(m.as_str()) else {
            continue;
        };
        copy_span(&full, &owners, cursor..m.start(), &mut out);
        out[owners[m.start()]].push_str(value);
        cursor = m.end();
        changed = true;
    }

    if !changed {
        return None;
    }
    copy_span(&full, &owners, cursor..full.len(), &mut out);
    Some(out)
}

fn copy_span(full: &str, owners: &[usize], span: std::ops::Range<usize>, out: &mut [String]) {
    let mut start = span.start;
    while start < span.end {
        let owner = owners[start];
        let mut end = start;
        while end < span.end && owners[end] == owner {
            end += 1;
        }
        out[owner].push_str(&full[start..end]);
        start = end;
    }
}

fn text_element_xml(text: &str) -> String {
    let body = text
        .split('\n')
        .map(escape_xml)
        .collect::<Vec<_>>()
        .join("</w:t><w:br/><w:t xml:space=\"preserve\">");
    format!("<w:t xml:space=\"preserve\">{body}</w:t>")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
