//! Record loading and ordering.
//!
//! Member exports come from different tools with different header spellings
//! ("Account Name" in one, "account name " in another). A [`Record`] keeps the
//! [`KeyStyle`] it was loaded with so every lookup can use the canonical column
//! name and still hit the right field.

use crate::error::MailMergeError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column names the sorter looks for.
pub const ACCOUNT_NAME: &str = "Account Name";
pub const FIRST_NAME: &str = "First Name";
pub const LAST_NAME: &str = "Last Name";

/// How field names are stored and looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStyle {
    /// Names kept exactly as they appear in the header row.
    #[default]
    Verbatim,
    /// Names trimmed and lower-cased; values trimmed.
    Normalized,
}

impl KeyStyle {
    /// Apply this style to a field name.
    pub fn key(self, name: &str) -> String {
        match self {
            KeyStyle::Verbatim => name.to_string(),
            KeyStyle::Normalized => name.trim().to_lowercase(),
        }
    }

    fn value(self, raw: &str) -> String {
        match self {
            KeyStyle::Verbatim => raw.to_string(),
            KeyStyle::Normalized => raw.trim().to_string(),
        }
    }
}

/// One row of input data keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
    style: KeyStyle,
}

impl Record {
    pub fn new(style: KeyStyle) -> Self {
        Self {
            fields: HashMap::new(),
            style,
        }
    }

    /// Build a record from `(name, value)` pairs, as if read from a CSV row.
    pub fn from_pairs<'a>(
        style: KeyStyle,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut record = Self::new(style);
        for (name, value) in pairs {
            record.insert(name, value);
        }
        record
    }

    /// Insert a field. A repeated name only replaces the earlier value when
    /// the new value is non-empty.
    pub fn insert(&mut self, name: &str, value: &str) {
        let key = self.style.key(name);
        let value = self.style.value(value);
        match self.fields.get(&key) {
            Some(existing) if !existing.trim().is_empty() && value.trim().is_empty() => {}
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    /// Raw value of a field, if the column exists.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&self.style.key(name)).map(String::as_str)
    }

    /// Trimmed value of a field, empty when the column is absent.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).map(str::trim).unwrap_or("")
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(&self.style.key(name))
    }

    pub fn style(&self) -> KeyStyle {
        self.style
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Records read from a batch of CSV files.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<Record>,
    /// Input paths that could not be opened and were skipped.
    pub missing: Vec<PathBuf>,
}

/// Read every CSV file in `paths`, concatenating rows in load order.
///
/// A file that cannot be opened is logged and skipped; the rest of the batch
/// still loads. A file that opens but fails to parse aborts the load.
pub fn load_records(
    paths: &[PathBuf],
    style: KeyStyle,
) -> Result<LoadedRecords, MailMergeError> {
    let mut loaded = LoadedRecords::default();

    for path in paths {
        if !path.is_file() {
            warn!("Input file '{}' not found or not a file; skipping", path.display());
            loaded.missing.push(path.clone());
            continue;
        }
        let reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
            Ok(r) => r,
            Err(e) => {
                warn!("Input file '{}' not found or unreadable ({}); skipping", path.display(), e);
                loaded.missing.push(path.clone());
                continue;
            }
        };
        let rows = read_rows(reader, path, style)?;
        info!("Loaded {} records from {}", rows.len(), path.display());
        loaded.records.extend(rows);
    }

    Ok(loaded)
}

/// Parse CSV text held in memory. Used for tests and callers that already
/// have the data.
pub fn parse_records(
    data: &str,
    origin: &Path,
    style: KeyStyle,
) -> Result<Vec<Record>, MailMergeError> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    read_rows(reader, origin, style)
}

fn read_rows<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
    style: KeyStyle,
) -> Result<Vec<Record>, MailMergeError> {
    let parse_err = |e: csv::Error| MailMergeError::CsvParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_err)?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();
    debug!("{}: columns {:?}", path.display(), headers);

    let mut rows = Vec::new();
    for result in reader.records() {
        let row = result.map_err(parse_err)?;
        let mut record = Record::new(style);
        for (i, name) in headers.iter().enumerate() {
            record.insert(name, row.get(i).unwrap_or(""));
        }
        rows.push(record);
    }
    Ok(rows)
}

/// The field combination used to order a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    AccountName,
    FirstLastName,
    /// No usable column; input order kept.
    Unsorted,
}

/// Order records by account name, else by (first, last) name.
///
/// Column presence is decided by the first record. The sort is stable and
/// compares trimmed, lower-cased values, so rows lacking the field (an empty
/// key) keep their relative input order.
pub fn sort_records(records: &mut [Record]) -> SortKey {
    let Some(first) = records.first() else {
        return SortKey::Unsorted;
    };

    if first.has_field(ACCOUNT_NAME) {
        records.sort_by_cached_key(|r| fold(r, ACCOUNT_NAME));
        SortKey::AccountName
    } else if first.has_field(FIRST_NAME) && first.has_field(LAST_NAME) {
        records.sort_by(|a, b| compare_names(a, b));
        SortKey::FirstLastName
    } else {
        warn!("No suitable columns for sorting; keeping input order");
        SortKey::Unsorted
    }
}

fn fold(record: &Record, name: &str) -> String {
    record.text(name).to_lowercase()
}

fn compare_names(a: &Record, b: &Record) -> Ordering {
    fold(a, FIRST_NAME)
        .cmp(&fold(b, FIRST_NAME))
        .then_with(|| fold(a, LAST_NAME).cmp(&fold(b, LAST_NAME)))
}
