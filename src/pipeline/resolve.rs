//! Field resolution: turn a raw [`Record`] into the values printed on an
//! envelope or substituted into a letter.
//!
//! Every value is found by ordered-preference lookup across the column
//! spellings seen in real exports; the first non-empty value wins.

use crate::pipeline::records::{Record, ACCOUNT_NAME, FIRST_NAME, LAST_NAME};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STREET: &[&str] = &["Address (Street)", "Street Address"];
pub const CITY: &[&str] = &["Address (City)", "City"];
pub const STATE: &[&str] = &["Address (State/Province)", "State"];
pub const POSTAL_CODE: &[&str] = &["Address (Postal Code)", "Zip Code"];
pub const AMOUNT: &[&str] = &["amount after fees", "donation", "amount"];

/// Category-flag columns, in priority order.
pub const BUSINESS_FLAG: &str = "business friend of blue mound state park";
pub const FAMILY_FLAG: &str = "family friend of blue mound state park";
pub const INDIVIDUAL_FLAG: &str = "individual friend of blue mound state park";
pub const VOLUNTEER_FLAG: &str = "volunteer/working friend";

/// Greeting used whenever the relevant name field is empty.
pub const FALLBACK_SALUTATION: &str = "Friend";

/// First non-empty trimmed value among `aliases`, or `""`.
pub fn lookup<'a>(record: &'a Record, aliases: &[&str]) -> &'a str {
    aliases
        .iter()
        .map(|name| record.text(name))
        .find(|v| !v.is_empty())
        .unwrap_or("")
}

/// Make a name safe to use as a file stem: spaces become `_`, slashes `-`.
pub fn sanitize_file_stem(name: &str) -> String {
    name.replace(' ', "_").replace('/', "-")
}

fn full_name(record: &Record) -> String {
    format!("{} {}", record.text(FIRST_NAME), record.text(LAST_NAME))
        .trim()
        .to_string()
}

// ── Envelopes ────────────────────────────────────────────────────────────────

/// The three delivery lines of an envelope plus the name used for its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAddressee {
    pub name: String,
    pub street: String,
    pub city_state_zip: String,
    /// Account name, else "first last"; becomes the output file stem.
    pub file_label: String,
}

impl EnvelopeAddressee {
    pub fn lines(&self) -> [&str; 3] {
        [&self.name, &self.street, &self.city_state_zip]
    }
}

/// Resolve an envelope addressee, or `None` when the record has no street.
pub fn resolve_envelope(record: &Record) -> Option<EnvelopeAddressee> {
    let street = lookup(record, STREET);
    if street.is_empty() {
        return None;
    }

    let person = full_name(record);
    let account = record.text(ACCOUNT_NAME);
    let file_label = if account.is_empty() {
        person.clone()
    } else {
        account.to_string()
    };
    let name = if person.is_empty() {
        file_label.clone()
    } else {
        person
    };

    Some(EnvelopeAddressee {
        name,
        street: street.to_string(),
        city_state_zip: format!(
            "{}, {} {}",
            lookup(record, CITY),
            lookup(record, STATE),
            lookup(record, POSTAL_CODE)
        ),
        file_label,
    })
}

// ── Letters ──────────────────────────────────────────────────────────────────

/// Donor classification driving salutation and default amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonorCategory {
    Business,
    Family,
    #[default]
    Individual,
    Volunteer,
}

impl DonorCategory {
    /// Pick the category from whichever flag column is filled in, business
    /// first. Defaults to individual.
    pub fn of(record: &Record) -> Self {
        [
            (BUSINESS_FLAG, DonorCategory::Business),
            (FAMILY_FLAG, DonorCategory::Family),
            (INDIVIDUAL_FLAG, DonorCategory::Individual),
            (VOLUNTEER_FLAG, DonorCategory::Volunteer),
        ]
        .into_iter()
        .find(|(flag, _)| !record.text(flag).is_empty())
        .map(|(_, category)| category)
        .unwrap_or_default()
    }

    /// Amount printed when the record has no amount column filled in.
    pub fn default_amount(self) -> &'static str {
        match self {
            DonorCategory::Business => "100",
            DonorCategory::Family => "45",
            DonorCategory::Individual | DonorCategory::Volunteer => "25",
        }
    }
}

impl fmt::Display for DonorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DonorCategory::Business => "business",
            DonorCategory::Family => "family",
            DonorCategory::Individual => "individual",
            DonorCategory::Volunteer => "volunteer",
        };
        f.write_str(s)
    }
}

/// Everything a thank-you letter needs from one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterAddressee {
    pub category: DonorCategory,
    pub salutation: String,
    pub name: String,
    /// Street and "City, State Postal" separated by a newline.
    pub address_block: String,
    pub amount: String,
    /// Sanitized output file stem.
    pub file_stem: String,
}

pub fn salutation(record: &Record, category: DonorCategory) -> String {
    let or_friend = |s: &str| {
        if s.is_empty() {
            FALLBACK_SALUTATION.to_string()
        } else {
            s.to_string()
        }
    };
    match category {
        DonorCategory::Business => or_friend(record.text(ACCOUNT_NAME)),
        DonorCategory::Family => match record.text(LAST_NAME) {
            "" => FALLBACK_SALUTATION.to_string(),
            last => format!("{last} family"),
        },
        DonorCategory::Individual | DonorCategory::Volunteer => {
            or_friend(record.text(FIRST_NAME))
        }
    }
}

fn display_name(record: &Record, category: DonorCategory) -> String {
    let account = record.text(ACCOUNT_NAME);
    let candidate = match category {
        DonorCategory::Business => account.to_string(),
        _ => match full_name(record) {
            n if n.is_empty() => account.to_string(),
            n => n,
        },
    };
    if candidate.is_empty() {
        FALLBACK_SALUTATION.to_string()
    } else {
        candidate
    }
}

fn address_block(record: &Record) -> String {
    let city_state_zip = format!(
        "{}, {} {}",
        lookup(record, CITY),
        lookup(record, STATE),
        lookup(record, POSTAL_CODE)
    );
    let city_state_zip = city_state_zip.trim();
    let city_state_zip = city_state_zip
        .strip_prefix(',')
        .map(str::trim)
        .unwrap_or(city_state_zip);

    format!("{}\n{}", lookup(record, STREET), city_state_zip)
        .trim()
        .trim_end_matches(',')
        .to_string()
}

/// Resolve a letter addressee. Letters never skip a record.
pub fn resolve_letter(record: &Record) -> LetterAddressee {
    let category = DonorCategory::of(record);
    let name = display_name(record, category);

    let account = record.text(ACCOUNT_NAME);
    let file_stem = if account.is_empty() {
        sanitize_file_stem(&name)
    } else {
        sanitize_file_stem(account)
    };

    let amount = match lookup(record, AMOUNT) {
        "" => category.default_amount().to_string(),
        found => found.to_string(),
    };

    LetterAddressee {
        category,
        salutation: salutation(record, category),
        name,
        address_block: address_block(record),
        amount,
        file_stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::records::KeyStyle;

    fn envelope_row(pairs: &[(&str, &str)]) -> Record {
        Record::from_pairs(KeyStyle::Verbatim, pairs.iter().copied())
    }

    fn letter_row(pairs: &[(&str, &str)]) -> Record {
        Record::from_pairs(KeyStyle::Normalized, pairs.iter().copied())
    }

    #[test]
    fn sanitize_replaces_spaces_and_slashes() {
        assert_eq!(
            sanitize_file_stem("Jane & John Doe / Smith"),
            "Jane_&_John_Doe_-_Smith"
        );
    }

    #[test]
    fn lookup_prefers_first_non_empty_alias() {
        let r = envelope_row(&[("Address (Street)", "  "), ("Street Address", "1 Elm St")]);
        assert_eq!(lookup(&r, STREET), "1 Elm St");
        let r = envelope_row(&[("Address (Street)", "2 Oak"), ("Street Address", "1 Elm")]);
        assert_eq!(lookup(&r, STREET), "2 Oak");
        assert_eq!(lookup(&r, CITY), "");
    }

    #[test]
    fn envelope_without_street_is_skipped() {
        let r = envelope_row(&[("First Name", "Ada"), ("Address (City)", "Madison")]);
        assert!(resolve_envelope(&r).is_none());
    }

    #[test]
    fn envelope_prefers_person_name_for_the_name_line() {
        let r = envelope_row(&[
            ("Account Name", "Lovelace Household"),
            ("First Name", "Ada"),
            ("Last Name", "Lovelace"),
            ("Street Address", "12 Analytical Way"),
            ("City", "Mount Horeb"),
            ("State", "WI"),
            ("Zip Code", "53572"),
        ]);
        let a = resolve_envelope(&r).unwrap();
        assert_eq!(a.name, "Ada Lovelace");
        assert_eq!(a.file_label, "Lovelace Household");
        assert_eq!(a.city_state_zip, "Mount Horeb, WI 53572");
    }

    #[test]
    fn envelope_falls_back_to_account_name() {
        let r = envelope_row(&[("Account Name", "Acme Co"), ("Address (Street)", "9 Main")]);
        let a = resolve_envelope(&r).unwrap();
        assert_eq!(a.name, "Acme Co");
        assert_eq!(a.city_state_zip, ",  ");
    }

    #[test]
    fn category_priority_and_default() {
        let r = letter_row(&[(FAMILY_FLAG, "x"), (BUSINESS_FLAG, "yes")]);
        assert_eq!(DonorCategory::of(&r), DonorCategory::Business);
        let r = letter_row(&[(VOLUNTEER_FLAG, "1")]);
        assert_eq!(DonorCategory::of(&r), DonorCategory::Volunteer);
        let r = letter_row(&[(BUSINESS_FLAG, "  ")]);
        assert_eq!(DonorCategory::of(&r), DonorCategory::Individual);
    }

    #[test]
    fn default_amounts_by_category() {
        for (flag, expected) in [
            (BUSINESS_FLAG, "100"),
            (FAMILY_FLAG, "45"),
            (INDIVIDUAL_FLAG, "25"),
            (VOLUNTEER_FLAG, "25"),
        ] {
            let r = letter_row(&[(flag, "x"), ("Amount", "")]);
            assert_eq!(resolve_letter(&r).amount, expected, "flag {flag}");
        }
    }

    #[test]
    fn amount_alias_order() {
        let r = letter_row(&[("Amount", "10"), ("Donation", "20")]);
        assert_eq!(resolve_letter(&r).amount, "20");
        let r = letter_row(&[("Amount After Fees", "48.25"), ("Donation", "50")]);
        assert_eq!(resolve_letter(&r).amount, "48.25");
    }

    #[test]
    fn salutations() {
        let business = letter_row(&[(BUSINESS_FLAG, "x"), ("Account Name", "Acme")]);
        assert_eq!(resolve_letter(&business).salutation, "Acme");
        let family = letter_row(&[(FAMILY_FLAG, "x"), ("Last Name", "Doe")]);
        assert_eq!(resolve_letter(&family).salutation, "Doe family");
        let person = letter_row(&[("First Name", "Jane"), ("Last Name", "Doe")]);
        assert_eq!(resolve_letter(&person).salutation, "Jane");
        let volunteer = letter_row(&[(VOLUNTEER_FLAG, "x"), ("First Name", "Sam")]);
        assert_eq!(resolve_letter(&volunteer).salutation, "Sam");
    }

    #[test]
    fn salutations_fall_back_to_friend() {
        for flag in [BUSINESS_FLAG, FAMILY_FLAG, INDIVIDUAL_FLAG, VOLUNTEER_FLAG] {
            let r = letter_row(&[(flag, "x")]);
            assert_eq!(resolve_letter(&r).salutation, "Friend", "flag {flag}");
        }
    }

    #[test]
    fn letter_name_and_file_stem() {
        let r = letter_row(&[
            (BUSINESS_FLAG, "x"),
            ("Account Name", "Jane & John Doe / Smith"),
            ("First Name", "Jane"),
        ]);
        let l = resolve_letter(&r);
        assert_eq!(l.name, "Jane & John Doe / Smith");
        assert_eq!(l.file_stem, "Jane_&_John_Doe_-_Smith");

        let r = letter_row(&[("First Name", "Ada"), ("Last Name", "Lovelace")]);
        let l = resolve_letter(&r);
        assert_eq!(l.name, "Ada Lovelace");
        assert_eq!(l.file_stem, "Ada_Lovelace");
    }

    #[test]
    fn address_block_formats() {
        let r = letter_row(&[
            ("Address (Street)", "4 Park Rd"),
            ("Address (City)", "Blue Mounds"),
            ("Address (State/Province)", "WI"),
            ("Address (Postal Code)", "53517"),
        ]);
        assert_eq!(resolve_letter(&r).address_block, "4 Park Rd\nBlue Mounds, WI 53517");

        let r = letter_row(&[("Address (Street)", "4 Park Rd"), ("Address (State/Province)", "WI")]);
        assert_eq!(resolve_letter(&r).address_block, "4 Park Rd\nWI");

        let r = letter_row(&[]);
        assert_eq!(resolve_letter(&r).address_block, "");
    }
}
