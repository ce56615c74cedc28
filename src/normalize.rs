//! Matching key normalization.
//!
//! Titles and DOIs arrive in whatever shape the exporting database produced: mixed case,
//! stray punctuation, HTML markup, `<U+XXXX>` escapes, resolver URLs, `[doi]` suffixes.
//! The functions here turn them into canonical keys that can be compared with plain string
//! equality or a string similarity metric.
//!
//! Both normalizers are deterministic and idempotent:
//!
//! ```
//! use bibunify::normalize::{normalize_doi, normalize_title};
//!
//! let title = normalize_title("  Análisis de   \"Redes\", 2<sup>nd</sup> ed. ");
//! assert_eq!(title, "analisis de redes 2nd ed");
//! assert_eq!(normalize_title(&title), title);
//!
//! let doi = normalize_doi("https://doi.org/10.1000/ABC.").unwrap();
//! assert_eq!(doi, "10.1000/abc");
//! assert_eq!(normalize_doi(&doi).as_deref(), Some("10.1000/abc"));
//! ```

use crate::Record;
use crate::regex::{Captures, Regex};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static UNICODE_ESCAPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<U\+([0-9A-Fa-f]+)>").unwrap());

/// A registrant prefix (`10.` followed by dotted digits), a slash, and a non-empty suffix.
static DOI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.[0-9]+(?:\.[0-9]+)*/\S+").unwrap());

/// An ISSN with or without its hyphen, e.g. `1234-567X` or `1234567X`.
static ISSN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4}-?[0-9]{3}[0-9Xx]").unwrap());

static PARENTHESISED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

const MARKUP_REPLACEMENTS: [(&str, &str); 11] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("<sup>", ""),
    ("</sup>", ""),
    ("<sub>", ""),
    ("</sub>", ""),
    ("<inf>", ""),
    ("</inf>", ""),
    ("<i>", ""),
    ("</i>", ""),
];

const DOI_TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '"', '\''];

/// Canonicalize a title for comparison.
///
/// Escapes are decoded, accents folded to their base letters, markup removed, everything
/// lowercased, punctuation turned into spaces and whitespace runs collapsed. An input with
/// no alphanumeric content normalizes to the empty string.
pub fn normalize_title(title: &str) -> String {
    let decoded = convert_unicode_escapes(title);

    let mut folded: String = decoded
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    for (from, to) in MARKUP_REPLACEMENTS {
        folded = folded.replace(from, to);
    }

    folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

/// Canonicalize a DOI, returning `None` when no plausible DOI is present.
///
/// Resolver hosts (`https://doi.org/`, `dx.doi.org`), `doi:` labels, PubMed style `[doi]`
/// suffixes, whitespace and trailing punctuation are dropped and the result is lowercased.
pub fn normalize_doi(doi: &str) -> Option<String> {
    let compact: String = doi
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    if compact.is_empty() {
        return None;
    }

    let found = DOI_REGEX.find(&compact)?;
    let candidate = trim_doi_suffix(found.as_str());

    match candidate.split_once('/') {
        Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => {
            Some(candidate.to_string())
        }
        _ => None,
    }
}

/// Strip trailing punctuation, `[doi]` markers and closing parentheses that have no
/// opening partner, until none is left.
fn trim_doi_suffix(mut doi: &str) -> &str {
    loop {
        let trimmed = doi
            .trim_end_matches(DOI_TRAILING_PUNCTUATION)
            .trim_end_matches("[doi]");
        let unbalanced = trimmed.ends_with(')')
            && trimmed.matches('(').count() < trimmed.matches(')').count();
        let trimmed = if unbalanced {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if trimmed.len() == doi.len() {
            return doi;
        }
        doi = trimmed;
    }
}

/// Replace `<U+XXXX>` escape sequences, as found in some database exports, with the
/// characters they denote. Invalid code points are left untouched.
pub fn convert_unicode_escapes(input: &str) -> String {
    UNICODE_ESCAPE_REGEX
        .replace_all(input, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// Every ISSN found in `value`, reduced to its eight digits (a trailing check digit may be
/// `X`).
///
/// ```
/// use bibunify::normalize::split_issns;
///
/// assert_eq!(split_issns("1542-4863, 0007923x"), vec!["15424863", "0007923X"]);
/// assert!(split_issns("n/a").is_empty());
/// ```
pub fn split_issns(value: &str) -> Vec<String> {
    ISSN_REGEX
        .find_iter(value)
        .map(|m| m.as_str().replace('-', "").to_uppercase())
        .collect()
}

/// Remove parenthesised qualifiers such as author ids or country suffixes, collapsing the
/// whitespace left behind.
pub fn strip_parenthesised(value: &str) -> String {
    PARENTHESISED_REGEX
        .replace_all(value, " ")
        .split_whitespace()
        .join(" ")
}

/// Key a record can be matched on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKey {
    /// Normalized DOI; authoritative when present
    Doi(String),
    /// Normalized title and publication year, compared approximately
    Title { title: String, year: Option<i32> },
}

/// Normalized keys of one record, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub doi: Option<String>,
    pub title: String,
    pub year: Option<i32>,
}

impl RecordKeys {
    pub fn from_record(record: &Record) -> Self {
        Self {
            doi: record.doi.as_deref().and_then(normalize_doi),
            title: normalize_title(&record.title),
            year: record.year,
        }
    }

    /// The key this record is matched on, or `None` when it has neither a usable DOI nor
    /// a usable title.
    pub fn match_key(&self) -> Option<MatchKey> {
        match &self.doi {
            Some(doi) => Some(MatchKey::Doi(doi.clone())),
            None if !self.title.is_empty() => Some(MatchKey::Title {
                title: self.title.clone(),
                year: self.year,
            }),
            None => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.match_key().is_none()
    }
}
