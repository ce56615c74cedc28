//! Field cleanup applied to canonical records after reconciliation.
//!
//! Nothing here influences which records are grouped together; it only harmonises how the
//! surviving fields read, so that the reconciled dataset can be analysed without caring
//! which database a value came from.

use crate::CanonicalRecord;
use crate::normalize::split_issns;
use crate::regex::{Captures, Regex};
use std::ops::RangeInclusive;
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_OPEN_ACCESS: &str = "subscription";

/// Author name lists in brackets, as in WoS addresses: `[Smith, J; Doe, J] Univ X, USA`.
static BRACKETED_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

/// Country spellings harmonised across databases.
const COUNTRY_NAMES: &[(&str, &str)] = &[
    (r"\b(?:u\.s\.a\.|usa|united states of america|united states)(?:\b|$)", "United States"),
    (r"\b(?:u\.k\.|uk|united kingdom)(?:\b|$)", "United Kingdom"),
    (r"\b(?:england|scotland|wales|northern ireland)\b", "United Kingdom"),
    (r"\brepublic of korea\b", "South Korea"),
    (r"\bpeoples r china\b", "China"),
    (r"\brussian federation\b", "Russia"),
    (r"\bviet ?nam\b", "Vietnam"),
    (r"\bc[oô]te d'ivoire\b", "Ivory Coast"),
    (r"\bcote ivoire\b", "Ivory Coast"),
    (r"\bdominican rep\b", "Dominican Republic"),
    (r"\btrinidad tobago\b", "Trinidad and Tobago"),
    (r"\btimor leste\b", "Timor-Leste"),
    (r"\bst vincent\b", "Saint Vincent and the Grenadines"),
    (r"\bsao tome & prin\b", "Sao Tome and Principe"),
    (r"\bst lucia\b", "Saint Lucia"),
    (r"\bst kitts & nevi\b", "Saint Kitts and Nevis"),
    (r"\bpapua n guinea\b", "Papua New Guinea"),
    (r"\bguinea bissau\b", "Guinea-Bissau"),
    (r"\bcent afr republ\b", "Central African Republic"),
    (r"\bcape verde\b", "Cabo Verde"),
    (r"\bbrunei\b", "Brunei Darussalam"),
    (r"\b(?:dem rep congo|democratic republic of the congo)\b", "Congo"),
    (r"\bturkiye\b", "Turkey"),
    (r"\bst martin\b", "Saint Martin"),
];

static COUNTRY_REGEXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    COUNTRY_NAMES
        .iter()
        .map(|(pattern, name)| (Regex::new(&format!("(?i){pattern}")).unwrap(), *name))
        .collect()
});

/// Replace known country spelling variants with one name.
///
/// ```
/// use bibunify::postmerge::harmonise_countries;
///
/// assert_eq!(
///     harmonise_countries("Univ Oxford, Oxford, England; MIT, Cambridge, MA USA"),
///     "Univ Oxford, Oxford, United Kingdom; MIT, Cambridge, MA United States"
/// );
/// ```
pub fn harmonise_countries(text: &str) -> String {
    COUNTRY_REGEXES
        .iter()
        .fold(text.to_string(), |text, (regex, name)| {
            regex.replace_all(&text, *name).into_owned()
        })
}

/// Drop the commas inside bracketed author lists, leaving the rest untouched.
pub fn strip_bracketed_commas(text: &str) -> String {
    BRACKETED_REGEX
        .replace_all(text, |caps: &Captures| caps[0].replace(',', ""))
        .into_owned()
}

/// Cleans canonical records and optionally restricts them to a publication year range.
///
/// # Examples
///
/// ```
/// use bibunify::CanonicalRecord;
/// use bibunify::postmerge::PostMergeNormalizer;
///
/// let normalizer = PostMergeNormalizer::new().with_year_range(2015, 2025);
/// let records = vec![
///     CanonicalRecord { year: Some(2020), issn: Some("1234-5678".to_string()), ..Default::default() },
///     CanonicalRecord { year: Some(2010), ..Default::default() },
/// ];
///
/// let (kept, filtered_out) = normalizer.apply_all(records);
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].issn.as_deref(), Some("12345678"));
/// assert_eq!(kept[0].open_access.as_deref(), Some("subscription"));
/// assert_eq!(filtered_out.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PostMergeNormalizer {
    open_access_default: String,
    year_range: Option<RangeInclusive<i32>>,
}

impl Default for PostMergeNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PostMergeNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            open_access_default: DEFAULT_OPEN_ACCESS.to_string(),
            year_range: None,
        }
    }

    /// Keep only records published between `start` and `end`, inclusive. Records without a
    /// year are filtered out once a range is set.
    #[must_use]
    pub fn with_year_range(mut self, start: i32, end: i32) -> Self {
        self.year_range = Some(start..=end);
        self
    }

    #[must_use]
    pub fn with_open_access_default(mut self, value: &str) -> Self {
        self.open_access_default = value.to_string();
        self
    }

    /// Clean one record in place.
    pub fn apply(&self, record: &mut CanonicalRecord) {
        if let Some(affiliations) = record.affiliations.as_deref() {
            record.affiliations = Some(harmonise_countries(&strip_bracketed_commas(affiliations)));
        }

        if record
            .open_access
            .as_deref()
            .is_none_or(|value| value.trim().is_empty())
        {
            record.open_access = Some(self.open_access_default.clone());
        }

        if let Some(issn) = record.issn.as_deref() {
            let issns = split_issns(issn);
            record.issn = (!issns.is_empty()).then(|| issns.join(", "));
        }
    }

    /// Whether a record falls inside the configured year range.
    pub fn in_range(&self, record: &CanonicalRecord) -> bool {
        match &self.year_range {
            Some(range) => record.year.is_some_and(|year| range.contains(&year)),
            None => true,
        }
    }

    /// Clean every record and split them into `(kept, filtered_out)` by year range.
    pub fn apply_all(
        &self,
        records: Vec<CanonicalRecord>,
    ) -> (Vec<CanonicalRecord>, Vec<CanonicalRecord>) {
        let (mut kept, filtered_out): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| self.in_range(record));

        for record in &mut kept {
            self.apply(record);
        }

        debug!(
            kept = kept.len(),
            filtered_out = filtered_out.len(),
            "post-merge normalization"
        );
        (kept, filtered_out)
    }
}
