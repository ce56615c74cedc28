//! Journal name harmonisation against a reference registry.
//!
//! Scopus and Web of Science spell journal names differently (`ARTS & HUMANITIES` versus
//! `Arts and Humanities`, abbreviations, trailing qualifiers). A registry maps a raw journal
//! name or ISSN to one canonical name so that canonical records from either database report
//! the same journal.
//!
//! [`ScimagoRegistry`] is built from a SCImago journal ranking table, where every row holds a
//! comma-separated list of ISSNs and the journal title. When the table also carries ranking
//! columns (`SJR`, `SJR Best Quartile`, `H index`, `Categories`, optionally `Year`), the
//! registry can attach them to canonical records with [`enrich_with_metrics`].
//!
//! ```
//! use bibunify::{JournalRegistry, ScimagoRegistry};
//!
//! let registry = ScimagoRegistry::from_entries([
//!     ("15424863, 00079235", "CA: A Cancer Journal for Clinicians"),
//!     ("00280836", "Nature (London)"),
//! ]);
//!
//! assert_eq!(registry.lookup_issn("1542-4863").as_deref(), Some("CA: A Cancer Journal for Clinicians"));
//! assert_eq!(registry.lookup("NATURE").as_deref(), Some("Nature"));
//! assert_eq!(registry.lookup("Science"), None);
//! ```

use crate::fuzzy::{DEFAULT_SIMILARITY_THRESHOLD, title_similarity};
use crate::normalize::{normalize_title, split_issns, strip_parenthesised};
use crate::{CanonicalRecord, Source};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Maps raw journal names or ISSNs to canonical journal names.
pub trait JournalRegistry {
    /// Canonical name for a raw journal name, or `None` when the registry has no match.
    fn lookup(&self, journal: &str) -> Option<String>;

    /// Canonical name for an ISSN.
    fn lookup_issn(&self, _issn: &str) -> Option<String> {
        None
    }
}

/// Ranking figures of one journal for one year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalMetrics {
    /// Ranking year; `None` for a table without a year column
    pub year: Option<i32>,
    /// SCImago Journal Rank
    pub sjr: Option<f64>,
    /// Best quartile over the journal's categories, `Q1` to `Q4`
    pub quartile: Option<String>,
    pub h_index: Option<u32>,
    /// Subject categories separated by `"; "`, without quartile qualifiers
    pub categories: Option<String>,
}

impl JournalMetrics {
    /// Whether these figures apply to a publication year.
    fn covers(&self, year: Option<i32>) -> bool {
        self.year.is_none() || self.year == year
    }
}

#[derive(Debug, Clone)]
struct RegistryTitle {
    /// Normalized title with its words sorted
    key: String,
    name: String,
    metrics: Option<JournalMetrics>,
}

/// Registry backed by a SCImago journal table.
///
/// Lookup by name tries an exact match on the normalized title first, then the most similar
/// title at or above the threshold. Word order is ignored when comparing titles. Returned
/// names have parenthesised qualifiers removed.
#[derive(Debug, Clone)]
pub struct ScimagoRegistry {
    /// ISSN to entry indices, in insertion order
    by_issn: HashMap<String, Vec<usize>>,
    titles: Vec<RegistryTitle>,
    threshold: f64,
}

impl Default for ScimagoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScimagoRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_issn: HashMap::new(),
            titles: Vec::new(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Builds a registry from `(issns, title)` rows. The first row naming an ISSN wins.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut registry = Self::new();
        for (issns, title) in entries {
            registry.insert(issns, title);
        }
        registry
    }

    /// Loads a `;`-delimited SCImago export with `Issn` and `Title` columns.
    ///
    /// The ranking columns `SJR` (decimal comma), `SJR Best Quartile`, `H index`,
    /// `Categories` and `Year` are read when present. Several yearly tables can be
    /// concatenated into one input as long as it has a `Year` column.
    ///
    /// # Errors
    ///
    /// `MissingField` if either column is absent, `InvalidFormat` if the table cannot be read.
    #[cfg(feature = "csv")]
    pub fn from_csv(input: &str) -> crate::Result<Self> {
        use crate::ReconcileError;
        use csv::ReaderBuilder;

        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(input.trim_start_matches('\u{feff}').as_bytes());

        let headers = reader.headers()?.clone();
        let optional = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let column =
            |name: &str| optional(name).ok_or_else(|| ReconcileError::MissingField(name.to_string()));
        let (issn_column, title_column) = (column("Issn")?, column("Title")?);
        let (sjr, quartile, h_index, categories, year) = (
            optional("SJR"),
            optional("SJR Best Quartile"),
            optional("H index"),
            optional("Categories"),
            optional("Year"),
        );
        let has_metrics = sjr.is_some() || quartile.is_some() || h_index.is_some();

        let mut registry = Self::new();
        for row in reader.records() {
            let row = row?;
            let (Some(issns), Some(title)) = (row.get(issn_column), row.get(title_column)) else {
                continue;
            };
            let cell = |column: Option<usize>| {
                column
                    .and_then(|c| row.get(c))
                    .map(str::trim)
                    .filter(|value| !value.is_empty() && *value != "-")
            };
            let metrics = has_metrics.then(|| JournalMetrics {
                year: cell(year).and_then(|value| value.parse().ok()),
                sjr: cell(sjr).and_then(|value| value.replace(',', ".").parse().ok()),
                quartile: cell(quartile).map(String::from),
                h_index: cell(h_index).and_then(|value| value.parse().ok()),
                categories: cell(categories).map(clean_categories),
            });
            registry.insert_entry(issns, title, metrics);
        }

        debug!(
            journals = registry.len(),
            issns = registry.by_issn.len(),
            "loaded journal registry"
        );
        Ok(registry)
    }

    /// Minimum similarity for a fuzzy title hit; clamped to `[0, 1]`. NaN is ignored.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        if !threshold.is_nan() {
            self.threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    pub fn insert(&mut self, issns: &str, title: &str) {
        self.insert_entry(issns, title, None);
    }

    /// Adds a journal together with its ranking figures for one year.
    pub fn insert_with_metrics(&mut self, issns: &str, title: &str, metrics: JournalMetrics) {
        self.insert_entry(issns, title, Some(metrics));
    }

    fn insert_entry(&mut self, issns: &str, title: &str, metrics: Option<JournalMetrics>) {
        let name = strip_parenthesised(title);
        let key = title_key(&name);
        if key.is_empty() {
            return;
        }

        let index = self.titles.len();
        self.titles.push(RegistryTitle { key, name, metrics });
        for issn in split_issns(issns) {
            self.by_issn.entry(issn).or_default().push(index);
        }
    }

    /// Ranking figures for a journal in a given year.
    ///
    /// Entries sharing one of the ISSNs and covering the year are tried first; without one,
    /// the journal name is matched against the titles covering the year, exactly or above
    /// the similarity threshold.
    pub fn metrics_for(
        &self,
        issn: Option<&str>,
        journal: Option<&str>,
        year: Option<i32>,
    ) -> Option<&JournalMetrics> {
        let ranked = |title: &&RegistryTitle| title.metrics.as_ref().is_some_and(|m| m.covers(year));

        let by_issn = issn.into_iter().flat_map(split_issns).find_map(|issn| {
            self.by_issn
                .get(&issn)?
                .iter()
                .map(|&index| &self.titles[index])
                .find(ranked)
        });

        by_issn
            .or_else(|| {
                let key = title_key(&strip_parenthesised(journal?));
                self.best_title(&key, self.titles.iter().filter(ranked))
            })
            .and_then(|title| title.metrics.as_ref())
    }

    /// The candidate whose key is most similar to `key`, at or above the threshold. An exact
    /// key scores 1, so it wins over any fuzzy hit; ties go to the earliest candidate.
    fn best_title<'a>(
        &self,
        key: &str,
        candidates: impl Iterator<Item = &'a RegistryTitle>,
    ) -> Option<&'a RegistryTitle> {
        if key.is_empty() {
            return None;
        }

        candidates
            .map(|t| (t, title_similarity(&t.key, key)))
            .filter(|(_, score)| *score >= self.threshold)
            .fold(None, |best: Option<(&'a RegistryTitle, f64)>, candidate| match best {
                Some((_, best_score)) if best_score >= candidate.1 => best,
                _ => Some(candidate),
            })
            .map(|(t, _)| t)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

impl JournalRegistry for ScimagoRegistry {
    fn lookup(&self, journal: &str) -> Option<String> {
        let key = title_key(&strip_parenthesised(journal));
        self.best_title(&key, self.titles.iter())
            .map(|t| t.name.clone())
    }

    fn lookup_issn(&self, issn: &str) -> Option<String> {
        split_issns(issn)
            .iter()
            .find_map(|issn| self.by_issn.get(issn)?.first())
            .map(|&index| self.titles[index].name.clone())
    }
}

/// Normalized title with its words sorted, so word order does not matter.
fn title_key(title: &str) -> String {
    normalize_title(title).split(' ').sorted_unstable().join(" ")
}

/// `Oncology (Q1); Hematology (Q2)` becomes `Oncology; Hematology`.
fn clean_categories(categories: &str) -> String {
    strip_parenthesised(categories)
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .join("; ")
}

/// Replace canonical journal names with registry names.
///
/// Records found only in Scopus keep their journal. Others are looked up by ISSN first,
/// then by journal name; a miss leaves the journal untouched. Returns how many records
/// changed.
pub fn apply_registry(records: &mut [CanonicalRecord], registry: &impl JournalRegistry) -> usize {
    let mut changed = 0;

    for record in records.iter_mut() {
        if record.sources() == [Source::Scopus] {
            continue;
        }

        let by_issn = record
            .issn
            .as_deref()
            .and_then(|issn| registry.lookup_issn(issn));
        let hit = by_issn.or_else(|| {
            record
                .journal
                .as_deref()
                .and_then(|journal| registry.lookup(journal))
        });

        if let Some(name) = hit {
            if record.journal.as_deref() != Some(name.as_str()) {
                record.journal = Some(name);
                changed += 1;
            }
        }
    }

    debug!(records = records.len(), changed, "applied journal registry");
    changed
}

/// Attach SJR ranking figures to canonical records.
///
/// Records are matched by ISSN and publication year, then by journal name and year. Records
/// without a match keep whatever metrics they already had. Returns how many records were
/// enriched.
pub fn enrich_with_metrics(records: &mut [CanonicalRecord], registry: &ScimagoRegistry) -> usize {
    let mut enriched = 0;

    for record in records.iter_mut() {
        let metrics = registry.metrics_for(
            record.issn.as_deref(),
            record.journal.as_deref(),
            record.year,
        );
        if let Some(metrics) = metrics {
            record.metrics = Some(metrics.clone());
            enriched += 1;
        }
    }

    debug!(records = records.len(), enriched, "attached journal metrics");
    enriched
}
