//! Summary tables of a reconciliation run.
//!
//! [`ReportBuilder`] turns the raw input, the canonical records and the run statistics into
//! five tables: a summary of the figures with percentages, the kept/removed split per
//! source, raw record and citation counts per publication year, and document types per year
//! of the reconciled set.
//!
//! ```
//! use bibunify::{Record, ReportBuilder, Source};
//! use bibunify::reconcile::Reconciler;
//!
//! let input = vec![
//!     Record {
//!         source: Source::Scopus,
//!         origin_id: "s1".to_string(),
//!         doi: Some("10.1/x".to_string()),
//!         title: "Deep Learning in X".to_string(),
//!         year: Some(2020),
//!         cited_by: Some(10),
//!         ..Default::default()
//!     },
//!     Record {
//!         source: Source::Wos,
//!         origin_id: "w1".to_string(),
//!         doi: Some("10.1/X".to_string()),
//!         title: "Deep Learning in X".to_string(),
//!         year: Some(2020),
//!         cited_by: Some(4),
//!         ..Default::default()
//!     },
//! ];
//! let reconciliation = Reconciler::new().reconcile(&input).unwrap();
//!
//! let tables = ReportBuilder::new().build(&input, &reconciliation.records, &reconciliation.stats());
//! assert_eq!(tables.counts_by_year[0].total, 2);
//! assert_eq!(tables.citations_by_year[0].total, 14);
//! assert_eq!(tables.distribution[1].removed, 1);
//! ```

use crate::reconcile::ReconciliationStats;
use crate::{CanonicalRecord, Record, Source};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::debug;

/// The tables of a report, in the order they are usually written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportTable {
    Summary,
    Distribution,
    CountsByYear,
    CitationsByYear,
    DocumentTypesByYear,
}

impl ReportTable {
    pub const ALL: [ReportTable; 5] = [
        ReportTable::Summary,
        ReportTable::Distribution,
        ReportTable::CountsByYear,
        ReportTable::CitationsByYear,
        ReportTable::DocumentTypesByYear,
    ];

    /// File stem used when the table is written on its own.
    pub fn name(&self) -> &'static str {
        match self {
            ReportTable::Summary => "stats_summary",
            ReportTable::Distribution => "dedup_distribution",
            ReportTable::CountsByYear => "raw_counts_by_year",
            ReportTable::CitationsByYear => "raw_citations_by_year",
            ReportTable::DocumentTypesByYear => "doc_types_by_year",
        }
    }
}

/// A figure of the summary table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryValue {
    Count(usize),
    /// Rounded to one decimal
    Percent(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Value")]
    pub value: SummaryValue,
}

/// Records kept and removed by deduplication for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    #[serde(rename = "Source")]
    pub source: &'static str,
    #[serde(rename = "Kept")]
    pub kept: usize,
    #[serde(rename = "Removed")]
    pub removed: usize,
    #[serde(rename = "Total")]
    pub total: usize,
    #[serde(rename = "Kept (%)")]
    pub kept_percent: f64,
    #[serde(rename = "Removed (%)")]
    pub removed_percent: f64,
}

/// Input records per publication year, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCountRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "WoS")]
    pub wos: usize,
    #[serde(rename = "Scopus")]
    pub scopus: usize,
    #[serde(rename = "Total Articles Raw")]
    pub total: usize,
}

/// Citations of the input records per publication year, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCitationRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "WoS Citations")]
    pub wos: u64,
    #[serde(rename = "Scopus Citations")]
    pub scopus: u64,
    #[serde(rename = "Total Citations Raw")]
    pub total: u64,
}

/// Canonical records per year and document type. `counts` lines up with `types`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTypeTable {
    pub types: Vec<String>,
    pub rows: Vec<(i32, Vec<usize>)>,
}

impl DocumentTypeTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count for one year and document type.
    pub fn count(&self, year: i32, document_type: &str) -> usize {
        let Some(column) = self.types.iter().position(|t| t == document_type) else {
            return 0;
        };
        self.rows
            .iter()
            .find(|(row_year, _)| *row_year == year)
            .map_or(0, |(_, counts)| counts[column])
    }
}

/// Every table of a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTables {
    pub summary: Vec<SummaryRow>,
    pub distribution: Vec<DistributionRow>,
    pub counts_by_year: Vec<YearCountRow>,
    pub citations_by_year: Vec<YearCitationRow>,
    pub document_types: DocumentTypeTable,
}

impl ReportTables {
    /// Value of a summary metric, by name.
    pub fn summary_value(&self, metric: &str) -> Option<SummaryValue> {
        self.summary
            .iter()
            .find(|row| row.metric == metric)
            .map(|row| row.value)
    }
}

/// Builds [`ReportTables`], optionally restricting the per-year tables to a year range.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    year_range: Option<RangeInclusive<i32>>,
}

impl ReportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only count publication years between `start` and `end`, inclusive, in the per-year
    /// tables. Records without a year never appear there.
    #[must_use]
    pub fn with_year_range(mut self, start: i32, end: i32) -> Self {
        self.year_range = Some(start..=end);
        self
    }

    pub fn build(
        &self,
        input: &[Record],
        records: &[CanonicalRecord],
        stats: &ReconciliationStats,
    ) -> ReportTables {
        let tables = ReportTables {
            summary: summary(records, stats),
            distribution: Source::ALL
                .iter()
                .map(|&source| distribution_row(source, records))
                .collect(),
            counts_by_year: self.counts_by_year(input),
            citations_by_year: self.citations_by_year(input),
            document_types: self.document_types(records),
        };

        debug!(
            years = tables.counts_by_year.len(),
            document_types = tables.document_types.types.len(),
            "built report tables"
        );
        tables
    }

    fn year_in_range(&self, year: Option<i32>) -> Option<i32> {
        year.filter(|year| {
            self.year_range
                .as_ref()
                .is_none_or(|range| range.contains(year))
        })
    }

    fn counts_by_year(&self, input: &[Record]) -> Vec<YearCountRow> {
        let mut years: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
        for record in input {
            if let Some(year) = self.year_in_range(record.year) {
                let (wos, scopus) = years.entry(year).or_default();
                match record.source {
                    Source::Wos => *wos += 1,
                    Source::Scopus => *scopus += 1,
                }
            }
        }

        years
            .into_iter()
            .map(|(year, (wos, scopus))| YearCountRow {
                year,
                wos,
                scopus,
                total: wos + scopus,
            })
            .collect()
    }

    fn citations_by_year(&self, input: &[Record]) -> Vec<YearCitationRow> {
        let mut years: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
        for record in input {
            if let Some(year) = self.year_in_range(record.year) {
                let citations = u64::from(record.cited_by.unwrap_or(0));
                let (wos, scopus) = years.entry(year).or_default();
                match record.source {
                    Source::Wos => *wos += citations,
                    Source::Scopus => *scopus += citations,
                }
            }
        }

        years
            .into_iter()
            .map(|(year, (wos, scopus))| YearCitationRow {
                year,
                wos,
                scopus,
                total: wos + scopus,
            })
            .collect()
    }

    fn document_types(&self, records: &[CanonicalRecord]) -> DocumentTypeTable {
        let mut counts: BTreeMap<i32, BTreeMap<&str, usize>> = BTreeMap::new();
        let mut types: BTreeSet<&str> = BTreeSet::new();

        for record in records {
            let (Some(year), Some(document_type)) =
                (self.year_in_range(record.year), record.document_type.as_deref())
            else {
                continue;
            };
            for kind in document_type.split(';').map(str::trim).filter(|t| !t.is_empty()) {
                types.insert(kind);
                *counts.entry(year).or_default().entry(kind).or_default() += 1;
            }
        }

        DocumentTypeTable {
            types: types.iter().map(|t| t.to_string()).collect(),
            rows: counts
                .into_iter()
                .map(|(year, by_type)| {
                    let row = types
                        .iter()
                        .map(|t| by_type.get(t).copied().unwrap_or(0))
                        .collect();
                    (year, row)
                })
                .collect(),
        }
    }
}

fn source_label(source: Source) -> &'static str {
    match source {
        Source::Scopus => "Scopus",
        Source::Wos => "WoS",
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

/// Canonical records whose survivor comes from `source`, and members of `source` absorbed
/// into another record.
fn kept_and_removed(source: Source, records: &[CanonicalRecord]) -> (usize, usize) {
    records.iter().fold((0, 0), |(kept, removed), record| {
        let survivor = record.members.first().is_some_and(|m| m.source == source);
        let absorbed = record
            .members
            .iter()
            .skip(1)
            .filter(|m| m.source == source)
            .count();
        (kept + usize::from(survivor), removed + absorbed)
    })
}

fn distribution_row(source: Source, records: &[CanonicalRecord]) -> DistributionRow {
    let (kept, removed) = kept_and_removed(source, records);
    let total = kept + removed;
    DistributionRow {
        source: source_label(source),
        kept,
        removed,
        total,
        kept_percent: percent(kept, total),
        removed_percent: percent(removed, total),
    }
}

fn summary(records: &[CanonicalRecord], stats: &ReconciliationStats) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    let mut push = |metric: String, value: SummaryValue| rows.push(SummaryRow { metric, value });

    let loaded = stats.input_records;
    let final_total = stats.canonical_records;
    let duplicated = stats.exact_groups + stats.fuzzy_groups;

    push("Loaded papers".to_string(), SummaryValue::Count(loaded));
    for source in Source::ALL {
        let label = source_label(source);
        let count = stats.input_by_source.get(&source).copied().unwrap_or(0);
        push(format!("Loaded {label}"), SummaryValue::Count(count));
        push(
            format!("Loaded {label} (%)"),
            SummaryValue::Percent(percent(count, loaded)),
        );
    }

    push(
        "Duplicated papers found".to_string(),
        SummaryValue::Count(duplicated),
    );
    push(
        "Duplicated papers found (%)".to_string(),
        SummaryValue::Percent(percent(duplicated, loaded)),
    );
    push(
        "Matched by DOI".to_string(),
        SummaryValue::Count(stats.exact_groups),
    );
    push(
        "Matched by title".to_string(),
        SummaryValue::Count(stats.fuzzy_groups),
    );

    for source in Source::ALL {
        let label = source_label(source);
        let loaded_from_source = stats.input_by_source.get(&source).copied().unwrap_or(0);
        let (_, removed) = kept_and_removed(source, records);
        push(
            format!("Removed duplicated {label}"),
            SummaryValue::Count(removed),
        );
        push(
            format!("Removed duplicated {label} (%)"),
            SummaryValue::Percent(percent(removed, loaded_from_source)),
        );
    }

    push(
        "Total after duplicates removal".to_string(),
        SummaryValue::Count(final_total),
    );
    for source in Source::ALL {
        let label = source_label(source);
        let (kept, _) = kept_and_removed(source, records);
        push(format!("Final {label}"), SummaryValue::Count(kept));
        push(
            format!("Final {label} (%)"),
            SummaryValue::Percent(percent(kept, final_total)),
        );
    }

    push(
        "Found in both databases".to_string(),
        SummaryValue::Count(stats.in_both),
    );
    rows
}
