//! CSV reports of a reconciliation run.
//!
//! Two tables are produced: the canonical records, with column names following the Scopus
//! export schema, and the audit log with one row per input record. The summary tables of a
//! [`ReportTables`] set are written one CSV per table with [`write_table`] or
//! [`write_tables`].
//!
//! # Example
//!
//! ```
//! use bibunify::{CsvExporter, Record, ReportSink, Source};
//! use bibunify::reconcile::Reconciler;
//!
//! let records = vec![Record {
//!     source: Source::Wos,
//!     origin_id: "WOS:1".to_string(),
//!     title: "Deep Learning".to_string(),
//!     year: Some(2020),
//!     ..Default::default()
//! }];
//! let reconciliation = Reconciler::new().reconcile(&records).unwrap();
//!
//! let mut exporter = CsvExporter::new(Vec::new(), Vec::new());
//! exporter.report(&reconciliation.records, &reconciliation.audit).unwrap();
//! let (records_csv, audit_csv) = exporter.into_inner().unwrap();
//!
//! assert!(String::from_utf8(records_csv).unwrap().contains("Deep Learning,2020"));
//! assert!(String::from_utf8(audit_csv).unwrap().contains("WOS:1"));
//! ```

use crate::normalize::MatchKey;
use crate::reconcile::AuditLog;
use crate::report::{ReportTable, ReportTables};
use crate::{CanonicalRecord, ReconcileError, Result};
use csv::Writer;
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

/// Destination for the results of a reconciliation run.
pub trait ReportSink {
    /// Write the canonical records and the audit log describing them.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the output cannot be written
    fn report(&mut self, records: &[CanonicalRecord], audit: &AuditLog) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct CanonicalRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Year")]
    year: Option<i32>,
    #[serde(rename = "DOI")]
    doi: Option<&'a str>,
    #[serde(rename = "Source title")]
    journal: Option<&'a str>,
    #[serde(rename = "ISSN")]
    issn: Option<&'a str>,
    #[serde(rename = "Authors")]
    authors: String,
    #[serde(rename = "Document Type")]
    document_type: Option<&'a str>,
    #[serde(rename = "Open Access")]
    open_access: Option<&'a str>,
    #[serde(rename = "Affiliations")]
    affiliations: Option<&'a str>,
    #[serde(rename = "Cited by")]
    cited_by: Option<u32>,
    #[serde(rename = "Source")]
    sources: String,
    #[serde(rename = "In_Both")]
    in_both: u8,
    #[serde(rename = "EID")]
    origin_ids: String,
    #[serde(rename = "SJR")]
    sjr: Option<f64>,
    #[serde(rename = "SJR Best Quartile")]
    quartile: Option<&'a str>,
    #[serde(rename = "H index")]
    h_index: Option<u32>,
    #[serde(rename = "Categories")]
    categories: Option<&'a str>,
}

impl<'a> From<&'a CanonicalRecord> for CanonicalRow<'a> {
    fn from(record: &'a CanonicalRecord) -> Self {
        let metrics = record.metrics.as_ref();
        Self {
            title: &record.title,
            year: record.year,
            doi: record.doi.as_deref(),
            journal: record.journal.as_deref(),
            issn: record.issn.as_deref(),
            authors: record.authors.join("; "),
            document_type: record.document_type.as_deref(),
            open_access: record.open_access.as_deref(),
            affiliations: record.affiliations.as_deref(),
            cited_by: record.cited_by,
            sources: record.sources().iter().join("; "),
            in_both: u8::from(record.in_both()),
            origin_ids: record.origin_ids().join("; "),
            sjr: metrics.and_then(|m| m.sjr),
            quartile: metrics.and_then(|m| m.quartile.as_deref()),
            h_index: metrics.and_then(|m| m.h_index),
            categories: metrics.and_then(|m| m.categories.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    canonical_index: usize,
    matched_by: &'static str,
    key: String,
    source: &'static str,
    origin_id: &'a str,
    survivor: bool,
    warnings: String,
}

fn key_text(key: Option<&MatchKey>) -> String {
    match key {
        Some(MatchKey::Doi(doi)) => doi.clone(),
        Some(MatchKey::Title {
            title,
            year: Some(year),
        }) => format!("{title} ({year})"),
        Some(MatchKey::Title { title, year: None }) => title.clone(),
        None => String::new(),
    }
}

/// Writes the canonical records and the audit log as two CSV tables.
pub struct CsvExporter<W: Write> {
    records: Writer<W>,
    audit: Writer<W>,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(records_out: W, audit_out: W) -> Self {
        Self {
            records: Writer::from_writer(records_out),
            audit: Writer::from_writer(audit_out),
        }
    }

    pub fn write_records(&mut self, records: &[CanonicalRecord]) -> Result<()> {
        for record in records {
            self.records.serialize(CanonicalRow::from(record))?;
        }
        self.records.flush()?;
        Ok(())
    }

    pub fn write_audit(&mut self, audit: &AuditLog) -> Result<()> {
        for entry in &audit.entries {
            let key = key_text(entry.key.as_ref());
            let warnings = entry.warnings.iter().join("; ");
            for (position, member) in entry.members.iter().enumerate() {
                self.audit.serialize(AuditRow {
                    canonical_index: entry.canonical_index,
                    matched_by: entry.matched_by.as_str(),
                    key: key.clone(),
                    source: member.source.as_str(),
                    origin_id: &member.origin_id,
                    survivor: position == 0,
                    warnings: warnings.clone(),
                })?;
            }
        }
        self.audit.flush()?;
        Ok(())
    }

    /// Recover the underlying writers `(records, audit)`.
    pub fn into_inner(self) -> Result<(W, W)> {
        let records = self
            .records
            .into_inner()
            .map_err(|e| ReconcileError::Io(e.into_error()))?;
        let audit = self
            .audit
            .into_inner()
            .map_err(|e| ReconcileError::Io(e.into_error()))?;
        Ok((records, audit))
    }
}

/// Write one table of a report as CSV, returning the underlying writer.
///
/// # Errors
///
/// Returns `ReconcileError` if the output cannot be written
pub fn write_table<W: Write>(tables: &ReportTables, table: ReportTable, out: W) -> Result<W> {
    let mut writer = Writer::from_writer(out);

    match table {
        ReportTable::Summary => serialize_all(&mut writer, &tables.summary)?,
        ReportTable::Distribution => serialize_all(&mut writer, &tables.distribution)?,
        ReportTable::CountsByYear => serialize_all(&mut writer, &tables.counts_by_year)?,
        ReportTable::CitationsByYear => serialize_all(&mut writer, &tables.citations_by_year)?,
        ReportTable::DocumentTypesByYear => {
            let document_types = &tables.document_types;
            if !document_types.is_empty() {
                writer.write_record(
                    std::iter::once("Year").chain(document_types.types.iter().map(String::as_str)),
                )?;
            }
            for (year, counts) in &document_types.rows {
                writer.write_record(
                    std::iter::once(year.to_string()).chain(counts.iter().map(usize::to_string)),
                )?;
            }
        }
    }

    writer
        .into_inner()
        .map_err(|e| ReconcileError::Io(e.into_error()))
}

/// Write every table of a report, asking `open` for the destination of each.
///
/// ```no_run
/// use bibunify::export::write_tables;
/// use bibunify::report::ReportTables;
/// use std::fs::File;
///
/// # fn run(tables: &ReportTables) -> bibunify::Result<()> {
/// write_tables(tables, |table| Ok(File::create(format!("{}.csv", table.name()))?))?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns `ReconcileError` if a destination cannot be opened or written
pub fn write_tables<W, F>(tables: &ReportTables, mut open: F) -> Result<()>
where
    W: Write,
    F: FnMut(ReportTable) -> Result<W>,
{
    for table in ReportTable::ALL {
        let mut out = write_table(tables, table, open(table)?)?;
        out.flush()?;
    }
    debug!(tables = ReportTable::ALL.len(), "exported report tables");
    Ok(())
}

fn serialize_all<W: Write, T: Serialize>(writer: &mut Writer<W>, rows: &[T]) -> Result<()> {
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(())
}

impl<W: Write> ReportSink for CsvExporter<W> {
    fn report(&mut self, records: &[CanonicalRecord], audit: &AuditLog) -> Result<()> {
        self.write_records(records)?;
        self.write_audit(audit)?;
        debug!(
            records = records.len(),
            audit_entries = audit.len(),
            "exported reconciliation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{AuditEntry, AuditWarning};
    use crate::report::{
        DistributionRow, DocumentTypeTable, SummaryRow, SummaryValue, YearCitationRow, YearCountRow,
    };
    use crate::{JournalMetrics, MatchKind, Provenance, Source};
    use pretty_assertions::assert_eq;

    fn provenance(source: Source, origin_id: &str) -> Provenance {
        Provenance {
            source,
            origin_id: origin_id.to_string(),
        }
    }

    fn export(records: &[CanonicalRecord], audit: &AuditLog) -> (String, String) {
        let mut exporter = CsvExporter::new(Vec::new(), Vec::new());
        exporter.report(records, audit).unwrap();
        let (records_csv, audit_csv) = exporter.into_inner().unwrap();
        (
            String::from_utf8(records_csv).unwrap(),
            String::from_utf8(audit_csv).unwrap(),
        )
    }

    #[test]
    fn test_export() {
        let records = vec![CanonicalRecord {
            doi: Some("10.1/x".to_string()),
            title: "Deep Learning in X".to_string(),
            year: Some(2020),
            authors: vec!["Smith, John".to_string(), "Doe, Jane".to_string()],
            cited_by: Some(7),
            members: vec![provenance(Source::Scopus, "s1"), provenance(Source::Wos, "w1")],
            ..Default::default()
        }];
        let audit = AuditLog {
            entries: vec![AuditEntry {
                canonical_index: 0,
                matched_by: MatchKind::Exact,
                key: Some(MatchKey::Doi("10.1/x".to_string())),
                members: records[0].members.clone(),
                warnings: Vec::new(),
            }],
        };

        let (records_csv, audit_csv) = export(&records, &audit);

        assert_eq!(
            records_csv,
            "\
Title,Year,DOI,Source title,ISSN,Authors,Document Type,Open Access,Affiliations,Cited by,Source,In_Both,EID,SJR,SJR Best Quartile,H index,Categories
Deep Learning in X,2020,10.1/x,,,\"Smith, John; Doe, Jane\",,,,7,SCOPUS; WOS,1,s1; w1,,,,
"
        );
        assert_eq!(
            audit_csv,
            "\
canonical_index,matched_by,key,source,origin_id,survivor,warnings
0,exact,10.1/x,SCOPUS,s1,true,
0,exact,10.1/x,WOS,w1,false,
"
        );
    }

    #[test]
    fn test_export_warnings_and_title_keys() {
        let records = vec![CanonicalRecord {
            title: "Graph Networks".to_string(),
            members: vec![provenance(Source::Wos, "w2")],
            ..Default::default()
        }];
        let audit = AuditLog {
            entries: vec![AuditEntry {
                canonical_index: 0,
                matched_by: MatchKind::Singleton,
                key: Some(MatchKey::Title {
                    title: "graph networks".to_string(),
                    year: Some(2021),
                }),
                members: records[0].members.clone(),
                warnings: vec![AuditWarning::MalformedRecord {
                    record: provenance(Source::Wos, "w2"),
                }],
            }],
        };

        let (records_csv, audit_csv) = export(&records, &audit);

        assert!(records_csv.ends_with("Graph Networks,,,,,,,,,,WOS,0,w2,,,,\n"));
        assert!(audit_csv.contains(
            "0,singleton,graph networks (2021),WOS,w2,true,record WOS:w2 has neither DOI nor title\n"
        ));
    }

    #[test]
    fn test_export_journal_metrics() {
        let records = vec![CanonicalRecord {
            title: "Deep Learning in X".to_string(),
            metrics: Some(JournalMetrics {
                year: Some(2021),
                sjr: Some(18.509),
                quartile: Some("Q1".to_string()),
                h_index: Some(1331),
                categories: Some("Multidisciplinary".to_string()),
            }),
            members: vec![provenance(Source::Scopus, "s1")],
            ..Default::default()
        }];

        let (records_csv, _) = export(&records, &AuditLog::default());
        assert!(records_csv.ends_with(",SCOPUS,0,s1,18.509,Q1,1331,Multidisciplinary\n"));
    }

    fn table_text(tables: &ReportTables, table: ReportTable) -> String {
        String::from_utf8(write_table(tables, table, Vec::new()).unwrap()).unwrap()
    }

    fn report_tables() -> ReportTables {
        ReportTables {
            summary: vec![
                SummaryRow {
                    metric: "Loaded papers".to_string(),
                    value: SummaryValue::Count(5),
                },
                SummaryRow {
                    metric: "Loaded WoS (%)".to_string(),
                    value: SummaryValue::Percent(60.0),
                },
            ],
            distribution: vec![DistributionRow {
                source: "WoS",
                kept: 2,
                removed: 1,
                total: 3,
                kept_percent: 66.7,
                removed_percent: 33.3,
            }],
            counts_by_year: vec![YearCountRow {
                year: 2020,
                wos: 1,
                scopus: 2,
                total: 3,
            }],
            citations_by_year: vec![YearCitationRow {
                year: 2020,
                wos: 4,
                scopus: 10,
                total: 14,
            }],
            document_types: DocumentTypeTable {
                types: vec!["Article".to_string(), "Review".to_string()],
                rows: vec![(2020, vec![2, 0]), (2021, vec![1, 1])],
            },
        }
    }

    #[test]
    fn test_write_report_tables() {
        let tables = report_tables();

        assert_eq!(
            table_text(&tables, ReportTable::Summary),
            "Metric,Value\nLoaded papers,5\nLoaded WoS (%),60.0\n"
        );
        assert_eq!(
            table_text(&tables, ReportTable::Distribution),
            "Source,Kept,Removed,Total,Kept (%),Removed (%)\nWoS,2,1,3,66.7,33.3\n"
        );
        assert_eq!(
            table_text(&tables, ReportTable::CountsByYear),
            "Year,WoS,Scopus,Total Articles Raw\n2020,1,2,3\n"
        );
        assert_eq!(
            table_text(&tables, ReportTable::CitationsByYear),
            "Year,WoS Citations,Scopus Citations,Total Citations Raw\n2020,4,10,14\n"
        );
        assert_eq!(
            table_text(&tables, ReportTable::DocumentTypesByYear),
            "Year,Article,Review\n2020,2,0\n2021,1,1\n"
        );
    }

    #[test]
    fn test_write_tables_opens_one_destination_per_table() {
        let tables = report_tables();
        let mut opened = Vec::new();

        write_tables(&tables, |table| {
            opened.push(table.name());
            Ok(Vec::<u8>::new())
        })
        .unwrap();

        assert_eq!(
            opened,
            vec![
                "stats_summary",
                "dedup_distribution",
                "raw_counts_by_year",
                "raw_citations_by_year",
                "doc_types_by_year",
            ]
        );
        assert!(table_text(&ReportTables::default(), ReportTable::DocumentTypesByYear).is_empty());
    }

    #[test]
    fn test_empty_report_writes_nothing() {
        let (records_csv, audit_csv) = export(&[], &AuditLog::default());
        assert!(records_csv.is_empty());
        assert!(audit_csv.is_empty());
    }
}
