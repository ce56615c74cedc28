//! Reconciliation of bibliographic exports from Scopus and Web of Science.
//!
//! `bibunify` takes records exported from two literature databases and turns them into one
//! de-duplicated dataset. Records that describe the same publication are grouped together,
//! either because they share a DOI or because their titles are nearly identical and their
//! publication years agree, and every group is collapsed into a single canonical record.
//!
//! # Key Features
//!
//! - **Exact matching** on normalized DOIs (resolver prefixes, case and trailing punctuation
//!   are ignored)
//! - **Fuzzy matching** on normalized titles, gated by a publication-year window
//! - **Transitive grouping** through a disjoint-set, so near-duplicate title chains end up in
//!   one group
//! - **Deterministic merging** with a documented source priority (Scopus before WoS)
//! - **Audit trail** listing every absorbed record and the matcher that absorbed it
//! - Optional loaders for Scopus/WoS CSV exports, a SCImago-style journal registry with SJR
//!   metrics, summary report tables and a CSV exporter
//!
//! # Basic Usage
//!
//! ```rust
//! use bibunify::{Record, Source};
//! use bibunify::reconcile::Reconciler;
//!
//! let records = vec![
//!     Record {
//!         source: Source::Scopus,
//!         origin_id: "2-s2.0-1".to_string(),
//!         doi: Some("10.1/X".to_string()),
//!         title: "Deep Learning in X".to_string(),
//!         year: Some(2020),
//!         ..Default::default()
//!     },
//!     Record {
//!         source: Source::Wos,
//!         origin_id: "WOS:1".to_string(),
//!         doi: Some("https://doi.org/10.1/x".to_string()),
//!         title: "DEEP LEARNING IN X".to_string(),
//!         year: Some(2021),
//!         ..Default::default()
//!     },
//! ];
//!
//! let reconciliation = Reconciler::new().reconcile(&records).unwrap();
//! assert_eq!(reconciliation.records.len(), 1);
//! assert_eq!(reconciliation.records[0].title, "Deep Learning in X");
//! ```
//!
//! # Error Handling
//!
//! Structural problems (no input, invalid configuration, unreadable exports) are reported as
//! [`ReconcileError`]. Problems with individual records never abort a run; they are attached
//! to the audit log instead.
//!
//! ```rust
//! use bibunify::ReconcileError;
//! use bibunify::reconcile::Reconciler;
//!
//! match Reconciler::new().reconcile(&[]) {
//!     Err(ReconcileError::InputEmpty) => {}
//!     _ => unreachable!(),
//! }
//! ```
//!
//! # Thread Safety
//!
//! Reconciliation is a pure function of the input batch and its configuration. With the
//! `parallel` feature and `run_in_parallel` enabled, title similarity is scored on the rayon
//! thread pool; the result is identical to a sequential run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod exact;
#[cfg(feature = "csv")]
pub mod export;
pub mod fuzzy;
#[cfg(feature = "csv")]
pub mod loader;
pub mod normalize;
pub mod postmerge;
pub mod reconcile;
mod regex;
pub mod registry;
pub mod report;
pub mod resolve;

// Reexports
#[cfg(feature = "csv")]
pub use export::{CsvExporter, ReportSink, write_table, write_tables};
#[cfg(feature = "csv")]
pub use loader::ExportLoader;
pub use postmerge::PostMergeNormalizer;
pub use reconcile::{Reconciler, ReconcilerConfig, Reconciliation};
pub use registry::{
    JournalMetrics, JournalRegistry, ScimagoRegistry, apply_registry, enrich_with_metrics,
};
pub use report::{ReportBuilder, ReportTables};
pub use resolve::{MergeResolver, SourcePriority};

/// A specialized Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that abort a reconciliation run or the loading of its input.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("No input records supplied")]
    InputEmpty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value: {field} - {message}")]
    InvalidFieldValue { field: String, message: String },

    #[error("Malformed input: {message} at line {line}")]
    MalformedInput { message: String, line: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(feature = "csv")]
impl From<csv::Error> for ReconcileError {
    fn from(err: csv::Error) -> Self {
        ReconcileError::InvalidFormat(err.to_string())
    }
}

/// The database a record was exported from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    #[default]
    #[serde(rename = "SCOPUS")]
    Scopus,
    #[serde(rename = "WOS")]
    Wos,
}

impl Source {
    /// Every supported source, in declaration order.
    pub const ALL: [Source; 2] = [Source::Scopus, Source::Wos];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Scopus => "SCOPUS",
            Source::Wos => "WOS",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "scopus" => Ok(Source::Scopus),
            "wos" | "web of science" | "web of science core collection" => Ok(Source::Wos),
            other => Err(ReconcileError::InvalidFieldValue {
                field: "source".to_string(),
                message: format!("unknown source '{other}'"),
            }),
        }
    }
}

/// One bibliographic entry as exported by a source database.
///
/// Records are created by ingestion and never modified by the engine; reconciliation
/// replaces them with [`CanonicalRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Database the record came from
    pub source: Source,
    /// Identifier unique within the source export (EID, UT, ...)
    pub origin_id: String,
    /// Digital Object Identifier, possibly unnormalized or malformed
    pub doi: Option<String>,
    /// Title of the work
    pub title: String,
    /// Publication year
    pub year: Option<i32>,
    /// Journal or source title
    pub journal: Option<String>,
    /// ISSN of the journal
    pub issn: Option<String>,
    /// Author names, in export order
    pub authors: Vec<String>,
    /// Document type (Article, Review, Conference Paper, ...)
    pub document_type: Option<String>,
    /// Open access designation
    pub open_access: Option<String>,
    /// Author affiliations
    pub affiliations: Option<String>,
    /// Citation count reported by the source database
    pub cited_by: Option<u32>,
}

impl Record {
    /// Provenance of this record for audit purposes.
    pub fn provenance(&self) -> Provenance {
        Provenance {
            source: self.source,
            origin_id: self.origin_id.clone(),
        }
    }
}

/// Trace-back information for one input record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub source: Source,
    pub origin_id: String,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.origin_id)
    }
}

/// Which matcher put the records of a group together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    /// Records share a normalized DOI
    Exact,
    /// Records are connected through similar titles within the year window
    Fuzzy,
    /// Nothing matched; the group holds a single record
    Singleton,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Fuzzy => "fuzzy",
            MatchKind::Singleton => "singleton",
        }
    }
}

/// A set of input records judged to describe the same publication.
///
/// Members are indices into the input slice handed to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub members: Vec<usize>,
    pub matched_by: MatchKind,
}

/// The single record emitted for a [`DuplicateGroup`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Normalized DOI
    pub doi: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub issn: Option<String>,
    pub authors: Vec<String>,
    pub document_type: Option<String>,
    pub open_access: Option<String>,
    pub affiliations: Option<String>,
    /// Highest citation count reported by any member
    pub cited_by: Option<u32>,
    /// Journal ranking attached by [`registry::enrich_with_metrics`]
    pub metrics: Option<JournalMetrics>,
    /// Every input record merged into this one, in resolution order
    pub members: Vec<Provenance>,
}

impl CanonicalRecord {
    /// Distinct sources contributing to this record.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.members.iter().map(|m| m.source).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Whether the publication was found in more than one database.
    pub fn in_both(&self) -> bool {
        self.sources().len() > 1
    }

    pub fn origin_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.origin_id.as_str())
    }
}

/// Trait for ingestion collaborators producing records from raw export text.
pub trait RecordLoader {
    /// Load every record contained in `input`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the input is structurally malformed
    fn load(&self, input: &str) -> Result<Vec<Record>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ReconcileError::InvalidFormat("Invalid line".to_string());
        assert_eq!(error.to_string(), "Parse error: Invalid line");
        assert_eq!(
            ReconcileError::InputEmpty.to_string(),
            "No input records supplied"
        );
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!("Scopus".parse::<Source>().unwrap(), Source::Scopus);
        assert_eq!("Web of science".parse::<Source>().unwrap(), Source::Wos);
        assert_eq!(" WOS ".parse::<Source>().unwrap(), Source::Wos);
        assert!("PubMed".parse::<Source>().is_err());
    }

    #[test]
    fn test_canonical_sources() {
        let record = CanonicalRecord {
            members: vec![
                Provenance {
                    source: Source::Wos,
                    origin_id: "WOS:1".to_string(),
                },
                Provenance {
                    source: Source::Scopus,
                    origin_id: "2-s2.0-1".to_string(),
                },
                Provenance {
                    source: Source::Wos,
                    origin_id: "WOS:2".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(record.sources(), vec![Source::Scopus, Source::Wos]);
        assert!(record.in_both());
        assert_eq!(
            record.origin_ids().collect::<Vec<_>>(),
            vec!["WOS:1", "2-s2.0-1", "WOS:2"]
        );
    }
}
