//! Audit trail and run statistics.

use crate::normalize::MatchKey;
use crate::{CanonicalRecord, MatchKind, Provenance, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A per-record anomaly. Warnings never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditWarning {
    /// The record has neither a usable DOI nor a usable title, so it could not be matched
    /// and was passed through on its own.
    MalformedRecord { record: Provenance },
    /// A fuzzy group spans more than two distinct years, or holds more records than there
    /// are sources. Resolution went ahead with the usual policy.
    AmbiguousMerge {
        years: Vec<i32>,
        sources: Vec<Source>,
        members: usize,
    },
}

impl fmt::Display for AuditWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditWarning::MalformedRecord { record } => {
                write!(f, "record {record} has neither DOI nor title")
            }
            AuditWarning::AmbiguousMerge {
                years,
                sources,
                members,
            } => write!(
                f,
                "fuzzy group of {members} records spans years {years:?} across sources {sources:?}"
            ),
        }
    }
}

/// How one canonical record came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position of the canonical record in the reconciled set
    pub canonical_index: usize,
    pub matched_by: MatchKind,
    /// Key shared by the group: the DOI for exact groups, the first member's title key
    /// otherwise; `None` for malformed records
    pub key: Option<MatchKey>,
    /// Every input record merged into the canonical record
    pub members: Vec<Provenance>,
    pub warnings: Vec<AuditWarning>,
}

impl AuditEntry {
    /// Records merged into the canonical record besides the first, highest-priority one.
    pub fn absorbed(&self) -> &[Provenance] {
        self.members.get(1..).unwrap_or_default()
    }
}

/// One entry per canonical record, in the same order as the reconciled set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &AuditWarning> {
        self.entries.iter().flat_map(|e| e.warnings.iter())
    }

    /// The entry that accounts for a given input record.
    pub fn entry_for(&self, source: Source, origin_id: &str) -> Option<&AuditEntry> {
        self.entries.iter().find(|entry| {
            entry
                .members
                .iter()
                .any(|m| m.source == source && m.origin_id == origin_id)
        })
    }
}

/// Summary figures for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    pub input_records: usize,
    pub input_by_source: BTreeMap<Source, usize>,
    pub canonical_records: usize,
    pub exact_groups: usize,
    pub fuzzy_groups: usize,
    pub singletons: usize,
    /// Input records that did not survive as their own canonical record
    pub merged_away: usize,
    /// Canonical records found in both databases
    pub in_both: usize,
    pub warnings: usize,
}

impl ReconciliationStats {
    pub fn collect(records: &[CanonicalRecord], audit: &AuditLog) -> Self {
        let mut stats = Self {
            canonical_records: records.len(),
            in_both: records.iter().filter(|r| r.in_both()).count(),
            warnings: audit.warnings().count(),
            ..Default::default()
        };

        for entry in &audit.entries {
            stats.input_records += entry.members.len();
            for member in &entry.members {
                *stats.input_by_source.entry(member.source).or_default() += 1;
            }
            match entry.matched_by {
                MatchKind::Exact => stats.exact_groups += 1,
                MatchKind::Fuzzy => stats.fuzzy_groups += 1,
                MatchKind::Singleton => stats.singletons += 1,
            }
        }
        stats.merged_away = stats.input_records.saturating_sub(stats.canonical_records);
        stats
    }
}
