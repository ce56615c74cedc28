//! Reconciliation orchestrator.
//!
//! Sequences the whole engine over one batch of records:
//!
//! 1. compute normalized keys for every record
//! 2. partition records with a usable DOI by exact DOI equality
//! 3. fuzzy match the DOI-less residue by title similarity within the year window
//! 4. resolve every group into a canonical record
//! 5. assemble the canonical set and its audit log
//!
//! Every input record ends up in exactly one group. DOI groups are never merged with each
//! other or with the residue afterwards; a DOI match is final.
//!
//! ## Usage
//!
//! ```rust
//! use bibunify::{Record, Source};
//! use bibunify::reconcile::{Reconciler, ReconcilerConfig};
//!
//! let records = vec![
//!     Record {
//!         source: Source::Scopus,
//!         origin_id: "2-s2.0-1".to_string(),
//!         title: "Graph Neural Networks for Drug Discovery".to_string(),
//!         year: Some(2022),
//!         ..Default::default()
//!     },
//!     Record {
//!         source: Source::Wos,
//!         origin_id: "WOS:1".to_string(),
//!         title: "Graph Neural Network for Drug Discovery".to_string(),
//!         year: Some(2022),
//!         ..Default::default()
//!     },
//! ];
//!
//! let config = ReconcilerConfig {
//!     similarity_threshold: 0.95,
//!     ..Default::default()
//! };
//! let reconciliation = Reconciler::new().with_config(config).reconcile(&records).unwrap();
//!
//! assert_eq!(reconciliation.records.len(), 1);
//! assert!(reconciliation.records[0].in_both());
//! assert_eq!(reconciliation.audit.entries[0].members.len(), 2);
//! ```

mod audit;

pub use audit::{AuditEntry, AuditLog, AuditWarning, ReconciliationStats};

use crate::exact::ExactMatcher;
use crate::fuzzy::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_YEAR_TOLERANCE, FuzzyMatcher};
use crate::normalize::{MatchKey, RecordKeys};
use crate::resolve::{MergeResolver, SourcePriority};
use crate::{
    CanonicalRecord, DuplicateGroup, MatchKind, ReconcileError, Record, Result, Source,
};
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Configuration of a reconciliation run.
///
/// # Examples
///
/// ```
/// use bibunify::{Source, SourcePriority};
/// use bibunify::reconcile::ReconcilerConfig;
///
/// let config = ReconcilerConfig {
///     similarity_threshold: 0.93,
///     year_tolerance: 1,
///     source_priority: SourcePriority::new(vec![Source::Wos, Source::Scopus]).unwrap(),
///     group_by_year: true,
///     run_in_parallel: true,
/// };
/// assert!(config.validate().is_ok());
/// ```
///
/// # Notes
///
/// - `group_by_year` only limits which pairs are compared; it never changes the result
/// - `run_in_parallel` needs the `parallel` feature and is ignored without it
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Minimum title similarity, in `[0, 1]`, for a fuzzy match
    pub similarity_threshold: f64,
    /// Maximum distance between two known publication years for a fuzzy match
    pub year_tolerance: u32,
    /// Tie-breaking order between sources during resolution
    pub source_priority: SourcePriority,
    /// Only compare records inside each other's year window
    pub group_by_year: bool,
    /// Score title similarity on the rayon thread pool
    pub run_in_parallel: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            year_tolerance: DEFAULT_YEAR_TOLERANCE,
            source_priority: SourcePriority::default(),
            group_by_year: true,
            run_in_parallel: false,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ReconcileError::Config(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        self.source_priority.validate()
    }
}

/// The outcome of a run: the canonical set plus its audit trail.
///
/// `records[i]` is described by `audit.entries[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub records: Vec<CanonicalRecord>,
    pub audit: AuditLog,
}

impl Reconciliation {
    pub fn stats(&self) -> ReconciliationStats {
        ReconciliationStats::collect(&self.records, &self.audit)
    }
}

/// A group before resolution, with what the matchers knew about it.
struct PlannedGroup {
    group: DuplicateGroup,
    key: Option<MatchKey>,
    malformed: bool,
}

/// Runs the matchers and the resolver over a batch of records.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Creates a reconciler with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Partition `records` into duplicate groups without resolving them.
    ///
    /// Members of each group are in resolution order; groups are ordered by their first
    /// member.
    ///
    /// # Errors
    ///
    /// `InputEmpty` if `records` is empty, `Config` if the configuration is invalid.
    pub fn find_groups(&self, records: &[Record]) -> Result<Vec<DuplicateGroup>> {
        Ok(self
            .plan(records)?
            .into_iter()
            .map(|planned| planned.group)
            .collect())
    }

    /// Reconcile a complete batch into canonical records and an audit log.
    ///
    /// # Errors
    ///
    /// `InputEmpty` if `records` is empty, `Config` if the configuration is invalid. Nothing
    /// is produced in either case.
    pub fn reconcile(&self, records: &[Record]) -> Result<Reconciliation> {
        let planned = self.plan(records)?;
        let resolver = MergeResolver::new(self.config.source_priority.clone());

        let mut canonical_records = Vec::with_capacity(planned.len());
        let mut entries = Vec::with_capacity(planned.len());

        for (canonical_index, planned) in planned.into_iter().enumerate() {
            let members: Vec<&Record> = planned.group.members.iter().map(|&i| &records[i]).collect();
            let canonical = resolver.resolve_group(records, &planned.group);

            let mut warnings = Vec::new();
            if planned.malformed {
                warnings.push(AuditWarning::MalformedRecord {
                    record: members[0].provenance(),
                });
            }
            if planned.group.matched_by == MatchKind::Fuzzy {
                warnings.extend(ambiguity(&members));
            }
            for warning in &warnings {
                warn!(canonical_index, %warning, "reconciliation warning");
            }

            entries.push(AuditEntry {
                canonical_index,
                matched_by: planned.group.matched_by,
                key: planned.key,
                members: canonical.members.clone(),
                warnings,
            });
            canonical_records.push(canonical);
        }

        let reconciliation = Reconciliation {
            records: canonical_records,
            audit: AuditLog { entries },
        };

        let stats = reconciliation.stats();
        debug_assert_eq!(stats.input_records, records.len());
        info!(
            input = stats.input_records,
            canonical = stats.canonical_records,
            exact_groups = stats.exact_groups,
            fuzzy_groups = stats.fuzzy_groups,
            in_both = stats.in_both,
            warnings = stats.warnings,
            "reconciliation finished"
        );

        Ok(reconciliation)
    }

    fn plan(&self, records: &[Record]) -> Result<Vec<PlannedGroup>> {
        if records.is_empty() {
            return Err(ReconcileError::InputEmpty);
        }
        self.config.validate()?;

        let by_source = records.iter().map(|r| r.source).counts();
        info!(
            records = records.len(),
            scopus = by_source.get(&Source::Scopus).copied().unwrap_or(0),
            wos = by_source.get(&Source::Wos).copied().unwrap_or(0),
            threshold = self.config.similarity_threshold,
            "reconciling records"
        );

        let keys: Vec<RecordKeys> = records.iter().map(RecordKeys::from_record).collect();
        let resolver = MergeResolver::new(self.config.source_priority.clone());

        let exact = ExactMatcher::new().partition(&keys);
        let fuzzy = FuzzyMatcher::from_config(&self.config).partition(&keys, &exact.residue);

        let mut planned = Vec::with_capacity(exact.groups.len() + fuzzy.groups.len());

        for doi_group in exact.groups {
            planned.push(PlannedGroup {
                group: self.group_of(&resolver, records, &doi_group.members, MatchKind::Exact),
                key: Some(MatchKey::Doi(doi_group.doi)),
                malformed: false,
            });
        }

        for members in fuzzy.groups {
            let group = self.group_of(&resolver, records, &members, MatchKind::Fuzzy);
            let key = keys[group.members[0]].match_key();
            planned.push(PlannedGroup {
                group,
                key,
                malformed: false,
            });
        }

        for idx in fuzzy.malformed {
            planned.push(PlannedGroup {
                group: DuplicateGroup {
                    members: vec![idx],
                    matched_by: MatchKind::Singleton,
                },
                key: None,
                malformed: true,
            });
        }

        // Order by the first member's (source rank, origin id) so the output does not
        // depend on input order.
        planned.sort_by(|a, b| {
            let first_a = &records[a.group.members[0]];
            let first_b = &records[b.group.members[0]];
            resolver
                .priority()
                .rank(first_a.source)
                .cmp(&resolver.priority().rank(first_b.source))
                .then_with(|| first_a.origin_id.cmp(&first_b.origin_id))
                .then_with(|| a.group.members[0].cmp(&b.group.members[0]))
        });

        let covered: usize = planned.iter().map(|p| p.group.members.len()).sum();
        debug_assert_eq!(covered, records.len());
        debug!(
            groups = planned.len(),
            covered,
            fuzzy_edges = fuzzy.edges,
            "planned duplicate groups"
        );

        Ok(planned)
    }

    /// Put the members in resolution order and label singletons.
    fn group_of(
        &self,
        resolver: &MergeResolver,
        records: &[Record],
        members: &[usize],
        matched_by: MatchKind,
    ) -> DuplicateGroup {
        let ordered: Vec<usize> = members
            .iter()
            .copied()
            .sorted_by(|&a, &b| {
                let (ra, rb) = (&records[a], &records[b]);
                resolver
                    .priority()
                    .rank(ra.source)
                    .cmp(&resolver.priority().rank(rb.source))
                    .then_with(|| ra.origin_id.cmp(&rb.origin_id))
                    .then_with(|| a.cmp(&b))
            })
            .collect();

        DuplicateGroup {
            matched_by: if ordered.len() > 1 {
                matched_by
            } else {
                MatchKind::Singleton
            },
            members: ordered,
        }
    }
}

/// Flag fuzzy groups spanning more than two years or more records than there are sources.
fn ambiguity(members: &[&Record]) -> Option<AuditWarning> {
    let years: Vec<i32> = members
        .iter()
        .filter_map(|r| r.year)
        .sorted_unstable()
        .dedup()
        .collect();

    if years.len() > 2 || members.len() > Source::ALL.len() {
        let sources: Vec<Source> = members
            .iter()
            .map(|r| r.source)
            .sorted_unstable()
            .dedup()
            .collect();
        return Some(AuditWarning::AmbiguousMerge {
            years,
            sources,
            members: members.len(),
        });
    }
    None
}
