//! Merge resolution: collapsing a duplicate group into one canonical record.
//!
//! Every field is chosen independently:
//!
//! | Field | Policy |
//! |-------|--------|
//! | `doi` | first usable DOI in source-priority order |
//! | `title` | longest non-empty title; ties go to the higher-priority source |
//! | `year` | most frequent year; ties go to the smallest year |
//! | `journal`, `issn`, `document_type`, `open_access`, `affiliations` | longest non-empty value; ties go to the higher-priority source |
//! | `authors` | the longest non-empty author list; ties go to the higher-priority source |
//!
//! Members are ordered by source priority, then by origin id, before any field is chosen,
//! so the result does not depend on the order records arrived in.

use crate::normalize::normalize_doi;
use crate::{CanonicalRecord, DuplicateGroup, ReconcileError, Record, Result, Source};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Ordered list of sources; the first source wins ties.
///
/// The default order is Scopus, then Web of Science.
///
/// # Examples
///
/// ```
/// use bibunify::{Source, SourcePriority};
///
/// let priority = SourcePriority::new(vec![Source::Wos, Source::Scopus]).unwrap();
/// assert_eq!(priority.rank(Source::Wos), 0);
///
/// assert!(SourcePriority::new(vec![Source::Wos, Source::Wos]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePriority(Vec<Source>);

impl Default for SourcePriority {
    fn default() -> Self {
        Self(vec![Source::Scopus, Source::Wos])
    }
}

impl SourcePriority {
    /// Creates a priority order. Every source must appear exactly once.
    pub fn new(order: Vec<Source>) -> Result<Self> {
        let priority = Self(order);
        priority.validate()?;
        Ok(priority)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for source in Source::ALL {
            let occurrences = self.0.iter().filter(|s| **s == source).count();
            if occurrences != 1 {
                return Err(ReconcileError::Config(format!(
                    "source priority must list {source} exactly once, found {occurrences}"
                )));
            }
        }
        Ok(())
    }

    /// Position of `source` in the order; lower ranks win ties.
    pub fn rank(&self, source: Source) -> usize {
        self.0
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.0.len())
    }

    pub fn order(&self) -> &[Source] {
        &self.0
    }
}

/// Produces one [`CanonicalRecord`] per duplicate group.
///
/// # Examples
///
/// ```
/// use bibunify::{MergeResolver, Record, Source};
///
/// let scopus = Record {
///     source: Source::Scopus,
///     origin_id: "2-s2.0-1".to_string(),
///     title: "Deep Learning".to_string(),
///     year: Some(2020),
///     ..Default::default()
/// };
/// let wos = Record {
///     source: Source::Wos,
///     origin_id: "WOS:1".to_string(),
///     title: "Deep Learning: A Survey".to_string(),
///     year: Some(2020),
///     journal: Some("Nature".to_string()),
///     ..Default::default()
/// };
///
/// let canonical = MergeResolver::default().resolve(&[&scopus, &wos]);
/// assert_eq!(canonical.title, "Deep Learning: A Survey");
/// assert_eq!(canonical.journal.as_deref(), Some("Nature"));
/// assert_eq!(canonical.members.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    priority: SourcePriority,
}

impl MergeResolver {
    #[must_use]
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    /// Members sorted by source priority, then origin id. The sort is stable, so records
    /// with the same source and origin id keep their relative order.
    pub fn ordered<'a>(&self, members: &[&'a Record]) -> Vec<&'a Record> {
        members
            .iter()
            .copied()
            .sorted_by(|a, b| {
                self.priority
                    .rank(a.source)
                    .cmp(&self.priority.rank(b.source))
                    .then_with(|| a.origin_id.cmp(&b.origin_id))
            })
            .collect()
    }

    /// Collapse a group of records judged identical into one canonical record.
    ///
    /// The input records are only read; provenance of every member is kept.
    pub fn resolve(&self, members: &[&Record]) -> CanonicalRecord {
        let ordered = self.ordered(members);

        CanonicalRecord {
            doi: ordered
                .iter()
                .find_map(|r| r.doi.as_deref().and_then(normalize_doi)),
            title: longest_text(ordered.iter().map(|r| Some(r.title.as_str())))
                .unwrap_or_default(),
            year: most_frequent_year(ordered.iter().filter_map(|r| r.year)),
            journal: longest_text(ordered.iter().map(|r| r.journal.as_deref())),
            issn: longest_text(ordered.iter().map(|r| r.issn.as_deref())),
            authors: longest_list(ordered.iter().map(|r| &r.authors)),
            document_type: longest_text(ordered.iter().map(|r| r.document_type.as_deref())),
            open_access: longest_text(ordered.iter().map(|r| r.open_access.as_deref())),
            affiliations: longest_text(ordered.iter().map(|r| r.affiliations.as_deref())),
            cited_by: ordered.iter().filter_map(|r| r.cited_by).max(),
            metrics: None,
            members: ordered.iter().map(|r| r.provenance()).collect(),
        }
    }

    /// Resolve a group whose members index into `records`.
    pub fn resolve_group(&self, records: &[Record], group: &DuplicateGroup) -> CanonicalRecord {
        let members: Vec<&Record> = group.members.iter().map(|&i| &records[i]).collect();
        self.resolve(&members)
    }
}

/// Longest trimmed non-empty value, measured in characters; the first one wins ties.
fn longest_text<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for value in values.flatten().map(str::trim).filter(|v| !v.is_empty()) {
        let length = value.chars().count();
        if best.is_none_or(|(_, best_length)| length > best_length) {
            best = Some((value, length));
        }
    }
    best.map(|(value, _)| value.to_string())
}

fn longest_list<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut best: Option<&Vec<String>> = None;
    for list in lists.filter(|l| !l.is_empty()) {
        if best.is_none_or(|b| list.len() > b.len()) {
            best = Some(list);
        }
    }
    best.cloned().unwrap_or_default()
}

/// Most frequent year; ties go to the smallest year.
fn most_frequent_year(years: impl Iterator<Item = i32>) -> Option<i32> {
    years
        .counts()
        .into_iter()
        .max_by(|(year_a, count_a), (year_b, count_b)| {
            count_a.cmp(count_b).then_with(|| year_b.cmp(year_a))
        })
        .map(|(year, _)| year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provenance;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn record(source: Source, origin_id: &str, title: &str, year: Option<i32>) -> Record {
        Record {
            source,
            origin_id: origin_id.to_string(),
            title: title.to_string(),
            year,
            ..Default::default()
        }
    }

    #[test]
    fn test_doi_pair_resolution() {
        let scopus = Record {
            doi: Some("10.1/X".to_string()),
            ..record(Source::Scopus, "s1", "Deep Learning in X", Some(2020))
        };
        let wos = Record {
            doi: Some("10.1/x".to_string()),
            ..record(Source::Wos, "w1", "DEEP LEARNING IN X", Some(2021))
        };

        let canonical = MergeResolver::default().resolve(&[&wos, &scopus]);

        assert_eq!(canonical.doi.as_deref(), Some("10.1/x"));
        assert_eq!(canonical.title, "Deep Learning in X");
        assert_eq!(canonical.year, Some(2020));
        assert_eq!(
            canonical.members,
            vec![
                Provenance {
                    source: Source::Scopus,
                    origin_id: "s1".to_string()
                },
                Provenance {
                    source: Source::Wos,
                    origin_id: "w1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_highest_citation_count_wins() {
        let scopus = Record {
            cited_by: Some(12),
            ..record(Source::Scopus, "s1", "Deep Learning in X", Some(2020))
        };
        let wos = Record {
            cited_by: Some(30),
            ..record(Source::Wos, "w1", "Deep Learning in X", Some(2020))
        };
        let uncounted = record(Source::Wos, "w2", "Deep Learning in X", Some(2020));

        let canonical = MergeResolver::default().resolve(&[&scopus, &wos, &uncounted]);
        assert_eq!(canonical.cited_by, Some(30));
        assert_eq!(canonical.metrics, None);

        let canonical = MergeResolver::default().resolve(&[&uncounted]);
        assert_eq!(canonical.cited_by, None);
    }

    #[test]
    fn test_resolution_ignores_member_order() {
        let a = Record {
            journal: Some("Journal of Testing".to_string()),
            authors: vec!["Smith, J.".to_string()],
            ..record(Source::Wos, "w2", "Title", Some(2019))
        };
        let b = Record {
            journal: Some("J. Test.".to_string()),
            authors: vec!["Smith, John".to_string(), "Doe, Jane".to_string()],
            ..record(Source::Scopus, "s9", "Title.", None)
        };
        let c = Record {
            document_type: Some("Article".to_string()),
            ..record(Source::Wos, "w1", "TITLE", Some(2020))
        };

        let resolver = MergeResolver::default();
        let forward = resolver.resolve(&[&a, &b, &c]);
        let backward = resolver.resolve(&[&c, &b, &a]);

        assert_eq!(forward, backward);
        assert_eq!(forward.title, "Title.");
        assert_eq!(forward.year, Some(2019));
        assert_eq!(forward.journal.as_deref(), Some("Journal of Testing"));
        assert_eq!(forward.authors.len(), 2);
        assert_eq!(forward.document_type.as_deref(), Some("Article"));
    }

    #[test]
    fn test_doi_follows_source_priority() {
        let scopus = Record {
            doi: Some("https://doi.org/10.1/A".to_string()),
            ..record(Source::Scopus, "s1", "Title", None)
        };
        let wos = Record {
            doi: Some("10.1/b".to_string()),
            ..record(Source::Wos, "w1", "Title", None)
        };
        let no_doi = record(Source::Scopus, "s0", "Title", None);

        let canonical = MergeResolver::default().resolve(&[&wos, &no_doi, &scopus]);
        assert_eq!(canonical.doi.as_deref(), Some("10.1/a"));

        let reversed = SourcePriority::new(vec![Source::Wos, Source::Scopus]).unwrap();
        let canonical = MergeResolver::new(reversed).resolve(&[&scopus, &no_doi, &wos]);
        assert_eq!(canonical.doi.as_deref(), Some("10.1/b"));
    }

    #[test]
    fn test_ties_follow_source_priority() {
        let scopus = Record {
            journal: Some("Nature".to_string()),
            ..record(Source::Scopus, "s1", "Same Length A", None)
        };
        let wos = Record {
            journal: Some("NATURE".to_string()),
            ..record(Source::Wos, "w1", "Same Length B", None)
        };

        let canonical = MergeResolver::default().resolve(&[&wos, &scopus]);
        assert_eq!(canonical.title, "Same Length A");
        assert_eq!(canonical.journal.as_deref(), Some("Nature"));

        let reversed = SourcePriority::new(vec![Source::Wos, Source::Scopus]).unwrap();
        let canonical = MergeResolver::new(reversed).resolve(&[&scopus, &wos]);
        assert_eq!(canonical.title, "Same Length B");
        assert_eq!(canonical.journal.as_deref(), Some("NATURE"));
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let a = Record {
            open_access: Some("   ".to_string()),
            ..record(Source::Scopus, "s1", "Title", None)
        };
        let b = Record {
            open_access: Some("All Open Access; Gold".to_string()),
            ..record(Source::Wos, "w1", "", None)
        };

        let canonical = MergeResolver::default().resolve(&[&a, &b]);
        assert_eq!(canonical.title, "Title");
        assert_eq!(canonical.open_access.as_deref(), Some("All Open Access; Gold"));
        assert_eq!(canonical.journal, None);
        assert_eq!(canonical.year, None);
    }

    #[rstest]
    #[case(&[2020, 2021, 2021], Some(2021))]
    #[case(&[2021, 2020], Some(2020))]
    #[case(&[2022, 2019, 2022, 2019], Some(2019))]
    #[case(&[2018], Some(2018))]
    #[case(&[], None)]
    fn test_most_frequent_year(#[case] years: &[i32], #[case] expected: Option<i32>) {
        assert_eq!(most_frequent_year(years.iter().copied()), expected);
    }

    #[test]
    fn test_resolve_group() {
        let records = vec![
            record(Source::Wos, "w1", "Graph Neural Network for Drug Discovery", Some(2022)),
            record(Source::Scopus, "s1", "Unrelated", Some(2000)),
            record(Source::Scopus, "s2", "Graph Neural Networks for Drug Discovery", Some(2022)),
        ];
        let group = DuplicateGroup {
            members: vec![0, 2],
            matched_by: crate::MatchKind::Fuzzy,
        };

        let canonical = MergeResolver::default().resolve_group(&records, &group);
        assert_eq!(canonical.title, "Graph Neural Networks for Drug Discovery");
        assert_eq!(canonical.origin_ids().collect::<Vec<_>>(), vec!["s2", "w1"]);
    }

    #[test]
    fn test_source_priority_validation() {
        assert!(SourcePriority::new(vec![Source::Scopus, Source::Wos]).is_ok());
        assert!(SourcePriority::new(vec![Source::Scopus]).is_err());
        assert!(SourcePriority::new(vec![Source::Wos, Source::Scopus, Source::Wos]).is_err());
        assert_eq!(SourcePriority::default().rank(Source::Scopus), 0);
        assert_eq!(SourcePriority::default().rank(Source::Wos), 1);
    }
}
