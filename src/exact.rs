//! Exact matching on normalized DOIs.
//!
//! A DOI is treated as authoritative: records sharing a normalized DOI always belong to
//! the same group, whatever their titles say, and records with different DOIs are never
//! merged here. Records without a usable DOI are left for the fuzzy matcher.

use crate::normalize::RecordKeys;
use itertools::Itertools;
use tracing::debug;

/// Records sharing one normalized DOI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiGroup {
    pub doi: String,
    /// Indices of the member records, ascending
    pub members: Vec<usize>,
}

/// Result of partitioning a batch by DOI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExactPartition {
    /// One group per distinct DOI, ordered by DOI
    pub groups: Vec<DoiGroup>,
    /// Indices of records without a usable DOI, ascending
    pub residue: Vec<usize>,
}

/// Groups records by exact equality of their normalized DOI.
///
/// # Examples
///
/// ```
/// use bibunify::Record;
/// use bibunify::exact::ExactMatcher;
/// use bibunify::normalize::RecordKeys;
///
/// let records = vec![
///     Record { doi: Some("10.1/A".to_string()), ..Default::default() },
///     Record { doi: None, title: "No DOI".to_string(), ..Default::default() },
///     Record { doi: Some("doi:10.1/a".to_string()), ..Default::default() },
/// ];
/// let keys: Vec<RecordKeys> = records.iter().map(RecordKeys::from_record).collect();
///
/// let partition = ExactMatcher::new().partition(&keys);
/// assert_eq!(partition.groups[0].members, vec![0, 2]);
/// assert_eq!(partition.residue, vec![1]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct ExactMatcher;

impl ExactMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn partition(&self, keys: &[RecordKeys]) -> ExactPartition {
        let (keyed, residue): (Vec<(String, usize)>, Vec<usize>) =
            keys.iter().enumerate().partition_map(|(idx, key)| match &key.doi {
                Some(doi) => itertools::Either::Left((doi.clone(), idx)),
                None => itertools::Either::Right(idx),
            });

        let groups: Vec<DoiGroup> = keyed
            .into_iter()
            .into_group_map()
            .into_iter()
            .map(|(doi, members)| DoiGroup { doi, members })
            .sorted_by(|a, b| a.doi.cmp(&b.doi))
            .collect();

        debug!(
            doi_groups = groups.len(),
            residue = residue.len(),
            "partitioned records by DOI"
        );

        ExactPartition { groups, residue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Record, Source};
    use pretty_assertions::assert_eq;

    fn keys_for(records: &[Record]) -> Vec<RecordKeys> {
        records.iter().map(RecordKeys::from_record).collect()
    }

    #[test]
    fn test_same_doi_is_grouped_across_sources() {
        let records = vec![
            Record {
                source: Source::Scopus,
                doi: Some("10.1234/ABC".to_string()),
                title: "Title 1".to_string(),
                ..Default::default()
            },
            Record {
                source: Source::Wos,
                doi: Some("https://doi.org/10.1234/abc".to_string()),
                title: "A completely different title".to_string(),
                ..Default::default()
            },
            Record {
                source: Source::Wos,
                doi: Some("10.1234/def".to_string()),
                title: "Title 2".to_string(),
                ..Default::default()
            },
        ];

        let partition = ExactMatcher::new().partition(&keys_for(&records));

        assert_eq!(
            partition.groups,
            vec![
                DoiGroup {
                    doi: "10.1234/abc".to_string(),
                    members: vec![0, 1]
                },
                DoiGroup {
                    doi: "10.1234/def".to_string(),
                    members: vec![2]
                },
            ]
        );
        assert!(partition.residue.is_empty());
    }

    #[test]
    fn test_doi_suffix_markers_and_wrapping_do_not_split_groups() {
        let records = vec![
            Record {
                doi: Some("10.1000/abc [doi]".to_string()),
                title: "Title 1".to_string(),
                ..Default::default()
            },
            Record {
                doi: Some("10.1000/ABC [DOI]".to_string()),
                title: "Title 2".to_string(),
                ..Default::default()
            },
            Record {
                doi: Some("(10.1000/abc)".to_string()),
                title: "Title 3".to_string(),
                ..Default::default()
            },
        ];

        let partition = ExactMatcher::new().partition(&keys_for(&records));

        assert_eq!(
            partition.groups,
            vec![DoiGroup {
                doi: "10.1000/abc".to_string(),
                members: vec![0, 1, 2]
            }]
        );
    }

    #[test]
    fn test_different_dois_never_merge_even_with_identical_titles() {
        let records = vec![
            Record {
                doi: Some("10.1234/abc".to_string()),
                title: "Identical".to_string(),
                ..Default::default()
            },
            Record {
                doi: Some("10.1234/abd".to_string()),
                title: "Identical".to_string(),
                ..Default::default()
            },
        ];

        let partition = ExactMatcher::new().partition(&keys_for(&records));
        assert_eq!(partition.groups.len(), 2);
        assert!(partition.groups.iter().all(|g| g.members.len() == 1));
    }

    #[test]
    fn test_missing_and_malformed_dois_go_to_residue() {
        let records = vec![
            Record {
                doi: None,
                title: "Title 1".to_string(),
                ..Default::default()
            },
            Record {
                doi: Some("".to_string()),
                title: "Title 2".to_string(),
                ..Default::default()
            },
            Record {
                doi: Some("not a doi".to_string()),
                title: "Title 3".to_string(),
                ..Default::default()
            },
        ];

        let partition = ExactMatcher::new().partition(&keys_for(&records));
        assert!(partition.groups.is_empty());
        assert_eq!(partition.residue, vec![0, 1, 2]);
    }
}
