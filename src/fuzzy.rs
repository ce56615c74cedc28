//! Approximate matching on normalized titles.
//!
//! Records without a usable DOI are compared pairwise. Two records are candidate-equal when
//! their normalized titles are at least [`DEFAULT_SIMILARITY_THRESHOLD`] similar (or a
//! configured threshold) and their publication years are within the year tolerance. A
//! missing year never blocks a match; the title alone decides.
//!
//! Candidate-equal pairs become edges of a graph, and the connected components of that graph
//! are the duplicate groups. Grouping is transitive: if A matches B and B matches C, all three
//! end up together even when A and C alone fall below the threshold.
//!
//! ## Performance
//!
//! Comparison is O(n²) over the residue. With `group_by_year` enabled, records are sorted by
//! year and each record is only compared with records inside its year window, plus every
//! record whose year is unknown. The window is exactly the year tolerance, so no pair that
//! passes the year gate is skipped. With `run_in_parallel` (and the `parallel` feature) the
//! comparisons are spread over the rayon thread pool.

mod disjoint_set;

use crate::normalize::RecordKeys;
use crate::reconcile::ReconcilerConfig;
use disjoint_set::DisjointSet;
use itertools::Itertools;
use strsim::normalized_levenshtein;
use tracing::debug;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;
pub const DEFAULT_YEAR_TOLERANCE: u32 = 1;

/// Similarity of two normalized titles in `[0, 1]`.
///
/// Symmetric and reflexive; based on the normalized Levenshtein distance.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    normalized_levenshtein(a, b)
}

/// Year gate: both years known and at most `tolerance` apart, or at least one year unknown.
pub fn years_compatible(a: Option<i32>, b: Option<i32>, tolerance: u32) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.abs_diff(b) <= tolerance,
        _ => true,
    }
}

/// Result of fuzzy matching the DOI-less residue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzyPartition {
    /// Connected components over records with a usable title, singletons included.
    /// Members are ascending; groups are ordered by their first member.
    pub groups: Vec<Vec<usize>>,
    /// Records with neither DOI nor usable title; they cannot be matched
    pub malformed: Vec<usize>,
    /// Number of candidate-equal pairs found
    pub edges: usize,
}

/// Groups DOI-less records by title similarity within a year window.
///
/// # Examples
///
/// ```
/// use bibunify::Record;
/// use bibunify::fuzzy::FuzzyMatcher;
/// use bibunify::normalize::RecordKeys;
///
/// let records = vec![
///     Record { title: "Graph Neural Networks for Drug Discovery".to_string(), year: Some(2022), ..Default::default() },
///     Record { title: "Graph Neural Network for Drug Discovery".to_string(), year: Some(2022), ..Default::default() },
///     Record { title: "Graph Neural Network for Drug Discovery".to_string(), year: Some(2019), ..Default::default() },
/// ];
/// let keys: Vec<RecordKeys> = records.iter().map(RecordKeys::from_record).collect();
///
/// let partition = FuzzyMatcher::new().partition(&keys, &[0, 1, 2]);
/// assert_eq!(partition.groups, vec![vec![0, 1], vec![2]]);
/// ```
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    threshold: f64,
    year_tolerance: u32,
    group_by_year: bool,
    run_in_parallel: bool,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    /// Creates a matcher with the default threshold and year tolerance, year windowing
    /// enabled and parallel scoring disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            year_tolerance: DEFAULT_YEAR_TOLERANCE,
            group_by_year: true,
            run_in_parallel: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            year_tolerance: config.year_tolerance,
            group_by_year: config.group_by_year,
            run_in_parallel: config.run_in_parallel,
        }
    }

    /// Minimum similarity for two titles to match, clamped to `[0, 1]`. A NaN threshold is
    /// ignored and the previous one kept.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        if !threshold.is_nan() {
            self.threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    #[must_use]
    pub fn with_year_tolerance(mut self, tolerance: u32) -> Self {
        self.year_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_year_grouping(mut self, group_by_year: bool) -> Self {
        self.group_by_year = group_by_year;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, run_in_parallel: bool) -> Self {
        self.run_in_parallel = run_in_parallel;
        self
    }

    /// Whether two records are candidate-equal under the title and year rules.
    /// Empty titles never match anything, including each other.
    pub fn is_candidate_equal(&self, a: &RecordKeys, b: &RecordKeys) -> bool {
        if a.title.is_empty() || b.title.is_empty() {
            return false;
        }
        years_compatible(a.year, b.year, self.year_tolerance)
            && title_similarity(&a.title, &b.title) >= self.threshold
    }

    /// Partition the records at `residue` (indices into `keys`) into connected components.
    pub fn partition(&self, keys: &[RecordKeys], residue: &[usize]) -> FuzzyPartition {
        let (mut slots, malformed): (Vec<usize>, Vec<usize>) = residue
            .iter()
            .copied()
            .sorted_unstable()
            .partition(|&idx| !keys[idx].title.is_empty());

        if self.group_by_year {
            // Unknown years first, then ascending; windows only look forward.
            slots.sort_by_key(|&idx| (keys[idx].year.is_some(), keys[idx].year));
        }

        let items: Vec<&RecordKeys> = slots.iter().map(|&idx| &keys[idx]).collect();
        let edges = self.candidate_edges(&items);

        let mut set = DisjointSet::new(items.len());
        for &(a, b) in &edges {
            set.union(a, b);
        }

        let groups: Vec<Vec<usize>> = set
            .components()
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|slot| slots[slot])
                    .sorted_unstable()
                    .collect::<Vec<_>>()
            })
            .sorted_unstable_by_key(|members| members[0])
            .collect();

        debug!(
            candidates = items.len(),
            malformed = malformed.len(),
            edges = edges.len(),
            groups = groups.len(),
            "fuzzy matched residue"
        );

        FuzzyPartition {
            groups,
            malformed,
            edges: edges.len(),
        }
    }

    fn candidate_edges(&self, items: &[&RecordKeys]) -> Vec<(usize, usize)> {
        #[cfg(feature = "parallel")]
        if self.run_in_parallel {
            use rayon::prelude::*;

            return (0..items.len())
                .into_par_iter()
                .flat_map_iter(|slot| self.edges_from(slot, items))
                .collect();
        }

        (0..items.len())
            .flat_map(|slot| self.edges_from(slot, items))
            .collect()
    }

    /// Candidate-equal pairs `(slot, later)` for every later slot worth comparing.
    fn edges_from<'a>(
        &'a self,
        slot: usize,
        items: &'a [&'a RecordKeys],
    ) -> impl Iterator<Item = (usize, usize)> + 'a {
        let current = items[slot];
        let window_start = if self.group_by_year { current.year } else { None };

        items[slot + 1..]
            .iter()
            .enumerate()
            .take_while(move |(_, other)| match window_start {
                Some(year) => other
                    .year
                    .is_some_and(|y| y.abs_diff(year) <= self.year_tolerance),
                None => true,
            })
            .filter(move |(_, other)| self.is_candidate_equal(current, other))
            .map(move |(offset, _)| (slot, slot + 1 + offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn keys(titles_and_years: &[(&str, Option<i32>)]) -> Vec<RecordKeys> {
        titles_and_years
            .iter()
            .map(|(title, year)| {
                RecordKeys::from_record(&Record {
                    title: title.to_string(),
                    year: *year,
                    ..Default::default()
                })
            })
            .collect()
    }

    fn all(keys: &[RecordKeys]) -> Vec<usize> {
        (0..keys.len()).collect()
    }

    #[rstest]
    #[case("", "")]
    #[case("deep learning", "deep learning")]
    #[case("graph neural networks", "graph neural network")]
    #[case("abc", "xyz")]
    fn test_similarity_is_symmetric_and_bounded(#[case] a: &str, #[case] b: &str) {
        let ab = title_similarity(a, b);
        assert_eq!(ab, title_similarity(b, a));
        assert!((0.0..=1.0).contains(&ab));
        assert_eq!(title_similarity(a, a), 1.0);
    }

    #[rstest]
    #[case(Some(2020), Some(2020), true)]
    #[case(Some(2020), Some(2021), true)]
    #[case(Some(2021), Some(2020), true)]
    #[case(Some(2020), Some(2022), false)]
    #[case(Some(2019), Some(2022), false)]
    #[case(None, Some(2022), true)]
    #[case(Some(1990), None, true)]
    #[case(None, None, true)]
    fn test_year_gate(#[case] a: Option<i32>, #[case] b: Option<i32>, #[case] expected: bool) {
        assert_eq!(years_compatible(a, b, DEFAULT_YEAR_TOLERANCE), expected);
    }

    #[rstest]
    #[case(Some(2022), Some(2022), true)]
    #[case(Some(2021), Some(2022), true)]
    #[case(Some(2019), Some(2022), false)]
    #[case(Some(2020), Some(2022), false)]
    #[case(None, Some(2022), true)]
    fn test_near_duplicate_titles(
        #[case] year_a: Option<i32>,
        #[case] year_b: Option<i32>,
        #[case] merged: bool,
    ) {
        let keys = keys(&[
            ("Graph Neural Networks for Drug Discovery", year_a),
            ("Graph Neural Network for Drug Discovery", year_b),
        ]);

        let partition = FuzzyMatcher::new().partition(&keys, &all(&keys));
        assert_eq!(partition.groups.len() == 1, merged);
    }

    #[test]
    fn test_empty_titles_never_match() {
        let keys = keys(&[("", Some(2020)), ("...", Some(2020)), ("Real Title", None)]);

        let partition = FuzzyMatcher::new().partition(&keys, &all(&keys));
        assert_eq!(partition.groups, vec![vec![2]]);
        assert_eq!(partition.malformed, vec![0, 1]);
        assert_eq!(partition.edges, 0);
    }

    #[test]
    fn test_transitive_grouping() {
        let a = "alpha beta gamma delta epsilon";
        let b = "alpha beta gamma delta epsixxn";
        let c = "alpxx beta gamma delta epsixxn";
        let matcher = FuzzyMatcher::new();
        assert!(title_similarity(a, c) < matcher.threshold);
        assert!(title_similarity(a, b) >= matcher.threshold);
        assert!(title_similarity(b, c) >= matcher.threshold);

        let keys = keys(&[(a, Some(2020)), ("unrelated", Some(2020)), (c, Some(2020)), (b, Some(2020))]);
        let partition = matcher.partition(&keys, &all(&keys));
        assert_eq!(partition.groups, vec![vec![0, 2, 3], vec![1]]);
    }

    #[test]
    fn test_year_chain_spanning_buckets() {
        let keys = keys(&[
            ("Same Title", Some(2019)),
            ("Same Title", Some(2021)),
            ("Same Title", Some(2020)),
        ]);

        let partition = FuzzyMatcher::new().partition(&keys, &all(&keys));
        assert_eq!(partition.groups, vec![vec![0, 1, 2]]);
        assert_eq!(partition.edges, 2);
    }

    #[test]
    fn test_only_residue_is_considered() {
        let keys = keys(&[
            ("Same Title", Some(2020)),
            ("Same Title", Some(2020)),
            ("Same Title", Some(2020)),
        ]);

        let partition = FuzzyMatcher::new().partition(&keys, &[2, 0]);
        assert_eq!(partition.groups, vec![vec![0, 2]]);
    }

    #[rstest]
    #[case(true, true)]
    #[case(true, false)]
    #[case(false, true)]
    #[case(false, false)]
    fn test_strategies_agree(#[case] group_by_year: bool, #[case] run_in_parallel: bool) {
        let keys = keys(&[
            ("Machine Learning Basics", Some(2020)),
            ("Machine Learning Basic", None),
            ("Machine Learning Basics", Some(2023)),
            ("Protein Folding with Transformers", Some(2021)),
            ("Protein folding with transformers.", Some(2022)),
            ("Protein Folding with Transformer", Some(2024)),
            ("Machine Learning Basics", Some(2021)),
            ("", None),
        ]);

        let reference = FuzzyMatcher::new()
            .with_year_grouping(false)
            .partition(&keys, &all(&keys));
        let partition = FuzzyMatcher::new()
            .with_year_grouping(group_by_year)
            .with_parallelism(run_in_parallel)
            .partition(&keys, &all(&keys));

        assert_eq!(partition, reference);
        assert_eq!(
            reference.groups,
            vec![vec![0, 1, 2, 6], vec![3, 4], vec![5]]
        );
        assert_eq!(reference.malformed, vec![7]);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let keys = keys(&[("Deep Learning", Some(2020)), ("Deep Lerning", Some(2020))]);

        let strict = FuzzyMatcher::new().with_threshold(1.0).partition(&keys, &all(&keys));
        assert_eq!(strict.groups.len(), 2);

        let lenient = FuzzyMatcher::new().with_threshold(0.5).partition(&keys, &all(&keys));
        assert_eq!(lenient.groups.len(), 1);
    }

    #[test]
    fn test_nan_threshold_keeps_previous_value() {
        let keys = keys(&[("Deep Learning", Some(2020)), ("Deep Lerning", Some(2020))]);

        let matcher = FuzzyMatcher::new().with_threshold(f64::NAN);
        assert_eq!(matcher.threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(matcher.partition(&keys, &all(&keys)).groups.len(), 1);

        let strict = FuzzyMatcher::new().with_threshold(1.0).with_threshold(f64::NAN);
        assert_eq!(strict.threshold, 1.0);
    }
}
