//! Cross-repository similarity scoring.
//!
//! # Algorithm
//!
//! For a candidate repository `c` and every other stored repository `o`:
//!
//! ```text
//! score(c, o) = |keywords(c) ∩ keywords(o)| + |patterns(c) ∩ patterns(o)|
//! ```
//!
//! Elements are compared after normalization (trim, collapse internal
//! whitespace, lowercase), so `"Retry  With Backoff"` and
//! `"retry with backoff"` are the same pattern. Results at or below the
//! threshold are dropped; the rest are sorted by score descending, ties by
//! repository name.

use crate::models::RepositoryRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for the similarity matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatcherConfig {
    /// Results with `score <= threshold` are dropped (default: 0).
    pub threshold: usize,
    /// Maximum number of results to return; 0 means unlimited (default: 5).
    pub max_results: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0,
            max_results: 5,
        }
    }
}

/// One similar repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// The other repository.
    pub repository: String,
    /// Overlap score.
    pub score: usize,
    /// Shared patterns, as spelled by the candidate.
    pub matched_patterns: BTreeSet<String>,
    /// Shared keywords, as spelled by the candidate.
    pub matched_keywords: BTreeSet<String>,
}

/// Scores one repository against the rest of the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    /// Creates a matcher with the default threshold and limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a matcher from an explicit configuration.
    #[must_use]
    pub const fn with_config(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Ranks `others` by overlap with `candidate`.
    ///
    /// A record with the candidate's own name is skipped.
    #[must_use]
    pub fn rank<'a>(
        &self,
        candidate: &RepositoryRecord,
        others: impl IntoIterator<Item = &'a RepositoryRecord>,
    ) -> Vec<SimilarityMatch> {
        let candidate_patterns = normalized_index(&candidate.profile.patterns);
        let candidate_keywords = normalized_index(&candidate.profile.keywords);

        let mut matches: Vec<SimilarityMatch> = others
            .into_iter()
            .filter(|other| other.name != candidate.name)
            .filter_map(|other| {
                let matched_patterns = intersect(&candidate_patterns, &other.profile.patterns);
                let matched_keywords = intersect(&candidate_keywords, &other.profile.keywords);
                let score = matched_patterns.len() + matched_keywords.len();
                (score > self.config.threshold).then(|| SimilarityMatch {
                    repository: other.name.clone(),
                    score,
                    matched_patterns,
                    matched_keywords,
                })
            })
            .collect();

        matches.sort_by(compare_matches);
        if self.config.max_results > 0 {
            matches.truncate(self.config.max_results);
        }
        matches
    }
}

fn compare_matches(a: &SimilarityMatch, b: &SimilarityMatch) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.repository.cmp(&b.repository))
}

/// Normalizes one element for comparison.
#[must_use]
pub fn normalize_element(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Maps normalized form → original spelling. Blank elements never match.
fn normalized_index(values: &BTreeSet<String>) -> BTreeMap<String, &str> {
    values
        .iter()
        .map(|v| (normalize_element(v), v.as_str()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn intersect(candidate: &BTreeMap<String, &str>, other: &BTreeSet<String>) -> BTreeSet<String> {
    other
        .iter()
        .filter_map(|v| candidate.get(&normalize_element(v)))
        .map(|original| (*original).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternProfile;
    use test_case::test_case;

    fn record(name: &str, patterns: &[&str], keywords: &[&str]) -> RepositoryRecord {
        RepositoryRecord::new(
            name,
            PatternProfile {
                patterns: patterns.iter().map(ToString::to_string).collect(),
                keywords: keywords.iter().map(ToString::to_string).collect(),
                ..PatternProfile::default()
            },
        )
    }

    #[test]
    fn test_overlap_scores_patterns() {
        let a = record("A", &["retry", "backoff"], &[]);
        let b = record("B", &["retry", "backoff", "ratelimit"], &[]);

        let result = SimilarityMatcher::new().rank(&a, [&a, &b]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].repository, "B");
        assert_eq!(result[0].score, 2);
        assert_eq!(
            result[0].matched_patterns,
            ["backoff", "retry"]
                .iter()
                .map(ToString::to_string)
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_keywords_count_toward_score() {
        let a = record("A", &["cache"], &["redis", "ttl"]);
        let b = record("B", &["cache"], &["redis"]);
        let result = SimilarityMatcher::new().rank(&a, [&b]);
        assert_eq!(result[0].score, 2);
        assert_eq!(result[0].matched_keywords.len(), 1);
    }

    #[test]
    fn test_disjoint_sets_are_excluded() {
        let a = record("A", &["retry"], &["http"]);
        let b = record("B", &["logging"], &["json"]);
        assert!(SimilarityMatcher::new().rank(&a, [&b]).is_empty());
    }

    #[test]
    fn test_ties_break_by_name() {
        let a = record("A", &["retry"], &[]);
        let c = record("C", &["retry"], &[]);
        let b = record("B", &["retry"], &[]);
        let names: Vec<_> = SimilarityMatcher::new()
            .rank(&a, [&c, &b])
            .into_iter()
            .map(|m| m.repository)
            .collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[test_case("Retry With Backoff", "retry with backoff" ; "case")]
    #[test_case("  retry   with backoff ", "retry with backoff" ; "whitespace")]
    fn test_normalized_equality(left: &str, right: &str) {
        let a = record("A", &[left], &[]);
        let b = record("B", &[right], &[]);
        assert_eq!(SimilarityMatcher::new().rank(&a, [&b])[0].score, 1);
    }

    #[test]
    fn test_substring_is_not_equality() {
        let a = record("A", &["retry"], &[]);
        let b = record("B", &["retry with backoff"], &[]);
        assert!(SimilarityMatcher::new().rank(&a, [&b]).is_empty());
    }

    #[test]
    fn test_threshold_drops_at_or_below() {
        let matcher = SimilarityMatcher::with_config(MatcherConfig {
            threshold: 1,
            max_results: 0,
        });
        let a = record("A", &["x", "y"], &[]);
        let one = record("One", &["x"], &[]);
        let two = record("Two", &["x", "y"], &[]);
        let result = matcher.rank(&a, [&one, &two]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].repository, "Two");
    }

    #[test]
    fn test_max_results_truncates_after_sort() {
        let matcher = SimilarityMatcher::with_config(MatcherConfig {
            threshold: 0,
            max_results: 1,
        });
        let a = record("A", &["x", "y"], &[]);
        let low = record("Low", &["x"], &[]);
        let high = record("High", &["x", "y"], &[]);
        let result = matcher.rank(&a, [&low, &high]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].repository, "High");
    }

    #[test]
    fn test_blank_elements_never_match() {
        let a = record("A", &["  "], &[""]);
        let b = record("B", &[" "], &[""]);
        assert!(SimilarityMatcher::new().rank(&a, [&b]).is_empty());
    }
}
