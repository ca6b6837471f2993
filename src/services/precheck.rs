//! Pre-commit similarity check over a staged diff.
//!
//! Warns when the lines a commit adds mention patterns or keywords that
//! other repositories in the knowledge base already carry. Never blocks a
//! commit on its own; callers decide what to do with warnings.

use crate::storage::KnowledgeStore;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of warnings reported.
pub const DEFAULT_WARNING_LIMIT: usize = 5;

/// One similarity warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckWarning {
    /// Repository that already has these patterns.
    pub similar_repo: String,
    /// Stored patterns and keywords found in the added lines.
    pub matched: BTreeSet<String>,
    /// Human-readable warning.
    pub message: String,
    /// What to consider.
    pub suggestion: String,
}

/// Returns the text of the lines a unified diff adds.
#[must_use]
pub fn added_lines(diff: &str) -> String {
    diff.lines()
        .filter(|line| line.starts_with('+') && !line.starts_with("+++"))
        .map(|line| &line[1..])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `owner/repo` out of a GitHub remote URL.
///
/// Handles `https://github.com/owner/repo.git` and
/// `git@github.com:owner/repo.git`.
#[must_use]
pub fn repo_from_remote_url(url: &str) -> Option<String> {
    let (_, tail) = url.trim().split_once("github.com")?;
    let repo = tail
        .trim_start_matches([':', '/'])
        .trim_end_matches('/')
        .trim_end_matches(".git");
    (repo.split('/').count() == 2 && !repo.starts_with('/')).then(|| repo.to_string())
}

fn mentions(text: &str, term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return false;
    }
    let pattern = format!(r"\b{}\b", regex::escape(term));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(text))
}

/// Checks a staged diff of `current_repo` against every other stored
/// repository.
///
/// Empty diffs and empty knowledge bases yield no warnings. Results are
/// ordered by number of matches, then repository name, and truncated to
/// `limit` (0 = unlimited).
#[must_use]
pub fn check_diff(
    diff: &str,
    current_repo: &str,
    store: &KnowledgeStore,
    limit: usize,
) -> Vec<PrecheckWarning> {
    let added = added_lines(diff);
    if added.trim().is_empty() {
        return Vec::new();
    }

    let mut warnings: Vec<PrecheckWarning> = store
        .records()
        .into_iter()
        .filter(|record| record.name != current_repo)
        .filter_map(|record| {
            let matched: BTreeSet<String> = record
                .profile
                .patterns
                .iter()
                .chain(&record.profile.keywords)
                .filter(|term| mentions(&added, term))
                .cloned()
                .collect();
            if matched.is_empty() {
                return None;
            }
            let listed: Vec<&str> = matched.iter().map(String::as_str).collect();
            Some(PrecheckWarning {
                message: format!(
                    "Staged changes touch {} already present in {}",
                    listed.join(", "),
                    record.name
                ),
                suggestion: format!(
                    "Check whether {} already solves this before duplicating it",
                    record.name
                ),
                similar_repo: record.name,
                matched,
            })
        })
        .collect();

    warnings.sort_by(|a, b| {
        b.matched
            .len()
            .cmp(&a.matched.len())
            .then_with(|| a.similar_repo.cmp(&b.similar_repo))
    });
    if limit > 0 {
        warnings.truncate(limit);
    }
    tracing::debug!(
        repo = current_repo,
        warnings = warnings.len(),
        "Pre-commit check finished"
    );
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternProfile;
    use test_case::test_case;

    const DIFF: &str = "\
diff --git a/src/client.rs b/src/client.rs
--- a/src/client.rs
+++ b/src/client.rs
@@ -1,3 +1,6 @@
 use std::time::Duration;
+// Retry with exponential backoff on 503
+fn send_with_retry() {}
-fn circuit_breaker() {}
";

    async fn seed(store: &KnowledgeStore, name: &str, patterns: &[&str], keywords: &[&str]) {
        let profile = PatternProfile {
            patterns: patterns.iter().map(ToString::to_string).collect(),
            keywords: keywords.iter().map(ToString::to_string).collect(),
            ..PatternProfile::default()
        };
        store
            .record_snapshot(name, "c1", profile)
            .await
            .expect("record");
    }

    #[test]
    fn test_added_lines_only() {
        let added = added_lines(DIFF);
        assert!(added.contains("Retry with exponential backoff"));
        assert!(!added.contains("circuit_breaker"));
        assert!(!added.contains("b/src/client.rs"));
    }

    #[tokio::test]
    async fn test_warns_on_other_repo_patterns() {
        let store = KnowledgeStore::in_memory();
        seed(&store, "acme/current", &["retry"], &[]).await;
        seed(&store, "acme/billing", &["exponential backoff", "circuit breaker"], &["retry"]).await;
        seed(&store, "acme/unrelated", &["graphql"], &["schema"]).await;

        let warnings = check_diff(DIFF, "acme/current", &store, DEFAULT_WARNING_LIMIT);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].similar_repo, "acme/billing");
        assert_eq!(
            warnings[0].matched,
            ["exponential backoff", "retry"]
                .iter()
                .map(ToString::to_string)
                .collect::<BTreeSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_empty_inputs_yield_nothing() {
        let store = KnowledgeStore::in_memory();
        assert!(check_diff(DIFF, "acme/current", &store, 5).is_empty());

        seed(&store, "acme/billing", &["retry"], &[]).await;
        assert!(check_diff("", "acme/current", &store, 5).is_empty());
    }

    #[test_case("https://github.com/acme/api.git", Some("acme/api"))]
    #[test_case("git@github.com:acme/api.git", Some("acme/api"))]
    #[test_case("https://github.com/acme/api", Some("acme/api"))]
    #[test_case("https://gitlab.com/acme/api.git", None)]
    fn test_repo_from_remote_url(url: &str, expected: Option<&str>) {
        assert_eq!(repo_from_remote_url(url).as_deref(), expected);
    }
}
