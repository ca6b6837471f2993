//! Inbound change notifications and the per-invocation change event.

use super::{CategoryTag, PatternProfile, ReusableComponent};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Paths that never carry meaningful change information.
static NOISE_PATH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.lock$",
        r"package-lock\.json$",
        r"yarn\.lock$",
        r"\.min\.js$",
        r"\.map$",
        r"__pycache__",
        r"\.pyc$",
        r"(^|/)\.git/",
        r"node_modules/",
        r"\.DS_Store",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Returns true unless the path is build output, a lockfile or VCS noise.
#[must_use]
pub fn is_meaningful_path(path: &str) -> bool {
    !NOISE_PATH_PATTERNS.iter().any(|re| re.is_match(path))
}

/// A change notification as produced by the pattern extraction collaborator.
///
/// ```json
/// {
///   "repo": "acme/billing-api",
///   "commit_id": "abc123",
///   "extracted_patterns": ["retry with backoff"],
///   "keywords": ["retry"],
///   "diff_summary": "Add retry to the invoice client",
///   "files_changed": ["src/client.rs"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Repository the commit belongs to.
    pub repo: String,
    /// Commit identifier.
    #[serde(alias = "commit_sha")]
    pub commit_id: String,
    /// Patterns the extractor recognized.
    #[serde(default, alias = "patterns")]
    pub extracted_patterns: BTreeSet<String>,
    /// Free-form keywords.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// Technical decisions.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// Components worth reusing.
    #[serde(default)]
    pub reusable_components: Vec<ReusableComponent>,
    /// External dependencies.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// One-line problem statement.
    #[serde(default)]
    pub problem_domain: String,
    /// Human-readable summary of the diff.
    #[serde(default)]
    pub diff_summary: String,
    /// Paths touched by the commit.
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// Commit message, if the extractor forwarded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

impl ChangeNotification {
    /// Creates a minimal notification.
    #[must_use]
    pub fn new(
        repo: impl Into<String>,
        commit_id: impl Into<String>,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit_id: commit_id.into(),
            extracted_patterns: patterns.into_iter().map(Into::into).collect(),
            keywords: BTreeSet::new(),
            decisions: Vec::new(),
            reusable_components: Vec::new(),
            dependencies: BTreeSet::new(),
            problem_domain: String::new(),
            diff_summary: String::new(),
            files_changed: Vec::new(),
            commit_message: None,
        }
    }

    /// Parses a notification from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed JSON or a blank repo/commit.
    pub fn from_json(json: &str) -> Result<Self> {
        let notification: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed change notification: {e}")))?;
        notification.validate()?;
        Ok(notification)
    }

    /// Validates required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when `repo` or `commit_id` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.repo.trim().is_empty() {
            return Err(Error::InvalidInput("change notification has no repo".to_string()));
        }
        if self.commit_id.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "change notification for '{}' has no commit_id",
                self.repo
            )));
        }
        Ok(())
    }

    /// Returns the changed paths that survive noise filtering.
    pub fn meaningful_files(&self) -> impl Iterator<Item = &str> {
        self.files_changed
            .iter()
            .map(String::as_str)
            .filter(|p| is_meaningful_path(p))
    }

    /// Returns the pattern fields to store for this commit.
    #[must_use]
    pub fn profile(&self) -> PatternProfile {
        PatternProfile {
            patterns: self.extracted_patterns.clone(),
            decisions: self.decisions.clone(),
            reusable_components: self.reusable_components.clone(),
            dependencies: self.dependencies.clone(),
            keywords: self.keywords.clone(),
            problem_domain: self.problem_domain.clone(),
        }
    }

    /// Turns the notification into a change event with the classifier's tags.
    #[must_use]
    pub fn into_event(self, changed_categories: BTreeSet<CategoryTag>) -> ChangeEvent {
        ChangeEvent {
            repo: self.repo,
            commit_id: self.commit_id,
            extracted_patterns: self.extracted_patterns,
            changed_categories,
            diff_summary: self.diff_summary,
        }
    }
}

/// A classified change, constructed per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Repository the commit belongs to.
    pub repo: String,
    /// Commit identifier.
    pub commit_id: String,
    /// Patterns the extractor recognized.
    pub extracted_patterns: BTreeSet<String>,
    /// Categories assigned by the classifier.
    pub changed_categories: BTreeSet<CategoryTag>,
    /// Human-readable summary of the diff.
    #[serde(default)]
    pub diff_summary: String,
}

impl ChangeEvent {
    /// Returns the first seven characters of the commit id.
    #[must_use]
    pub fn short_commit(&self) -> &str {
        self.commit_id
            .char_indices()
            .nth(7)
            .map_or(self.commit_id.as_str(), |(idx, _)| &self.commit_id[..idx])
    }

    /// Builds the change summary sent to the oracle.
    #[must_use]
    pub fn change_summary(&self) -> String {
        let patterns: Vec<&str> = self.extracted_patterns.iter().map(String::as_str).collect();
        let categories: Vec<&str> = self
            .changed_categories
            .iter()
            .map(CategoryTag::as_str)
            .collect();
        let mut summary = format!(
            "Repository: {}\nCommit: {}\nCategories: {}\nPatterns: {}",
            self.repo,
            self.commit_id,
            categories.join(", "),
            patterns.join(", ")
        );
        if !self.diff_summary.trim().is_empty() {
            summary.push_str("\n\n");
            summary.push_str(self.diff_summary.trim());
        }
        summary
    }
}
