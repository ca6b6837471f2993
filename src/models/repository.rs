//! Repository records and pattern history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A piece of a repository that could be reused elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReusableComponent {
    /// Component name.
    pub name: String,
    /// What it does.
    #[serde(default)]
    pub description: String,
    /// Files that implement it.
    #[serde(default)]
    pub files: Vec<String>,
}

/// The pattern fields extracted for one commit of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternProfile {
    /// Architectural patterns in use.
    #[serde(default)]
    pub patterns: BTreeSet<String>,
    /// Technical decisions, in the order the extractor reported them.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// Components worth reusing.
    #[serde(default)]
    pub reusable_components: Vec<ReusableComponent>,
    /// External libraries and services.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Free-form keywords.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// One-line problem statement.
    #[serde(default)]
    pub problem_domain: String,
}

impl PatternProfile {
    /// Returns true if the extractor produced nothing usable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.keywords.is_empty()
            && self.decisions.is_empty()
            && self.reusable_components.is_empty()
            && self.dependencies.is_empty()
            && self.problem_domain.trim().is_empty()
    }
}

/// The current pattern state of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Unique repository name (for example `acme/billing-api`).
    pub name: String,
    /// Latest extracted pattern fields.
    #[serde(flatten)]
    pub profile: PatternProfile,
}

impl RepositoryRecord {
    /// Creates a record from a name and profile.
    #[must_use]
    pub fn new(name: impl Into<String>, profile: PatternProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    /// Builds a short description of the repository for oracle prompts.
    #[must_use]
    pub fn context_summary(&self) -> String {
        let mut summary = format!("Repository: {}", self.name);
        if !self.profile.problem_domain.trim().is_empty() {
            summary.push_str(&format!("\nProblem domain: {}", self.profile.problem_domain));
        }
        if !self.profile.patterns.is_empty() {
            let patterns: Vec<&str> = self.profile.patterns.iter().map(String::as_str).collect();
            summary.push_str(&format!("\nPatterns: {}", patterns.join(", ")));
        }
        if !self.profile.dependencies.is_empty() {
            let deps: Vec<&str> = self
                .profile
                .dependencies
                .iter()
                .map(String::as_str)
                .collect();
            summary.push_str(&format!("\nDependencies: {}", deps.join(", ")));
        }
        summary
    }
}

/// One immutable snapshot in a repository's pattern history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the snapshot was recorded.
    pub timestamp: DateTime<Utc>,
    /// The commit the snapshot belongs to.
    pub commit_id: String,
    /// Copy of the pattern fields at that commit.
    pub patterns_snapshot: PatternProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat() {
        let mut profile = PatternProfile::default();
        profile.patterns.insert("retry with backoff".to_string());
        profile.problem_domain = "billing".to_string();
        let record = RepositoryRecord::new("acme/api", profile);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "acme/api");
        assert_eq!(value["patterns"][0], "retry with backoff");
        assert_eq!(value["problem_domain"], "billing");

        let back: RepositoryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_profile_missing_fields_default() {
        let profile: PatternProfile = serde_json::from_str(r#"{"patterns": ["a"]}"#).unwrap();
        assert!(profile.keywords.is_empty());
        assert!(!profile.is_empty());
        assert!(PatternProfile::default().is_empty());
    }

    #[test]
    fn test_context_summary() {
        let mut profile = PatternProfile::default();
        profile.problem_domain = "payments".to_string();
        profile.dependencies.insert("stripe".to_string());
        let summary = RepositoryRecord::new("acme/pay", profile).context_summary();
        assert!(summary.contains("acme/pay"));
        assert!(summary.contains("payments"));
        assert!(summary.contains("stripe"));
        assert!(!summary.contains("Patterns"));
    }
}
