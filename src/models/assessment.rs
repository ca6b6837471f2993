//! Triage assessments and notification decisions.

use super::{CategoryTag, Relationship, RelationshipId, Urgency};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Confidence used when the oracle could not be reached.
pub const FALLBACK_CONFIDENCE: u8 = 50;

/// Outcome of assessing one relationship for one change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageAssessment {
    /// The relationship that was assessed.
    pub relationship: Relationship,
    /// Triggers or shared concerns that caused the dispatch.
    pub matched_tags: BTreeSet<CategoryTag>,
    /// Confidence in `[0, 100]`.
    pub confidence: u8,
    /// Resolved urgency after floors and caps.
    pub urgency: Urgency,
    /// Oracle rationale (opaque text).
    pub rationale: String,
    /// Files in the target repository worth looking at.
    pub recommended_files: Vec<String>,
    /// True when this is the fallback produced after oracle failures.
    #[serde(default)]
    pub degraded: bool,
}

impl TriageAssessment {
    /// Builds the degraded assessment used when the oracle is unavailable.
    #[must_use]
    pub fn fallback(
        relationship: Relationship,
        matched_tags: BTreeSet<CategoryTag>,
        cause: &str,
    ) -> Self {
        Self {
            relationship,
            matched_tags,
            confidence: FALLBACK_CONFIDENCE,
            urgency: Urgency::Medium,
            rationale: format!(
                "Degraded assessment: the impact oracle did not return a usable answer ({cause}). \
                 Review the change manually."
            ),
            recommended_files: Vec::new(),
            degraded: true,
        }
    }

    /// Returns the relationship identifier.
    #[must_use]
    pub fn relationship_id(&self) -> RelationshipId {
        self.relationship.id()
    }
}

/// What the router decided to do with an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Open an issue on the target repository.
    CreateIssue,
    /// Record the assessment without notifying anyone.
    LogOnly,
    /// Drop it.
    Skip,
}

impl NotificationAction {
    /// Returns the action as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateIssue => "create_issue",
            Self::LogOnly => "log_only",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's decision for one `(relationship, commit)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDecision {
    /// Relationship the decision applies to.
    pub relationship_id: RelationshipId,
    /// Commit the decision applies to.
    pub commit_id: String,
    /// The chosen action.
    pub action: NotificationAction,
    /// Short explanation for logs and reports.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_shape() {
        let rel = Relationship::consumer("p", "c", [CategoryTag::ApiContract]);
        let fallback = TriageAssessment::fallback(
            rel,
            [CategoryTag::ApiContract].into_iter().collect(),
            "timed out",
        );
        assert_eq!(fallback.confidence, 50);
        assert_eq!(fallback.urgency, Urgency::Medium);
        assert!(fallback.degraded);
        assert!(fallback.rationale.contains("Degraded assessment"));
        assert!(fallback.rationale.contains("timed out"));
    }

    #[test]
    fn test_action_serde() {
        let json = serde_json::to_string(&NotificationAction::CreateIssue).unwrap();
        assert_eq!(json, "\"create_issue\"");
        assert_eq!(NotificationAction::LogOnly.to_string(), "log_only");
    }
}
