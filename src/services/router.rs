//! Notification routing: assessment → action, at most once per
//! `(relationship, commit)` pair.

use crate::models::{
    NotificationAction, NotificationDecision, RelationshipId, TriageAssessment, Urgency,
};
use crate::storage::KnowledgeStore;
use crate::{Error, Result};
use serde::Serialize;

/// Thresholds for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterConfig {
    /// Minimum confidence for an issue (default: 70).
    pub issue_confidence_threshold: u8,
    /// Minimum urgency for an issue (default: medium).
    pub min_issue_urgency: Urgency,
    /// Minimum confidence to log the assessment at all (default: 30).
    pub log_confidence_floor: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            issue_confidence_threshold: 70,
            min_issue_urgency: Urgency::Medium,
            log_confidence_floor: 30,
        }
    }
}

/// Ledger key for one `(relationship, commit)` pair.
#[must_use]
pub fn ledger_key(relationship_id: &RelationshipId, commit_id: &str) -> String {
    format!("{relationship_id}@{commit_id}")
}

/// Decides what to do with each assessment.
#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    config: RouterConfig,
}

impl NotificationRouter {
    /// Creates a router with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with explicit thresholds.
    #[must_use]
    pub const fn with_config(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Returns the thresholds.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Pure decision for one assessment.
    #[must_use]
    pub fn decide(&self, assessment: &TriageAssessment) -> NotificationAction {
        if assessment.confidence >= self.config.issue_confidence_threshold
            && assessment.urgency >= self.config.min_issue_urgency
        {
            NotificationAction::CreateIssue
        } else if assessment.confidence >= self.config.log_confidence_floor {
            NotificationAction::LogOnly
        } else {
            NotificationAction::Skip
        }
    }

    /// Decides and claims the `(relationship, commit)` pair in the ledger.
    ///
    /// A pair that was already claimed yields `skip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger claim cannot be persisted.
    pub fn route(
        &self,
        assessment: &TriageAssessment,
        commit_id: &str,
        store: &KnowledgeStore,
    ) -> Result<NotificationDecision> {
        let relationship_id = assessment.relationship_id();
        let key = ledger_key(&relationship_id, commit_id);

        if !store.claim_notification(&key)? {
            let duplicate = Error::DuplicateEvent {
                repo: relationship_id.to_string(),
                commit_id: commit_id.to_string(),
            };
            tracing::debug!(reason = %duplicate, "Notification already decided, skipping");
            metrics::counter!("ripple_notifications_total", "action" => "duplicate").increment(1);
            return Ok(Self::duplicate(relationship_id, commit_id));
        }

        let action = self.decide(assessment);
        metrics::counter!("ripple_notifications_total", "action" => action.as_str()).increment(1);
        let reason = self.reason(assessment, action);
        tracing::info!(
            relationship = %relationship_id,
            commit_id,
            action = %action,
            confidence = assessment.confidence,
            urgency = %assessment.urgency,
            degraded = assessment.degraded,
            "Routed assessment"
        );
        Ok(NotificationDecision {
            relationship_id,
            commit_id: commit_id.to_string(),
            action,
            reason,
        })
    }

    /// Routes every assessment of one commit.
    ///
    /// Infallible: a pair whose ledger claim cannot be persisted gets a
    /// `skip` decision carrying the error, and the rest are still routed.
    #[must_use]
    pub fn route_all(
        &self,
        assessments: &[TriageAssessment],
        commit_id: &str,
        store: &KnowledgeStore,
    ) -> Vec<NotificationDecision> {
        assessments
            .iter()
            .map(|assessment| {
                self.route(assessment, commit_id, store).unwrap_or_else(|err| {
                    Self::unclaimed(assessment.relationship_id(), commit_id, &err)
                })
            })
            .collect()
    }

    /// The `skip` decision for a pair whose ledger claim failed.
    #[must_use]
    pub fn unclaimed(
        relationship_id: RelationshipId,
        commit_id: &str,
        error: &Error,
    ) -> NotificationDecision {
        tracing::warn!(
            relationship = %relationship_id,
            commit_id,
            error = %error,
            "Ledger claim failed, skipping notification"
        );
        metrics::counter!("ripple_notifications_total", "action" => "unclaimed").increment(1);
        NotificationDecision {
            relationship_id,
            commit_id: commit_id.to_string(),
            action: NotificationAction::Skip,
            reason: format!("ledger claim failed: {error}"),
        }
    }

    /// The `skip` decision for an already processed pair.
    #[must_use]
    pub fn duplicate(relationship_id: RelationshipId, commit_id: &str) -> NotificationDecision {
        NotificationDecision {
            relationship_id,
            commit_id: commit_id.to_string(),
            action: NotificationAction::Skip,
            reason: "duplicate event: already processed".to_string(),
        }
    }

    fn reason(&self, assessment: &TriageAssessment, action: NotificationAction) -> String {
        let prefix = if assessment.degraded { "degraded, " } else { "" };
        match action {
            NotificationAction::CreateIssue => format!(
                "{prefix}confidence {} >= {} and urgency {} >= {}",
                assessment.confidence,
                self.config.issue_confidence_threshold,
                assessment.urgency,
                self.config.min_issue_urgency
            ),
            NotificationAction::LogOnly => format!(
                "{prefix}confidence {} / urgency {} below issue thresholds",
                assessment.confidence, assessment.urgency
            ),
            NotificationAction::Skip => format!(
                "{prefix}confidence {} below {}",
                assessment.confidence, self.config.log_confidence_floor
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryTag, Relationship};
    use crate::storage::{KnowledgeBackend, KnowledgeBase};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    /// Accepts `n` saves, then fails every later one.
    struct SavesThenFails {
        remaining: AtomicUsize,
    }

    impl SavesThenFails {
        fn new(n: usize) -> Self {
            Self {
                remaining: AtomicUsize::new(n),
            }
        }
    }

    impl KnowledgeBackend for SavesThenFails {
        fn name(&self) -> &'static str {
            "saves-then-fails"
        }

        fn load(&self) -> Result<KnowledgeBase> {
            Ok(KnowledgeBase::new())
        }

        fn save(&self, _knowledge: &KnowledgeBase) -> Result<()> {
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map(|_| ())
                .map_err(|_| Error::OperationFailed {
                    operation: "save".to_string(),
                    cause: "disk full".to_string(),
                })
        }
    }

    fn assessment(confidence: u8, urgency: Urgency) -> TriageAssessment {
        TriageAssessment {
            relationship: Relationship::consumer("P", "C", [CategoryTag::ApiContract]),
            matched_tags: [CategoryTag::ApiContract].into_iter().collect(),
            confidence,
            urgency,
            rationale: String::new(),
            recommended_files: Vec::new(),
            degraded: false,
        }
    }

    #[test_case(92, Urgency::High, NotificationAction::CreateIssue ; "confident and urgent")]
    #[test_case(70, Urgency::Medium, NotificationAction::CreateIssue ; "at both thresholds")]
    #[test_case(95, Urgency::Low, NotificationAction::LogOnly ; "confident but low urgency")]
    #[test_case(69, Urgency::Critical, NotificationAction::LogOnly ; "just below confidence")]
    #[test_case(50, Urgency::Medium, NotificationAction::LogOnly ; "fallback values")]
    #[test_case(30, Urgency::Low, NotificationAction::LogOnly ; "at log floor")]
    #[test_case(29, Urgency::Critical, NotificationAction::Skip ; "below log floor")]
    #[test_case(0, Urgency::Low, NotificationAction::Skip ; "zero")]
    fn test_decide(confidence: u8, urgency: Urgency, expected: NotificationAction) {
        assert_eq!(
            NotificationRouter::new().decide(&assessment(confidence, urgency)),
            expected
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let router = NotificationRouter::with_config(RouterConfig {
            issue_confidence_threshold: 90,
            min_issue_urgency: Urgency::High,
            log_confidence_floor: 10,
        });
        assert_eq!(
            router.decide(&assessment(92, Urgency::Medium)),
            NotificationAction::LogOnly
        );
        assert_eq!(
            router.decide(&assessment(15, Urgency::Low)),
            NotificationAction::LogOnly
        );
    }

    #[test]
    fn test_route_is_at_most_once() {
        let store = KnowledgeStore::in_memory();
        let router = NotificationRouter::new();
        let a = assessment(92, Urgency::High);

        let first = router.route(&a, "abc123", &store).expect("route");
        assert_eq!(first.action, NotificationAction::CreateIssue);

        let second = router.route(&a, "abc123", &store).expect("route");
        assert_eq!(second.action, NotificationAction::Skip);
        assert!(second.reason.contains("duplicate"));

        let other_commit = router.route(&a, "def456", &store).expect("route");
        assert_eq!(other_commit.action, NotificationAction::CreateIssue);
    }

    #[test]
    fn test_route_all_isolates_claim_failures() {
        let store = KnowledgeStore::open(SavesThenFails::new(1)).expect("open");
        let router = NotificationRouter::new();
        let first = assessment(92, Urgency::High);
        let mut second = assessment(92, Urgency::High);
        second.relationship = Relationship::consumer("P", "D", [CategoryTag::ApiContract]);

        let decisions = router.route_all(&[first, second], "abc123", &store);

        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, NotificationAction::CreateIssue);
        assert_eq!(decisions[1].action, NotificationAction::Skip);
        assert!(decisions[1].reason.contains("disk full"), "{}", decisions[1].reason);
        assert!(store.is_notification_claimed("P->C#consumer@abc123"));
        assert!(!store.is_notification_claimed("P->D#consumer@abc123"));
    }

    #[test]
    fn test_ledger_key() {
        let id = RelationshipId::new("P", "C", "consumer");
        assert_eq!(ledger_key(&id, "abc"), "P->C#consumer@abc");
    }
}
