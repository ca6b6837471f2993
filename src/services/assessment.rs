//! Impact assessment tasks.
//!
//! One task assesses one relationship for one change event. The oracle call
//! runs on a blocking thread under a timeout; timeouts, transport failures
//! and malformed answers are retried with exponential backoff. When retries
//! run out the task returns the degraded fallback assessment, so a task
//! never fails.
//!
//! # Urgency resolution
//!
//! | Kind | Rule |
//! |------|------|
//! | Consumer | floored at `high` when `api_contract` or `authentication` matched; mapping floors apply |
//! | Template | mapping floors apply, then capped at `high` |
//!
//! The fallback assessment is returned as is.

use crate::models::{
    CategoryTag, ChangeEvent, Relationship, RelationshipKind, TriageAssessment, Urgency,
};
use crate::oracle::{ImpactOracle, OracleRequest, OracleResponse};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Retry and timeout policy for oracle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssessmentPolicy {
    /// Per-call timeout (default: 30 s).
    pub timeout: Duration,
    /// Retries after the first attempt (default: 2).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds (default: 500).
    pub base_backoff_ms: u64,
}

impl Default for AssessmentPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_backoff_ms: 500,
        }
    }
}

impl AssessmentPolicy {
    /// Delay before retry `attempt` (1-based): `base_backoff_ms * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(1 << (attempt - 1).min(10)),
        )
    }
}

/// One relationship scheduled for assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentTask {
    /// The relationship to assess.
    pub relationship: Relationship,
    /// Triggers or shared concerns the change matched.
    pub matched_tags: BTreeSet<CategoryTag>,
    /// Highest registry urgency floor among the matched tags.
    pub mapping_floor: Option<Urgency>,
}

/// Clamps an oracle confidence into `[0, 100]`. NaN becomes 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_confidence(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    // Clamped to [0, 100] first, so the cast is exact.
    raw.clamp(0.0, 100.0).round() as u8
}

/// Applies the floors and caps for the task's relationship kind.
#[must_use]
pub fn resolve_urgency(task: &AssessmentTask, normalized: Urgency) -> Urgency {
    let floored = task
        .mapping_floor
        .map_or(normalized, |floor| normalized.max(floor));
    match task.relationship.kind {
        RelationshipKind::Consumer { .. } => {
            if task.matched_tags.iter().any(CategoryTag::is_breaking_surface) {
                floored.max(Urgency::High)
            } else {
                floored
            }
        },
        RelationshipKind::Template { .. } => floored.min(Urgency::High),
    }
}

/// Runs assessment tasks against an oracle.
pub struct ImpactAssessor {
    oracle: Arc<dyn ImpactOracle>,
    policy: AssessmentPolicy,
}

impl ImpactAssessor {
    /// Creates an assessor with the default policy.
    #[must_use]
    pub fn new(oracle: Arc<dyn ImpactOracle>) -> Self {
        Self {
            oracle,
            policy: AssessmentPolicy::default(),
        }
    }

    /// Sets the retry and timeout policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: AssessmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &AssessmentPolicy {
        &self.policy
    }

    /// Returns the oracle name.
    #[must_use]
    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// Assesses one task. Never fails: exhausted retries yield the fallback.
    #[instrument(
        skip(self, event, task, target_context),
        fields(relationship = %task.relationship.id(), commit_id = %event.commit_id)
    )]
    pub async fn assess(
        &self,
        event: &ChangeEvent,
        task: &AssessmentTask,
        target_context: &str,
    ) -> TriageAssessment {
        let request = Arc::new(OracleRequest {
            provider_repo: task.relationship.provider_repo.clone(),
            target_repo: task.relationship.target_repo.clone(),
            relationship_kind: task.relationship.kind.label().to_string(),
            matched_tags: task.matched_tags.iter().copied().collect(),
            change_summary: event.change_summary(),
            target_repo_context: target_context.to_string(),
        });

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_oracle(Arc::clone(&request)).await {
                Ok(response) => {
                    metrics::counter!("ripple_assessments_total", "status" => "ok").increment(1);
                    return self.resolve(task, response);
                },
                Err(e) if e.is_transient() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Oracle call failed, retrying"
                    );
                    metrics::counter!("ripple_oracle_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    tracing::warn!(attempts = attempt, error = %e, "Using degraded assessment");
                    metrics::counter!("ripple_assessments_total", "status" => "degraded")
                        .increment(1);
                    return TriageAssessment::fallback(
                        task.relationship.clone(),
                        task.matched_tags.clone(),
                        &e.to_string(),
                    );
                },
            }
        }
    }

    /// One oracle call on a blocking thread, bounded by the policy timeout.
    async fn call_oracle(&self, request: Arc<OracleRequest>) -> Result<OracleResponse> {
        let oracle = Arc::clone(&self.oracle);
        let start = Instant::now();
        let handle = tokio::task::spawn_blocking(move || oracle.assess(&request));
        let result = match tokio::time::timeout(self.policy.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::TransientOracle(format!(
                "oracle call aborted: {join_error}"
            ))),
            Err(_) => Err(Error::TransientOracle(format!(
                "oracle call timed out after {} ms",
                self.policy.timeout.as_millis()
            ))),
        };
        metrics::histogram!("ripple_oracle_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn resolve(&self, task: &AssessmentTask, response: OracleResponse) -> TriageAssessment {
        let confidence = normalize_confidence(response.confidence);
        let urgency = resolve_urgency(task, Urgency::normalize(&response.urgency));
        tracing::debug!(
            oracle = self.oracle.name(),
            confidence,
            urgency = %urgency,
            "Oracle assessment resolved"
        );
        TriageAssessment {
            relationship: task.relationship.clone(),
            matched_tags: task.matched_tags.clone(),
            confidence,
            urgency,
            rationale: response.rationale,
            recommended_files: response.recommended_files,
            degraded: false,
        }
    }
}
