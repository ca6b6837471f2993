//! Triage dispatch: relationship resolution and parallel assessment.

use super::assessment::{AssessmentTask, ImpactAssessor};
use super::registry::RelationshipRegistry;
use crate::models::{ChangeEvent, Relationship, RelationshipKind, TriageAssessment};
use crate::storage::KnowledgeStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Resolves which relationships a change event triggers and assesses them.
pub struct TriageDispatcher {
    registry: Arc<RelationshipRegistry>,
}

impl TriageDispatcher {
    /// Creates a dispatcher over a registry.
    #[must_use]
    pub const fn new(registry: Arc<RelationshipRegistry>) -> Self {
        Self { registry }
    }

    /// Plans the assessment tasks for an event.
    ///
    /// A consumer is scheduled when the event's categories intersect its
    /// change triggers. A template is scheduled when they intersect its
    /// shared concerns and do not touch any divergent concern. No match is
    /// the common case and yields an empty plan.
    #[must_use]
    pub fn plan(&self, event: &ChangeEvent) -> Vec<AssessmentTask> {
        let changed = &event.changed_categories;
        let consumers = self.registry.consumers_of(&event.repo);
        let derivatives = self.registry.derivatives_of(&event.repo);

        let mut tasks: Vec<AssessmentTask> = consumers
            .into_iter()
            .chain(derivatives)
            .filter_map(|relationship| {
                let matched = match &relationship.kind {
                    RelationshipKind::Consumer { change_triggers } => {
                        changed.intersection(change_triggers).copied().collect()
                    },
                    RelationshipKind::Template {
                        shared_concerns,
                        divergent_concerns,
                    } => {
                        if changed.is_disjoint(divergent_concerns) {
                            changed.intersection(shared_concerns).copied().collect()
                        } else {
                            tracing::debug!(
                                relationship = %relationship.id(),
                                "Divergent concern touched, template not dispatched"
                            );
                            BTreeSet::new()
                        }
                    },
                };
                self.task_for(relationship, matched)
            })
            .collect();

        tasks.sort_by_key(|t| t.relationship.id());
        tasks
    }

    fn task_for(
        &self,
        relationship: Relationship,
        matched_tags: BTreeSet<crate::models::CategoryTag>,
    ) -> Option<AssessmentTask> {
        if matched_tags.is_empty() {
            return None;
        }
        let mapping_floor = self.registry.max_urgency_floor(&matched_tags);
        Some(AssessmentTask {
            relationship,
            matched_tags,
            mapping_floor,
        })
    }

    /// Runs every planned task concurrently.
    ///
    /// Each task gets the target repository's stored context, if any. A task
    /// that panics or is cancelled yields the fallback assessment for its
    /// relationship. The result is ordered by relationship id.
    #[instrument(skip_all, fields(repo = %event.repo, commit_id = %event.commit_id))]
    pub async fn dispatch(
        &self,
        event: &ChangeEvent,
        assessor: &Arc<ImpactAssessor>,
        store: &KnowledgeStore,
    ) -> Vec<TriageAssessment> {
        let tasks = self.plan(event);
        self.run(event, tasks, assessor, store).await
    }

    /// Runs already planned tasks concurrently.
    pub async fn run(
        &self,
        event: &ChangeEvent,
        tasks: Vec<AssessmentTask>,
        assessor: &Arc<ImpactAssessor>,
        store: &KnowledgeStore,
    ) -> Vec<TriageAssessment> {
        if tasks.is_empty() {
            tracing::debug!("No relationship matched, nothing to assess");
            return Vec::new();
        }
        tracing::info!(tasks = tasks.len(), "Dispatching impact assessments");

        let event = Arc::new(event.clone());
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let context = target_context(&task.relationship, store);
                let event = Arc::clone(&event);
                let assessor = Arc::clone(assessor);
                let spawned = task.clone();
                let handle = tokio::spawn(async move {
                    assessor.assess(&event, &spawned, &context).await
                });
                (task, handle)
            })
            .collect();

        let mut assessments = Vec::with_capacity(handles.len());
        for (task, handle) in handles {
            let assessment = handle.await.unwrap_or_else(|join_error| {
                tracing::warn!(
                    relationship = %task.relationship.id(),
                    error = %join_error,
                    "Assessment task aborted"
                );
                metrics::counter!("ripple_assessments_total", "status" => "aborted").increment(1);
                TriageAssessment::fallback(
                    task.relationship,
                    task.matched_tags,
                    &format!("assessment task aborted: {join_error}"),
                )
            });
            assessments.push(assessment);
        }

        assessments.sort_by_key(TriageAssessment::relationship_id);
        assessments
    }
}

/// Builds the oracle context for the target repository.
fn target_context(relationship: &Relationship, store: &KnowledgeStore) -> String {
    let mut context = store.record(&relationship.target_repo).map_or_else(
        || format!("Repository: {}", relationship.target_repo),
        |record| record.context_summary(),
    );
    context.push_str(&format!(
        "\nRelationship: {} of {}",
        relationship.kind.label(),
        relationship.provider_repo
    ));
    if let Some(description) = &relationship.context {
        context.push_str("\nDescription: ");
        context.push_str(description);
    }
    context
}
