//! End-to-end processing of one change notification.
//!
//! ```text
//! notification -> validate -> classify -> record snapshot
//!                                          |-> similarity ranking -> digest webhook
//!                                          '-> plan -> assess (parallel) -> route -> issues
//! ```
//!
//! A commit already in the repository history short-circuits: every
//! planned relationship is routed to `skip` and the oracle is not called.

use super::assessment::ImpactAssessor;
use super::classifier::ChangeClassifier;
use super::dispatcher::TriageDispatcher;
use super::matcher::{SimilarityMatch, SimilarityMatcher};
use super::registry::RelationshipRegistry;
use super::router::NotificationRouter;
use crate::config::RippleConfig;
use crate::models::{
    ChangeEvent, ChangeNotification, HistoryEntry, NotificationAction, NotificationDecision,
    RelationshipId, TriageAssessment,
};
use crate::notify::{
    DeliveryResult, IssueRequest, IssueSink, LogIssueSink, SimilarityDigest, SimilarityNotifier,
};
use crate::oracle::DisabledOracle;
use crate::storage::{JsonFileBackend, KnowledgeStore, RecordOutcome};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Outcome of one issue delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDelivery {
    /// Relationship the issue is about.
    pub relationship_id: RelationshipId,
    /// Repository the issue was opened on.
    pub target_repo: String,
    /// Delivery result after retries.
    pub result: DeliveryResult,
}

/// Everything that happened while processing one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// The classified event.
    pub event: ChangeEvent,
    /// True when the commit was already recorded.
    pub duplicate: bool,
    /// The appended history entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_entry: Option<HistoryEntry>,
    /// Stored repositories that resemble this one.
    pub similarities: Vec<SimilarityMatch>,
    /// One assessment per dispatched relationship.
    pub assessments: Vec<TriageAssessment>,
    /// One decision per planned relationship.
    pub decisions: Vec<NotificationDecision>,
    /// Issue deliveries for `create_issue` decisions.
    pub deliveries: Vec<IssueDelivery>,
    /// Similarity digest delivery, if a webhook is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<DeliveryResult>,
}

impl PipelineReport {
    /// Decisions with the given action.
    pub fn decisions_with(
        &self,
        action: NotificationAction,
    ) -> impl Iterator<Item = &NotificationDecision> {
        self.decisions.iter().filter(move |d| d.action == action)
    }
}

/// The triage pipeline.
pub struct TriagePipeline {
    store: Arc<KnowledgeStore>,
    registry: Arc<RelationshipRegistry>,
    classifier: ChangeClassifier,
    matcher: SimilarityMatcher,
    dispatcher: TriageDispatcher,
    assessor: Arc<ImpactAssessor>,
    router: NotificationRouter,
    issues: Arc<dyn IssueSink>,
    digest: Option<Arc<SimilarityNotifier>>,
    extra_labels: Vec<String>,
}

impl TriagePipeline {
    /// Creates a pipeline with default components: the built-in keyword
    /// table, no oracle (every assessment degrades), issues logged only and
    /// no digest webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if the default classifier cannot be built.
    pub fn new(store: Arc<KnowledgeStore>, registry: Arc<RelationshipRegistry>) -> Result<Self> {
        Ok(Self {
            dispatcher: TriageDispatcher::new(Arc::clone(&registry)),
            store,
            registry,
            classifier: ChangeClassifier::new()?,
            matcher: SimilarityMatcher::new(),
            assessor: Arc::new(ImpactAssessor::new(Arc::new(DisabledOracle))),
            router: NotificationRouter::new(),
            issues: Arc::new(LogIssueSink),
            digest: None,
            extra_labels: Vec::new(),
        })
    }

    /// Builds the pipeline described by a configuration.
    ///
    /// Opens the knowledge base file and loads the relationship registry;
    /// without a registry path the registry is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid registry, keyword table or
    /// webhook, and an I/O error if the knowledge base cannot be read.
    pub fn from_config(config: &RippleConfig) -> Result<Self> {
        let store = KnowledgeStore::open(JsonFileBackend::new(&config.knowledge_base_path))?;
        let registry = match &config.registry_path {
            Some(path) => RelationshipRegistry::load(path)?,
            None => {
                tracing::warn!("No relationship registry configured, nothing will be dispatched");
                RelationshipRegistry::empty()
            },
        };

        let mut pipeline = Self::new(Arc::new(store), Arc::new(registry))?
            .with_classifier(ChangeClassifier::with_keywords(&config.classifier.keywords)?)
            .with_matcher(SimilarityMatcher::with_config(config.similarity))
            .with_assessor(
                ImpactAssessor::new(config.oracle.build()).with_policy(config.oracle.policy()),
            )
            .with_router(NotificationRouter::with_config(config.triage))
            .with_issue_sink(config.issues.build())
            .with_extra_labels(config.issues.extra_labels.clone());
        if let Some(notifier) = config.webhook.build()? {
            pipeline = pipeline.with_digest(notifier);
        }

        tracing::info!(
            knowledge_base = %config.knowledge_base_path.display(),
            relationships = pipeline.registry.relationship_count(),
            oracle = pipeline.assessor.oracle_name(),
            issues = pipeline.issues.name(),
            digest = pipeline.digest.is_some(),
            "Triage pipeline ready"
        );
        Ok(pipeline)
    }

    /// Replaces the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ChangeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the similarity matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: SimilarityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Replaces the impact assessor.
    #[must_use]
    pub fn with_assessor(mut self, assessor: ImpactAssessor) -> Self {
        self.assessor = Arc::new(assessor);
        self
    }

    /// Replaces the router.
    #[must_use]
    pub fn with_router(mut self, router: NotificationRouter) -> Self {
        self.router = router;
        self
    }

    /// Replaces the issue sink.
    #[must_use]
    pub fn with_issue_sink(mut self, issues: Arc<dyn IssueSink>) -> Self {
        self.issues = issues;
        self
    }

    /// Enables the similarity digest webhook.
    #[must_use]
    pub fn with_digest(mut self, notifier: SimilarityNotifier) -> Self {
        self.digest = Some(Arc::new(notifier));
        self
    }

    /// Labels added to every issue.
    #[must_use]
    pub fn with_extra_labels(mut self, labels: Vec<String>) -> Self {
        self.extra_labels = labels;
        self
    }

    /// The knowledge store.
    #[must_use]
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// The relationship registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RelationshipRegistry> {
        &self.registry
    }

    /// Processes one change notification end to end.
    ///
    /// Individual oracle, issue and webhook failures are isolated per
    /// relationship and reported in the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed notification and an
    /// error if the snapshot cannot be persisted. A failed ledger claim only
    /// skips its own relationship.
    #[instrument(skip_all, fields(repo = %notification.repo, commit_id = %notification.commit_id))]
    pub async fn process(&self, notification: ChangeNotification) -> Result<PipelineReport> {
        notification.validate()?;
        metrics::counter!("ripple_events_total").increment(1);

        let tags = self.classifier.classify(&notification);
        let profile = notification.profile();
        let event = notification.into_event(tags);

        let outcome = self
            .store
            .record_snapshot(&event.repo, &event.commit_id, profile)
            .await?;
        let (duplicate, history_entry) = match outcome {
            RecordOutcome::Appended(entry) => (false, Some(entry)),
            RecordOutcome::Duplicate => (true, None),
        };

        let similarities = self.similar_to(&event.repo)?;
        let digest = if duplicate {
            None
        } else {
            self.send_digest(&event, &similarities).await
        };

        let tasks = self.dispatcher.plan(&event);
        let (assessments, decisions) = if duplicate {
            let already = Error::DuplicateEvent {
                repo: event.repo.clone(),
                commit_id: event.commit_id.clone(),
            };
            tracing::debug!(reason = %already, tasks = tasks.len(), "Skipping assessments");
            metrics::counter!("ripple_notifications_total", "action" => "duplicate")
                .increment(tasks.len() as u64);
            let decisions: Vec<NotificationDecision> = tasks
                .iter()
                .map(|task| NotificationRouter::duplicate(task.relationship.id(), &event.commit_id))
                .collect();
            (Vec::new(), decisions)
        } else {
            let assessments = self
                .dispatcher
                .run(&event, tasks, &self.assessor, &self.store)
                .await;
            let decisions = self.route_all(&assessments, &event.commit_id).await;
            (assessments, decisions)
        };

        let deliveries = self.open_issues(&event, &assessments, &decisions).await;

        tracing::info!(
            duplicate,
            categories = ?event.changed_categories,
            similar = similarities.len(),
            assessed = assessments.len(),
            issues = deliveries.len(),
            "Processed change notification"
        );

        Ok(PipelineReport {
            event,
            duplicate,
            history_entry,
            similarities,
            assessments,
            decisions,
            deliveries,
            digest,
        })
    }

    /// Replaces the stored record of an already recorded commit.
    ///
    /// Nothing is dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed notification or a
    /// commit that is not in the repository history.
    pub async fn reanalyze(&self, notification: ChangeNotification) -> Result<()> {
        notification.validate()?;
        let profile = notification.profile();
        self.store
            .reanalyze(&notification.repo, &notification.commit_id, profile)
            .await
    }

    /// Ranks every other stored repository against `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `repo` is not stored.
    pub fn similar_to(&self, repo: &str) -> Result<Vec<SimilarityMatch>> {
        let candidate = self
            .store
            .record(repo)
            .ok_or_else(|| Error::InvalidInput(format!("unknown repository '{repo}'")))?;
        let records = self.store.records();
        Ok(self.matcher.rank(&candidate, &records))
    }

    /// Routes every assessment; ledger writes run on a blocking thread.
    async fn route_all(
        &self,
        assessments: &[TriageAssessment],
        commit_id: &str,
    ) -> Vec<NotificationDecision> {
        let router = self.router.clone();
        let store = Arc::clone(&self.store);
        let batch = assessments.to_vec();
        let commit = commit_id.to_string();
        match tokio::task::spawn_blocking(move || router.route_all(&batch, &commit, &store)).await {
            Ok(decisions) => decisions,
            Err(join_error) => {
                let failure = Error::OperationFailed {
                    operation: "route".to_string(),
                    cause: join_error.to_string(),
                };
                assessments
                    .iter()
                    .map(|a| NotificationRouter::unclaimed(a.relationship_id(), commit_id, &failure))
                    .collect()
            },
        }
    }

    async fn send_digest(
        &self,
        event: &ChangeEvent,
        similarities: &[SimilarityMatch],
    ) -> Option<DeliveryResult> {
        let notifier = Arc::clone(self.digest.as_ref()?);
        let digest = SimilarityDigest::from_matches(event, similarities)?;
        match tokio::task::spawn_blocking(move || notifier.notify(&digest)).await {
            Ok(result) => Some(result),
            Err(join_error) => {
                tracing::warn!(error = %join_error, "Similarity digest task aborted");
                Some(DeliveryResult::failure(None, join_error.to_string(), 0, 0))
            },
        }
    }

    /// Opens one issue per `create_issue` decision, concurrently.
    async fn open_issues(
        &self,
        event: &ChangeEvent,
        assessments: &[TriageAssessment],
        decisions: &[NotificationDecision],
    ) -> Vec<IssueDelivery> {
        let handles: Vec<_> = assessments
            .iter()
            .zip(decisions)
            .filter(|(_, decision)| decision.action == NotificationAction::CreateIssue)
            .map(|(assessment, decision)| {
                let request = IssueRequest::from_assessment(assessment, event, &self.extra_labels);
                let sink = Arc::clone(&self.issues);
                let target = request.target_repo.clone();
                let handle = tokio::task::spawn_blocking(move || sink.create_issue(&request));
                (decision.relationship_id.clone(), target, handle)
            })
            .collect();

        let mut deliveries = Vec::with_capacity(handles.len());
        for (relationship_id, target_repo, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => DeliveryResult::failure(None, err.to_string(), 0, 0),
                Err(join_error) => DeliveryResult::failure(None, join_error.to_string(), 0, 0),
            };
            metrics::counter!("ripple_issue_deliveries_total", "status" => result.status_label())
                .increment(1);
            if !result.success {
                let failure = Error::NotificationDelivery {
                    target: target_repo.clone(),
                    cause: result.error.clone().unwrap_or_default(),
                };
                tracing::warn!(
                    relationship = %relationship_id,
                    attempts = result.attempts,
                    error = %failure,
                    "Issue delivery failed"
                );
            }
            deliveries.push(IssueDelivery {
                relationship_id,
                target_repo,
                result,
            });
        }
        deliveries
    }
}
