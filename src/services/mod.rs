//! Triage services.
//!
//! Each service owns one step of the pipeline; [`TriagePipeline`] wires
//! them together around a shared [`KnowledgeStore`](crate::storage::KnowledgeStore).

mod assessment;
mod classifier;
mod dispatcher;
mod matcher;
mod pipeline;
pub mod precheck;
mod registry;
mod router;

pub use assessment::{
    AssessmentPolicy, AssessmentTask, ImpactAssessor, normalize_confidence, resolve_urgency,
};
pub use classifier::ChangeClassifier;
pub use dispatcher::TriageDispatcher;
pub use matcher::{MatcherConfig, SimilarityMatch, SimilarityMatcher, normalize_element};
pub use pipeline::{IssueDelivery, PipelineReport, TriagePipeline};
pub use precheck::{PrecheckWarning, check_diff};
pub use registry::RelationshipRegistry;
pub use router::{NotificationRouter, RouterConfig, ledger_key};
