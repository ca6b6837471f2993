//! # Ripple
//!
//! Cross-repository change triage.
//!
//! Ripple records the semantic patterns an external extractor produced for
//! each commit, finds repositories that solve similar problems, and for every
//! registered provider → dependent relationship decides whether a change is
//! worth an issue on the dependent repository.
//!
//! ## Pipeline
//!
//! ```text
//! ChangeNotification -> Classifier -> Knowledge Store (append, dedup)
//!                                  -> Similarity Matcher -> digest webhook
//!                                  -> Dispatcher -> Oracle (parallel) -> Router -> issues
//! ```
//!
//! Everything except the oracle and the outbound notification calls is pure,
//! deterministic computation; those two collaborators sit behind traits so
//! tests can substitute deterministic stubs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ripple::services::TriagePipeline;
//!
//! let pipeline = TriagePipeline::from_config(&config)?;
//! let report = pipeline.process(notification).await?;
//! for decision in &report.decisions {
//!     println!("{} -> {}", decision.relationship_id, decision.action);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod http;
pub mod models;
pub mod notify;
pub mod observability;
pub mod oracle;
pub mod services;
pub mod storage;

pub use config::RippleConfig;
pub use models::{
    CategoryTag, ChangeEvent, ChangeNotification, HistoryEntry, NotificationAction,
    NotificationDecision, PatternProfile, Relationship, RelationshipId, RelationshipKind,
    RepositoryRecord, TriageAssessment, Urgency,
};
pub use oracle::ImpactOracle;
pub use services::{
    ChangeClassifier, NotificationRouter, RelationshipRegistry, SimilarityMatcher,
    TriageDispatcher, TriagePipeline,
};
pub use storage::KnowledgeStore;

/// Error type for ripple operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed change notification, unknown repository on a query |
/// | `Config` | Relationship registry or config file is malformed (fatal at load) |
/// | `TransientOracle` | Oracle timeout or transport failure (retried, then degraded) |
/// | `MalformedOracleResponse` | Oracle answered with something that is not the response contract |
/// | `OracleUnavailable` | No oracle endpoint configured |
/// | `DuplicateEvent` | A commit was already processed for a repository or relationship |
/// | `NotificationDelivery` | Issue or webhook delivery failed after retries |
/// | `OperationFailed` | I/O and serialization failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is malformed.
    ///
    /// Raised when:
    /// - A relationship entry is missing its target repository
    /// - A relationship names an unknown `kind` or category tag
    /// - A consumer has no triggers or a template has no shared concerns
    /// - The config file cannot be parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// The oracle call timed out or failed in transport.
    #[error("oracle call failed: {0}")]
    TransientOracle(String),

    /// The oracle answered with an unparseable response.
    #[error("malformed oracle response: {0}")]
    MalformedOracleResponse(String),

    /// No oracle is configured; assessments degrade immediately.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The same commit was submitted again.
    ///
    /// Never surfaced to callers as a failure: the pipeline turns it into a
    /// `skip` decision.
    #[error("duplicate event: {repo}@{commit_id}")]
    DuplicateEvent {
        /// Repository (or relationship id) the commit was seen for.
        repo: String,
        /// The repeated commit id.
        commit_id: String,
    },

    /// Outbound issue or webhook delivery failed.
    #[error("notification delivery to '{target}' failed: {cause}")]
    NotificationDelivery {
        /// Delivery target (repository or webhook name).
        target: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Whether the assessment path should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientOracle(_) | Self::MalformedOracleResponse(_)
        )
    }
}

/// Result type alias for ripple operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::DuplicateEvent {
            repo: "acme/api".to_string(),
            commit_id: "abc123".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate event: acme/api@abc123");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::TransientOracle("timeout".to_string()).is_transient());
        assert!(Error::MalformedOracleResponse("not json".to_string()).is_transient());
        assert!(!Error::OracleUnavailable("no endpoint".to_string()).is_transient());
        assert!(!Error::Config("bad".to_string()).is_transient());
    }
}
