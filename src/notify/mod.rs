//! Outbound notifications.
//!
//! Two targets leave the process:
//!
//! - **Issues**: one issue per `create_issue` decision, opened on the
//!   dependent repository through an [`IssueSink`].
//! - **Similarity digest**: an optional chat webhook told which stored
//!   repositories resemble a freshly recorded snapshot.
//!
//! Both use blocking HTTP with exponential backoff ([`RetryConfig`]) and
//! are called from `spawn_blocking`. Delivery failures are reported, never
//! propagated into the knowledge store.

mod delivery;
mod issues;
mod payload;
mod webhook;

pub use delivery::{DeliveryResult, RetryConfig};
pub use issues::{GitHubIssueSink, IssueRequest, IssueSink, LogIssueSink};
pub use payload::{DigestEntry, PayloadFormat, SimilarityDigest, compute_hmac_signature};
pub use webhook::SimilarityNotifier;
