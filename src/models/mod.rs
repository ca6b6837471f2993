//! Data models for ripple.
//!
//! This module contains the core data structures shared by the store, the
//! registry and the triage services.

mod assessment;
mod category;
mod event;
mod relationship;
mod repository;

pub use assessment::{
    FALLBACK_CONFIDENCE, NotificationAction, NotificationDecision, TriageAssessment,
};
pub use category::{CategoryTag, Urgency};
pub use event::{ChangeEvent, ChangeNotification, is_meaningful_path};
pub use relationship::{Relationship, RelationshipId, RelationshipKind};
pub use repository::{HistoryEntry, PatternProfile, RepositoryRecord, ReusableComponent};
