//! Storage layer.
//!
//! The knowledge base is a single document holding every repository's
//! latest pattern profile, its append-only history and the notification
//! ledger. [`KnowledgeStore`] owns it; a [`KnowledgeBackend`] persists it.

// Allow significant_drop_tightening - guards are released at scope end on purpose.
#![allow(clippy::significant_drop_tightening)]

mod backend;
mod knowledge;
mod locks;

pub use backend::{JsonFileBackend, KnowledgeBackend, MemoryBackend};
pub use knowledge::{KnowledgeBase, KnowledgeStore, RecordOutcome, RepositoryEntry};
pub use locks::RepoLocks;
