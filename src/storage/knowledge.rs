//! Knowledge store: append-only pattern history per repository.

use super::{KnowledgeBackend, MemoryBackend, RepoLocks};
use crate::models::{HistoryEntry, PatternProfile, RepositoryRecord};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use tracing::instrument;

/// Stored state of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Latest pattern fields.
    #[serde(rename = "patterns", default)]
    pub profile: PatternProfile,
    /// Every recorded snapshot, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// The whole knowledge base document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Repository name → stored state.
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryEntry>,
    /// Claimed `(relationship, commit)` notification keys.
    #[serde(default)]
    pub notifications: BTreeSet<String>,
    /// When the document was first created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the document last changed.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl KnowledgeBase {
    /// Creates an empty document stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

/// Result of submitting a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new history entry was appended.
    Appended(HistoryEntry),
    /// The commit was already in the repository history; nothing changed.
    Duplicate,
}

impl RecordOutcome {
    /// Returns true for [`RecordOutcome::Duplicate`].
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Owner of repository records and their history.
///
/// Reads take a shared lock on the in-memory document. Snapshot appends
/// first take the repository's named write lock, then build the next
/// document, persist it and only then publish it, so a failed write leaves
/// the in-memory state untouched.
pub struct KnowledgeStore {
    state: RwLock<KnowledgeBase>,
    backend: Box<dyn KnowledgeBackend>,
    locks: RepoLocks,
}

impl KnowledgeStore {
    /// Opens a store over the given backend, loading its current document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot load its data.
    pub fn open(backend: impl KnowledgeBackend + 'static) -> Result<Self> {
        let knowledge = backend.load()?;
        tracing::debug!(
            backend = backend.name(),
            repositories = knowledge.repositories.len(),
            "Loaded knowledge base"
        );
        Ok(Self {
            state: RwLock::new(knowledge),
            backend: Box::new(backend),
            locks: RepoLocks::new(),
        })
    }

    /// Creates an empty store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(KnowledgeBase::new()),
            backend: Box::new(MemoryBackend::new()),
            locks: RepoLocks::new(),
        }
    }

    /// Records the pattern snapshot of `commit_id` for `repo`.
    ///
    /// The repository record is replaced wholesale and a history entry is
    /// appended. Submitting a commit that is already in the history is a
    /// no-op returning [`RecordOutcome::Duplicate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to persist the document.
    #[instrument(skip(self, profile), fields(repo = %repo, commit_id = %commit_id))]
    pub async fn record_snapshot(
        &self,
        repo: &str,
        commit_id: &str,
        profile: PatternProfile,
    ) -> Result<RecordOutcome> {
        let _guard = self.locks.acquire(repo).await;

        if self.contains_commit(repo, commit_id) {
            tracing::debug!("Commit already recorded, skipping append");
            metrics::counter!("ripple_snapshots_total", "status" => "duplicate").increment(1);
            return Ok(RecordOutcome::Duplicate);
        }

        let now = Utc::now();
        let entry = self.apply(|next| {
            let state = next.repositories.entry(repo.to_string()).or_default();
            let timestamp = match state.history.last() {
                Some(last) if now <= last.timestamp => last.timestamp + Duration::milliseconds(1),
                _ => now,
            };
            let entry = HistoryEntry {
                timestamp,
                commit_id: commit_id.to_string(),
                patterns_snapshot: profile.clone(),
            };
            state.history.push(entry.clone());
            state.profile = profile;
            next.last_updated = Some(timestamp.max(now));
            entry
        })?;

        metrics::counter!("ripple_snapshots_total", "status" => "appended").increment(1);
        tracing::info!(history_len = self.history(repo).len(), "Recorded pattern snapshot");
        Ok(RecordOutcome::Appended(entry))
    }

    /// Replaces the current record of `repo` after re-analysis of a commit
    /// that is already in its history. History is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the commit was never recorded, or a
    /// backend error if persisting fails.
    #[instrument(skip(self, profile), fields(repo = %repo, commit_id = %commit_id))]
    pub async fn reanalyze(&self, repo: &str, commit_id: &str, profile: PatternProfile) -> Result<()> {
        let _guard = self.locks.acquire(repo).await;

        if !self.contains_commit(repo, commit_id) {
            return Err(Error::InvalidInput(format!(
                "cannot reanalyze {repo}@{commit_id}: commit was never recorded"
            )));
        }

        self.apply(|next| {
            if let Some(entry) = next.repositories.get_mut(repo) {
                entry.profile = profile;
            }
            next.last_updated = Some(Utc::now());
        })?;

        metrics::counter!("ripple_snapshots_total", "status" => "reanalyzed").increment(1);
        Ok(())
    }

    /// Claims a notification key. Returns `false` if it was already claimed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the claim fails; the key stays unclaimed.
    pub fn claim_notification(&self, key: &str) -> Result<bool> {
        if self.is_notification_claimed(key) {
            return Ok(false);
        }
        self.apply(|next| {
            let inserted = next.notifications.insert(key.to_string());
            if inserted {
                next.last_updated = Some(Utc::now());
            }
            inserted
        })
    }

    /// Returns true if `key` was already claimed.
    #[must_use]
    pub fn is_notification_claimed(&self, key: &str) -> bool {
        self.read_state().notifications.contains(key)
    }

    /// Returns true if `commit_id` is in the history of `repo`.
    #[must_use]
    pub fn contains_commit(&self, repo: &str, commit_id: &str) -> bool {
        self.read_state()
            .repositories
            .get(repo)
            .is_some_and(|e| e.history.iter().any(|h| h.commit_id == commit_id))
    }

    /// Returns the current record of `repo`.
    #[must_use]
    pub fn record(&self, repo: &str) -> Option<RepositoryRecord> {
        self.read_state()
            .repositories
            .get(repo)
            .map(|e| RepositoryRecord::new(repo, e.profile.clone()))
    }

    /// Returns every repository record, ordered by name.
    #[must_use]
    pub fn records(&self) -> Vec<RepositoryRecord> {
        self.read_state()
            .repositories
            .iter()
            .map(|(name, e)| RepositoryRecord::new(name.clone(), e.profile.clone()))
            .collect()
    }

    /// Returns the history of `repo`, oldest first.
    #[must_use]
    pub fn history(&self, repo: &str) -> Vec<HistoryEntry> {
        self.read_state()
            .repositories
            .get(repo)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    /// Number of stored repositories.
    #[must_use]
    pub fn repository_count(&self) -> usize {
        self.read_state().repositories.len()
    }

    /// When the document last changed.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_updated
    }

    /// Returns a copy of the whole document.
    #[must_use]
    pub fn snapshot(&self) -> KnowledgeBase {
        self.read_state().clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, KnowledgeBase> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Applies `change` to a copy of the document, persists the copy and
    /// swaps it in. On a save error the published document is unchanged.
    fn apply<R>(&self, change: impl FnOnce(&mut KnowledgeBase) -> R) -> Result<R> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut next = state.clone();
        let result = change(&mut next);
        self.backend.save(&next)?;
        *state = next;
        drop(state);
        Ok(result)
    }
}
