//! Named per-repository write locks.
//!
//! Appends to a repository's pattern history follow a single-writer
//! discipline: concurrent events for the same repository queue on that
//! repository's lock, events for different repositories never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Lock table keyed by repository name.
#[derive(Debug, Default)]
pub struct RepoLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock for `repo`, creating it on first use.
    pub async fn acquire(&self, repo: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(
                table
                    .entry(repo.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of repositories that have a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns true if no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_repo_is_exclusive() {
        let locks = Arc::new(RepoLocks::new());
        let guard = locks.acquire("acme/api").await;

        let contender = Arc::clone(&locks);
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire("acme/api").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second writer proceeds after release")
            .expect("task joins");
    }

    #[tokio::test]
    async fn test_different_repos_do_not_contend() {
        let locks = RepoLocks::new();
        let _a = locks.acquire("acme/a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), locks.acquire("acme/b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
