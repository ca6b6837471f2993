//! `similar` and `history` commands.

use super::write_json;
use crate::services::TriagePipeline;
use crate::storage::KnowledgeStore;
use crate::{Error, Result};
use std::io::Write;

/// Writes the matcher's ranking for a stored repository.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the repository is not stored.
pub fn cmd_similar(pipeline: &TriagePipeline, repo: &str, out: &mut impl Write) -> Result<()> {
    let matches = pipeline.similar_to(repo)?;
    write_json(out, &matches)
}

/// Writes a repository's history, oldest first.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the repository is not stored.
pub fn cmd_history(store: &KnowledgeStore, repo: &str, out: &mut impl Write) -> Result<()> {
    if store.record(repo).is_none() {
        return Err(Error::InvalidInput(format!("unknown repository '{repo}'")));
    }
    write_json(out, &store.history(repo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternProfile;

    #[tokio::test]
    async fn test_history_lists_snapshots() {
        let store = KnowledgeStore::in_memory();
        store
            .record_snapshot("acme/api", "c1", PatternProfile::default())
            .await
            .expect("record");
        store
            .record_snapshot("acme/api", "c2", PatternProfile::default())
            .await
            .expect("record");

        let mut out = Vec::new();
        cmd_history(&store, "acme/api", &mut out).expect("history");
        let history: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(history[0]["commit_id"], "c1");
        assert_eq!(history[1]["commit_id"], "c2");
    }

    #[test]
    fn test_history_unknown_repo() {
        let store = KnowledgeStore::in_memory();
        assert!(matches!(
            cmd_history(&store, "nobody/here", &mut Vec::new()),
            Err(Error::InvalidInput(_))
        ));
    }
}
