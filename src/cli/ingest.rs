//! `ingest` command.

use super::write_json;
use crate::Result;
use crate::models::ChangeNotification;
use crate::services::TriagePipeline;
use serde_json::json;
use std::io::Write;

/// Processes one change notification and writes a JSON report.
///
/// With `reanalyze`, the commit's stored snapshot is replaced instead and
/// nothing is dispatched.
///
/// # Errors
///
/// Returns an error for a malformed notification or a storage failure.
/// Oracle and delivery failures are part of the report, not errors.
pub async fn cmd_ingest(
    pipeline: &TriagePipeline,
    input: &str,
    reanalyze: bool,
    out: &mut impl Write,
) -> Result<()> {
    let notification = ChangeNotification::from_json(input)?;

    if reanalyze {
        let repo = notification.repo.clone();
        let commit_id = notification.commit_id.clone();
        pipeline.reanalyze(notification).await?;
        return write_json(
            out,
            &json!({ "repo": repo, "commit_id": commit_id, "reanalyzed": true }),
        );
    }

    let report = pipeline.process(notification).await?;
    write_json(out, &report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KnowledgeStore;
    use crate::services::RelationshipRegistry;
    use crate::Error;
    use std::sync::Arc;

    fn pipeline() -> TriagePipeline {
        TriagePipeline::new(
            Arc::new(KnowledgeStore::in_memory()),
            Arc::new(RelationshipRegistry::empty()),
        )
        .expect("pipeline")
    }

    const EVENT: &str = r#"{
        "repo": "acme/api",
        "commit_id": "c1",
        "extracted_patterns": ["retry with backoff"],
        "files_changed": ["src/client.rs"]
    }"#;

    #[tokio::test]
    async fn test_ingest_prints_report() {
        let pipeline = pipeline();
        let mut out = Vec::new();
        cmd_ingest(&pipeline, EVENT, false, &mut out).await.expect("ingest");
        let report: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(report["duplicate"], false);
        assert_eq!(report["event"]["repo"], "acme/api");
    }

    #[tokio::test]
    async fn test_reanalyze_after_ingest() {
        let pipeline = pipeline();
        cmd_ingest(&pipeline, EVENT, false, &mut Vec::new())
            .await
            .expect("ingest");
        let mut out = Vec::new();
        cmd_ingest(&pipeline, EVENT, true, &mut out).await.expect("reanalyze");
        let report: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(report["reanalyzed"], true);
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let result = cmd_ingest(&pipeline(), "not json", false, &mut Vec::new()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
