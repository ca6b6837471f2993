//! `check` command: pre-commit similarity warnings.

use super::{read_input, write_error};
use crate::services::precheck::{self, DEFAULT_WARNING_LIMIT};
use crate::storage::KnowledgeStore;
use crate::{Error, Result};
use std::io::Write;
use std::process::Command;

/// Arguments for [`cmd_check`].
#[derive(Debug, Clone)]
pub struct CheckArgs {
    /// Diff file, `-` for stdin, or `None` for `git diff --cached`.
    pub diff: Option<String>,
    /// Repository being committed to; read from `origin` when unset.
    pub repo: Option<String>,
    /// Maximum warnings (0 = unlimited).
    pub limit: usize,
}

impl Default for CheckArgs {
    fn default() -> Self {
        Self {
            diff: None,
            repo: None,
            limit: DEFAULT_WARNING_LIMIT,
        }
    }
}

/// Runs the pre-commit check and writes one block per warning.
///
/// Returns the number of warnings; the caller decides whether that fails
/// the commit.
///
/// # Errors
///
/// Returns an error if the diff cannot be read or the repository cannot be
/// determined.
pub fn cmd_check(store: &KnowledgeStore, args: &CheckArgs, out: &mut impl Write) -> Result<usize> {
    let diff = match args.diff.as_deref() {
        Some(source) => read_input(source)?,
        None => staged_diff()?,
    };
    let repo = match &args.repo {
        Some(repo) => repo.clone(),
        None => current_repo_from_git().ok_or_else(|| {
            Error::InvalidInput(
                "cannot determine repository from `git remote get-url origin`; pass --repo"
                    .to_string(),
            )
        })?,
    };

    let warnings = precheck::check_diff(&diff, &repo, store, args.limit);
    if warnings.is_empty() {
        writeln!(out, "No similar patterns found in other repositories.").map_err(write_error)?;
        return Ok(0);
    }

    for warning in &warnings {
        writeln!(out, "warning: {}", warning.message).map_err(write_error)?;
        writeln!(out, "  hint: {}", warning.suggestion).map_err(write_error)?;
    }
    Ok(warnings.len())
}

/// Returns the output of `git diff --cached`.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if git cannot be run or fails.
pub fn staged_diff() -> Result<String> {
    let output = Command::new("git")
        .args(["diff", "--cached"])
        .output()
        .map_err(|e| Error::OperationFailed {
            operation: "git_diff".to_string(),
            cause: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(Error::OperationFailed {
            operation: "git_diff".to_string(),
            cause: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Reads `owner/repo` from the `origin` remote of the current directory.
#[must_use]
pub fn current_repo_from_git() -> Option<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    precheck::repo_from_remote_url(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternProfile;

    const DIFF: &str = "\
--- a/src/client.rs
+++ b/src/client.rs
@@ -1,2 +1,3 @@
+// retry with backoff around the invoice call
 fn call() {}
";

    async fn store_with_template() -> KnowledgeStore {
        let store = KnowledgeStore::in_memory();
        let mut profile = PatternProfile::default();
        profile.patterns.insert("retry with backoff".to_string());
        store
            .record_snapshot("acme/template", "t1", profile)
            .await
            .expect("record");
        store
    }

    #[tokio::test]
    async fn test_check_reports_warning() {
        let store = store_with_template().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("staged.diff");
        std::fs::write(&path, DIFF).expect("write");

        let args = CheckArgs {
            diff: Some(path.to_string_lossy().into_owned()),
            repo: Some("acme/api".to_string()),
            ..CheckArgs::default()
        };
        let mut out = Vec::new();
        let count = cmd_check(&store, &args, &mut out).expect("check");
        assert_eq!(count, 1);
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("acme/template"));
    }

    #[tokio::test]
    async fn test_check_own_repo_is_quiet() {
        let store = store_with_template().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("staged.diff");
        std::fs::write(&path, DIFF).expect("write");

        let args = CheckArgs {
            diff: Some(path.to_string_lossy().into_owned()),
            repo: Some("acme/template".to_string()),
            ..CheckArgs::default()
        };
        assert_eq!(cmd_check(&store, &args, &mut Vec::new()).expect("check"), 0);
    }
}
