//! `registry validate` command.

use super::{write_error, write_json};
use crate::services::RelationshipRegistry;
use crate::{Error, Result};
use serde_json::json;
use std::io::Write;
use std::path::Path;

/// Loads a registry file and writes its provider and relationship counts.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file is unreadable or invalid, and
/// [`Error::InvalidInput`] when no path is given or configured.
pub fn cmd_registry_validate(path: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let path = path.ok_or_else(|| {
        Error::InvalidInput("no registry path given and none configured".to_string())
    })?;
    let registry = RelationshipRegistry::load(path)?;
    write_json(
        out,
        &json!({
            "path": path.display().to_string(),
            "valid": true,
            "providers": registry.provider_count(),
            "relationships": registry.relationship_count(),
        }),
    )?;
    out.flush().map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{"acme/api": {"consumers": [{"repo": "acme/web", "change_triggers": ["api_contract"]}]}}"#,
        )
        .expect("write");

        let mut out = Vec::new();
        cmd_registry_validate(Some(&path), &mut out).expect("validate");
        let summary: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(summary["providers"], 1);
        assert_eq!(summary["relationships"], 1);
    }

    #[test]
    fn test_invalid_registry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "[1, 2").expect("write");
        assert!(matches!(
            cmd_registry_validate(Some(&path), &mut Vec::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_path() {
        assert!(matches!(
            cmd_registry_validate(None, &mut Vec::new()),
            Err(Error::InvalidInput(_))
        ));
    }
}
