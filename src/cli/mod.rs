//! CLI command implementations.
//!
//! Each handler writes its output to a caller-supplied writer so the binary
//! can print to stdout and tests can capture it. Logs never go there.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Process one change notification and print a JSON report |
//! | `similar` | Rank stored repositories against one repository |
//! | `history` | Print a repository's pattern history |
//! | `check` | Warn when a staged diff duplicates patterns stored elsewhere |
//! | `registry validate` | Parse a relationship registry and print counts |
//! | `config show` | Print the effective configuration (secrets redacted) |
//!
//! # Example Usage
//!
//! ```bash
//! # Triage a notification produced by the extractor
//! ripple ingest event.json
//!
//! # Pipe one in
//! cat event.json | ripple ingest -
//!
//! # Pre-commit hook
//! git diff --cached | ripple check - --strict
//! ```

mod check;
mod config;
mod ingest;
mod inspect;
mod registry;

pub use check::{CheckArgs, cmd_check, current_repo_from_git, staged_diff};
pub use config::cmd_config_show;
pub use ingest::cmd_ingest;
pub use inspect::{cmd_history, cmd_similar};
pub use registry::cmd_registry_validate;

use crate::{Error, Result};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::Path;

/// Marker for "read from stdin".
pub const STDIN: &str = "-";

/// Reads a file, or stdin when `source` is `-`.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the input cannot be read.
pub fn read_input(source: &str) -> Result<String> {
    if source == STDIN {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| Error::OperationFailed {
                operation: "read_stdin".to_string(),
                cause: e.to_string(),
            })?;
        return Ok(buffer);
    }
    std::fs::read_to_string(Path::new(source)).map_err(|e| Error::OperationFailed {
        operation: "read_input".to_string(),
        cause: format!("{source}: {e}"),
    })
}

/// Writes `value` as pretty JSON followed by a newline.
pub(crate) fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_output".to_string(),
        cause: e.to_string(),
    })?;
    writeln!(out, "{json}").map_err(write_error)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn write_error(e: io::Error) -> Error {
    Error::OperationFailed {
        operation: "write_output".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_input_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("event.json");
        std::fs::write(&path, "{}").expect("write");
        assert_eq!(read_input(&path.to_string_lossy()).expect("read"), "{}");
    }

    #[test]
    fn test_read_input_missing_file() {
        assert!(matches!(
            read_input("/definitely/not/here.json"),
            Err(Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_write_json_pretty() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({"a": 1})).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"a\": 1"));
    }
}
