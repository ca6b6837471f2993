//! Persistence backends for the knowledge base document.
//!
//! The store only needs "load the whole document" and "replace the whole
//! document"; the medium behind it is interchangeable.

use super::KnowledgeBase;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Maximum accepted size of a knowledge base file (16 MiB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Read/write contract for the knowledge base document.
pub trait KnowledgeBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Loads the document, or an empty one if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if stored data exists but cannot be read or parsed.
    fn load(&self) -> Result<KnowledgeBase>;

    /// Replaces the stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    fn save(&self, knowledge: &KnowledgeBase) -> Result<()>;
}

/// Keeps the document in memory only. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<KnowledgeBase>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with a document.
    #[must_use]
    pub fn with_document(knowledge: KnowledgeBase) -> Self {
        Self {
            saved: Mutex::new(Some(knowledge)),
        }
    }
}

impl KnowledgeBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<KnowledgeBase> {
        let saved = self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(saved.clone().unwrap_or_else(KnowledgeBase::new))
    }

    fn save(&self, knowledge: &KnowledgeBase) -> Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(knowledge.clone());
        Ok(())
    }
}

/// Stores the document as a single pretty-printed JSON file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write never leaves a truncated knowledge base behind.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Creates a backend for the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KnowledgeBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json_file"
    }

    fn load(&self) -> Result<KnowledgeBase> {
        if !self.path.exists() {
            return Ok(KnowledgeBase::new());
        }

        let metadata = fs::metadata(&self.path).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_stat".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::OperationFailed {
                operation: "knowledge_base_load".to_string(),
                cause: format!(
                    "{} is {} bytes, limit is {MAX_FILE_SIZE}",
                    self.path.display(),
                    metadata.len()
                ),
            });
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_read".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;
        if contents.trim().is_empty() {
            return Ok(KnowledgeBase::new());
        }

        serde_json::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_parse".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })
    }

    fn save(&self, knowledge: &KnowledgeBase) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "knowledge_base_mkdir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }

        let json = serde_json::to_string_pretty(knowledge).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_serialize".to_string(),
            cause: e.to_string(),
        })?;

        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_write".to_string(),
            cause: format!("{}: {e}", temp.display()),
        })?;
        fs::rename(&temp, &self.path).map_err(|e| Error::OperationFailed {
            operation: "knowledge_base_rename".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })
    }
}
