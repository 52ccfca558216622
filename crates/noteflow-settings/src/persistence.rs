//! File-backed history store
//!
//! Each key maps to `<directory>/<key>.json`. A save replaces the whole file
//! by writing a sibling temp file and renaming it over the old one.

use noteflow_core::{HistoryStore, PersistenceError};
use std::path::{Path, PathBuf};

/// [`HistoryStore`] that keeps one JSON file per key
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    directory: PathBuf,
}

impl FileHistoryStore {
    /// Store files under `directory`; it is created on first save
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The backing directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::Unavailable(format!(
                "'{}' is not a usable storage key",
                key
            )));
        }
        Ok(self.directory.join(format!("{}.json", key)))
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.directory)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        tracing::trace!("Saved {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}
