//! JSON file snapshots for pipeline state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// One named JSON document inside a state directory.
///
/// Saves go through a temporary sibling file and a rename, so a reader never
/// sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Creates a store for `<dir>/<name>.json`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, or `None` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let value = serde_json::from_slice(&bytes).map_err(|e| PipelineError::Persistence {
            reason: format!("failed to decode '{}': {e}", self.path.display()),
        })?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot loaded");
        Ok(Some(value))
    }

    /// Writes the document, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any filesystem step fails.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path).map_err(|e| PipelineError::Persistence {
            reason: format!("failed to replace '{}': {e}", self.path.display()),
        })?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }
}
