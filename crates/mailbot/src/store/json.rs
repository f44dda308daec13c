//! JSON file [`StoreBackend`] (`processed.json`).

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{Result, StoreError};
use super::{ProcessedStore, StoreBackend};

/// Default file name inside the data directory.
pub const DEFAULT_FILE_NAME: &str = "processed.json";

/// Stores the processed senders as one pretty-printed JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StoreBackend for JsonFileStore {
    fn load(&self) -> Result<ProcessedStore> {
        if !self.path.exists() {
            log::debug!("No store at {}, starting empty", self.path.display());
            return Ok(ProcessedStore::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(ProcessedStore::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Json {
            path: self.path.clone(),
            source: e,
        })
    }

    fn save(&self, store: &ProcessedStore) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let content = serde_json::to_string_pretty(store).map_err(|e| StoreError::Json {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(|e| self.io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(&self.path, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
