//! Workspace configuration structures

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::storage::{ArchiveLimits, QuarantineStorageAdapter, SimpleStorageAdapter, StorageAdapter};
use crate::workspace::MAX_CHECKPOINTS;

/// Top-level configuration, usually read from `fm.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// Guards applied when unpacking uploaded and checkpoint archives
    #[serde(default)]
    pub archive: ArchiveLimits,

    #[serde(default)]
    pub checking: CheckingConfig,
}

/// Where workspace content and records live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Permanent storage root
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// When set, new content lands here until persisted
    pub quarantine_path: Option<PathBuf>,

    /// Defaults to `<base_path>/deleted_workspace_logs`
    pub deleted_logs_path: Option<PathBuf>,

    /// Directory of JSON workspace records. Defaults to `<base_path>/.records`
    pub store_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            quarantine_path: None,
            deleted_logs_path: None,
            store_path: None,
        }
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

/// Checking pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckingConfig {
    /// Stop with an error after this many passes. Unbounded when unset.
    #[serde(default)]
    pub max_passes: Option<usize>,
}

// Serde default functions
fn default_base_path() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_checkpoints() -> usize {
    MAX_CHECKPOINTS
}

impl WorkspaceConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| WorkspaceError::io(path, source))?;
        toml::from_str(&content)
            .map_err(|e| WorkspaceError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Try to load config, returning defaults if the file doesn't exist.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, WorkspaceError> {
        match Self::load(path) {
            Err(err) if err.is_not_found() => Ok(Self::default()),
            other => other,
        }
    }

    /// The storage adapter this config describes.
    pub fn build_storage(&self) -> Arc<dyn StorageAdapter> {
        let storage = &self.storage;
        match &storage.quarantine_path {
            Some(quarantine) => {
                let mut adapter = QuarantineStorageAdapter::new(&storage.base_path, quarantine);
                if let Some(logs) = &storage.deleted_logs_path {
                    adapter = adapter.with_deleted_logs_path(logs);
                }
                Arc::new(adapter)
            }
            None => {
                let mut adapter = SimpleStorageAdapter::new(&storage.base_path);
                if let Some(logs) = &storage.deleted_logs_path {
                    adapter = adapter.with_deleted_logs_path(logs);
                }
                Arc::new(adapter)
            }
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.storage
            .store_path
            .clone()
            .unwrap_or_else(|| self.storage.base_path.join(".records"))
    }
}
