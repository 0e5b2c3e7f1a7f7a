//! Simple adapter - one root for everything, persisting is a no-op

use std::path::{Path, PathBuf};

use super::safety::normalize_root;
use super::StorageAdapter;
use crate::error::WorkspaceError;
use crate::file::FileRecord;
use crate::paths::PathResolver;

/// Stores every workspace under a single base directory.
///
/// Content is durable as soon as it is written, so `persist` does nothing
/// and the workspace only flips the record's flag.
#[derive(Debug, Clone)]
pub struct SimpleStorageAdapter {
    base_path: PathBuf,
    deleted_logs_path: PathBuf,
}

impl SimpleStorageAdapter {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        let base_path = normalize_root(base_path);
        let deleted_logs_path = base_path.join("deleted_workspace_logs");
        Self {
            base_path,
            deleted_logs_path,
        }
    }

    pub fn with_deleted_logs_path(mut self, path: impl AsRef<Path>) -> Self {
        self.deleted_logs_path = normalize_root(path);
        self
    }
}

impl StorageAdapter for SimpleStorageAdapter {
    fn name(&self) -> &str {
        "simple"
    }

    fn root(&self, _is_persisted: bool) -> &Path {
        &self.base_path
    }

    fn roots(&self) -> Vec<&Path> {
        vec![self.base_path.as_path()]
    }

    fn deleted_logs_path(&self) -> &Path {
        &self.deleted_logs_path
    }

    fn persist(&self, _paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError> {
        // No-op: content already lives in its final location
        tracing::debug!(path = %file.path, "SimpleStorageAdapter: persist() - no-op");
        Ok(())
    }
}
