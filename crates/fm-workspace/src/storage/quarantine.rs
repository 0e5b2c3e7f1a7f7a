//! Quarantine adapter - new content lands in a holding area until persisted

use std::fs;
use std::path::{Path, PathBuf};

use super::safety::normalize_root;
use super::{merge_tree, StorageAdapter};
use crate::error::WorkspaceError;
use crate::file::FileRecord;
use crate::paths::PathResolver;

/// Keeps unpersisted content under a quarantine root and moves it to the
/// permanent root on `persist`.
///
/// Both roots use the same per-workspace layout, so persisting a file is
/// a move between two identically shaped trees.
#[derive(Debug, Clone)]
pub struct QuarantineStorageAdapter {
    permanent_path: PathBuf,
    quarantine_path: PathBuf,
    deleted_logs_path: PathBuf,
}

impl QuarantineStorageAdapter {
    pub fn new(permanent_path: impl AsRef<Path>, quarantine_path: impl AsRef<Path>) -> Self {
        let permanent_path = normalize_root(permanent_path);
        let deleted_logs_path = permanent_path.join("deleted_workspace_logs");
        Self {
            permanent_path,
            quarantine_path: normalize_root(quarantine_path),
            deleted_logs_path,
        }
    }

    pub fn with_deleted_logs_path(mut self, path: impl AsRef<Path>) -> Self {
        self.deleted_logs_path = normalize_root(path);
        self
    }
}

impl StorageAdapter for QuarantineStorageAdapter {
    fn name(&self) -> &str {
        "quarantine"
    }

    fn root(&self, is_persisted: bool) -> &Path {
        if is_persisted {
            &self.permanent_path
        } else {
            &self.quarantine_path
        }
    }

    fn roots(&self) -> Vec<&Path> {
        vec![self.permanent_path.as_path(), self.quarantine_path.as_path()]
    }

    fn deleted_logs_path(&self) -> &Path {
        &self.deleted_logs_path
    }

    /// Move the file (or directory tree) from quarantine to permanent
    /// storage. Directory trees are merged into whatever already exists.
    fn persist(&self, paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError> {
        let partition = file.partition();
        let from = self.get_path(paths, &file.path, partition, false)?;
        let to = self.get_path(paths, &file.path, partition, true)?;

        if !from.exists() {
            if to.exists() {
                // Already moved along with a parent directory.
                tracing::debug!(path = %file.path, "already persisted");
                return Ok(());
            }
            return Err(WorkspaceError::io(
                &from,
                std::io::Error::new(std::io::ErrorKind::NotFound, "nothing to persist"),
            ));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
        }
        merge_tree(&from, &to)?;
        tracing::debug!(upload_id = paths.upload_id(), path = %file.path, "persisted from quarantine");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Partition;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, QuarantineStorageAdapter, PathResolver) {
        let dir = tempdir().unwrap();
        let adapter =
            QuarantineStorageAdapter::new(dir.path().join("permanent"), dir.path().join("quarantine"));
        let paths = PathResolver::new(7);
        adapter.makedirs(&paths, Partition::Source).unwrap();
        (dir, adapter, paths)
    }

    #[test]
    fn new_content_lands_in_quarantine() {
        let (dir, adapter, paths) = setup();
        let file = FileRecord::new("a.tex");
        adapter.create(&paths, &file).unwrap();
        assert!(dir.path().join("quarantine/7/src/a.tex").exists());
        assert!(!dir.path().join("permanent/7/src/a.tex").exists());
    }

    #[test]
    fn persist_moves_to_permanent() {
        let (dir, adapter, paths) = setup();
        let file = FileRecord::new("a.tex");
        adapter.create(&paths, &file).unwrap();
        adapter.persist(&paths, &file).unwrap();
        assert!(!dir.path().join("quarantine/7/src/a.tex").exists());
        assert!(dir.path().join("permanent/7/src/a.tex").exists());
    }

    #[test]
    fn persist_directory_merges_and_children_are_then_noops() {
        let (dir, adapter, paths) = setup();
        let figs = FileRecord::directory("figs");
        let child = FileRecord::new("figs/a.png");
        adapter.create(&paths, &figs).unwrap();
        adapter.create(&paths, &child).unwrap();
        fs::create_dir_all(dir.path().join("permanent/7/src/figs")).unwrap();
        fs::write(dir.path().join("permanent/7/src/figs/old.png"), b"old").unwrap();

        adapter.persist(&paths, &figs).unwrap();
        assert!(dir.path().join("permanent/7/src/figs/a.png").exists());
        assert!(dir.path().join("permanent/7/src/figs/old.png").exists());
        adapter.persist(&paths, &child).unwrap();
    }

    #[test]
    fn persist_missing_file_fails() {
        let (_dir, adapter, paths) = setup();
        let err = adapter
            .persist(&paths, &FileRecord::new("ghost.tex"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_workspace_clears_both_roots() {
        let (dir, adapter, paths) = setup();
        adapter.create(&paths, &FileRecord::new("a.tex")).unwrap();
        adapter.delete_workspace(&paths).unwrap();
        assert!(!dir.path().join("quarantine/7").exists());
        assert!(!dir.path().join("permanent/7").exists());
    }
}
