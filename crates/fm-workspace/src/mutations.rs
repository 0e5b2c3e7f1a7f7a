// mutations.rs — Operations that change which files a workspace holds.
//
// Each operation asks storage to do the physical work first and updates the
// index only once that succeeded, so a failed I/O call leaves the index
// pointing at what is actually on disk. Directory operations re-home every
// child record in the same partition.

use chrono::Utc;

use crate::error::WorkspaceError;
use crate::file::{FileKey, FileRecord};
use crate::file_type::FileType;
use crate::index::Partition;
use crate::ledger::Severity;
use crate::lifecycle::Status;
use crate::paths::{has_traversal, is_ancillary_path, strip_dot_slash};
use crate::storage::UnpackReport;
use crate::workspace::{FileFilter, Workspace};

/// Options for `Workspace::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub file_type: FileType,
    pub is_directory: bool,
    /// `None` infers from an `anc/` prefix on the path.
    pub is_ancillary: Option<bool>,
    pub is_system: bool,
    pub is_persisted: bool,
    /// Create the file on disk. When false the content must already exist
    /// (for example, just unpacked) and only its metadata is read.
    pub touch: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            file_type: FileType::Unknown,
            is_directory: false,
            is_ancillary: None,
            is_system: false,
            is_persisted: false,
            touch: true,
        }
    }
}

impl CreateOptions {
    pub fn directory() -> Self {
        Self {
            is_directory: true,
            file_type: FileType::Directory,
            ..Self::default()
        }
    }

    /// A persisted system file such as the source log.
    pub fn system() -> Self {
        Self {
            is_system: true,
            is_persisted: true,
            ..Self::default()
        }
    }

    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn ancillary(mut self, is_ancillary: bool) -> Self {
        self.is_ancillary = Some(is_ancillary);
        self
    }

    pub fn persisted(mut self, is_persisted: bool) -> Self {
        self.is_persisted = is_persisted;
        self
    }

    pub fn touch(mut self, touch: bool) -> Self {
        self.touch = touch;
        self
    }
}

/// `path` with a trailing `/` when it names a directory.
fn with_dir_suffix(path: &str, is_directory: bool) -> String {
    if is_directory && !path.ends_with('/') {
        format!("{}/", path)
    } else {
        path.to_string()
    }
}

impl Workspace {
    /// Register a new file (or directory), creating index entries for any
    /// missing parent directories in the same partition.
    pub fn create(&mut self, path: &str, options: CreateOptions) -> Result<FileKey, WorkspaceError> {
        let path = strip_dot_slash(path);
        let (path, is_ancillary) = match options.is_ancillary {
            Some(is_ancillary) => (path.to_string(), is_ancillary),
            None => is_ancillary_path(path),
        };
        if path.trim_matches('/').is_empty() {
            return Err(WorkspaceError::security(path, "empty path"));
        }
        if has_traversal(&path) {
            return Err(WorkspaceError::security(path, "escapes partition root"));
        }

        let mut record = if options.is_directory {
            FileRecord::directory(path)
        } else {
            let mut record = FileRecord::new(path);
            record.file_type = options.file_type;
            record
        };
        record.is_ancillary = is_ancillary;
        record.is_system = options.is_system;
        record.is_persisted = options.is_persisted;

        // Resolve once up front so an unsafe path never reaches the index.
        self.storage.file_path(&self.paths, &record)?;
        self.ensure_parents(&record, options.touch)?;

        if options.touch {
            self.storage.create(&self.paths, &record)?;
        } else {
            self.storage
                .set_last_modified(&self.paths, &record, Utc::now())?;
        }
        let key = record.key();
        tracing::debug!(upload_id = self.upload_id, file = %key, "create");
        self.files.set(record);
        self.refresh(&key)?;
        self.touch();
        Ok(key)
    }

    /// Index entries for each missing ancestor directory of `record`.
    fn ensure_parents(&mut self, record: &FileRecord, touch: bool) -> Result<(), WorkspaceError> {
        let partition = record.partition();
        let parts: Vec<&str> = record.path.trim_end_matches('/').split('/').collect();
        let mut prefix = String::new();
        for part in &parts[..parts.len().saturating_sub(1)] {
            prefix.push_str(part);
            prefix.push('/');
            if self.files.contains(&prefix, partition) {
                continue;
            }
            let mut dir = FileRecord::directory(prefix.clone());
            dir.is_ancillary = record.is_ancillary;
            dir.is_removed = record.is_removed;
            dir.is_system = record.is_system;
            dir.is_persisted = record.is_persisted;
            if touch {
                self.storage.create(&self.paths, &dir)?;
            }
            self.files.set(dir);
        }
        Ok(())
    }

    /// Register already-written files, then run the checks.
    pub fn add_files(&mut self, records: Vec<FileRecord>) -> Result<(), WorkspaceError> {
        for record in records {
            self.ensure_parents(&record, true)?;
            tracing::debug!(upload_id = self.upload_id, path = %record.path, "add file");
            self.files.set(record);
        }
        self.touch();
        self.perform_checks()
    }

    /// Copy a file (or directory tree) to `new_path` in the same partition.
    pub fn copy(&mut self, key: &FileKey, new_path: &str, replace: bool) -> Result<FileKey, WorkspaceError> {
        let original = self.file(key)?.clone();
        let new_path = with_dir_suffix(new_path, original.is_directory);
        if let Ok(existing) = self.files.get(&new_path, key.partition) {
            if existing.is_directory {
                return Err(WorkspaceError::DirectoryExists { path: new_path });
            }
            if !replace {
                return Err(WorkspaceError::FileExists { path: new_path });
            }
        }

        let mut copied = original.clone();
        copied.path = new_path.clone();
        copied.is_persisted = false;
        copied.errors.clear();
        self.ensure_parents(&copied, true)?;
        self.storage.copy(&self.paths, &original, &copied)?;

        let children = if original.is_directory {
            self.child_keys(key)?
        } else {
            Vec::new()
        };
        let new_key = copied.key();
        self.files.set(copied);
        for child in children {
            let mut record = self.file(&child)?.clone();
            record.path = format!("{}{}", new_path, &child.path[original.path.len()..]);
            record.is_persisted = false;
            record.errors.clear();
            self.files.set(record);
        }
        self.refresh(&new_key)?;
        self.touch();
        tracing::debug!(upload_id = self.upload_id, from = %key, to = %new_key, "copy");
        Ok(new_key)
    }

    /// Move a file (or directory tree) to `new_path` within its partition.
    pub fn rename(&mut self, key: &FileKey, new_path: &str) -> Result<FileKey, WorkspaceError> {
        let file = self.file(key)?.clone();
        let new_path = with_dir_suffix(new_path, file.is_directory);
        if new_path == file.path {
            return Ok(key.clone());
        }
        tracing::debug!(upload_id = self.upload_id, from = %key, to = %new_path, "rename");
        let children = if file.is_directory {
            self.child_keys(key)?
        } else {
            Vec::new()
        };
        self.storage
            .move_file(&self.paths, &file, &file.path, &new_path)?;

        self.files.pop(&file.path, key.partition);
        let mut moved = file.clone();
        moved.path = new_path.clone();
        self.ensure_parents(&moved, false)?;
        let new_key = moved.key();
        self.files.set(moved);
        self.rehome(children, &file.path, &new_path);
        self.touch();
        Ok(new_key)
    }

    /// Put `replace_with` where `to_replace` is, dropping `to_replace`.
    /// With `keep_refs`, entries on the replaced file carry over.
    pub fn replace(
        &mut self,
        to_replace: &FileKey,
        replace_with: &FileKey,
        keep_refs: bool,
    ) -> Result<FileKey, WorkspaceError> {
        let target = self.file(to_replace)?.clone();
        let source = self.file(replace_with)?.clone();
        let new_path = with_dir_suffix(target.path.trim_end_matches('/'), source.is_directory);
        tracing::debug!(upload_id = self.upload_id, target = %to_replace, with = %replace_with, "replace");

        let target_children = if target.is_directory {
            self.child_keys(to_replace)?
        } else {
            Vec::new()
        };
        let source_children = if source.is_directory {
            self.child_keys(replace_with)?
        } else {
            Vec::new()
        };
        self.storage
            .move_file(&self.paths, &source, &source.path, &new_path)?;

        self.files.pop(&target.path, to_replace.partition);
        for child in target_children {
            self.files.pop(&child.path, child.partition);
        }
        self.files.pop(&source.path, replace_with.partition);

        let mut moved = source.clone();
        moved.path = new_path.clone();
        if keep_refs {
            for mut entry in target.errors {
                entry.path = Some(new_path.clone());
                moved.errors.push(entry);
            }
        }
        let new_key = moved.key();
        self.files.set(moved);
        self.rehome(source_children, &source.path, &new_path);
        self.touch();
        Ok(new_key)
    }

    /// Re-key child records from `old_prefix` to `new_prefix`.
    fn rehome(&mut self, children: Vec<FileKey>, old_prefix: &str, new_prefix: &str) {
        for child in children {
            if let Some(mut record) = self.files.pop(&child.path, child.partition) {
                record.path = format!("{}{}", new_prefix, &child.path[old_prefix.len()..]);
                for entry in record.errors.iter_mut() {
                    entry.path = Some(record.path.clone());
                }
                self.files.set(record);
            }
        }
    }

    /// Move a file out of the active tree into the removed partition.
    /// Not the same as `delete`: the content is kept.
    pub fn remove(&mut self, key: &FileKey, reason: Option<&str>) -> Result<FileKey, WorkspaceError> {
        let file = self.file(key)?.clone();
        let reason = match reason {
            Some(reason) => reason.to_string(),
            None => format!("Removed file '{}'.", file.name()),
        };
        tracing::debug!(upload_id = self.upload_id, file = %key, %reason, "remove");
        let children = if file.is_directory {
            self.child_keys(key)?
        } else {
            Vec::new()
        };
        self.storage.remove(&self.paths, &file)?;

        for child in children {
            if let Some(mut record) = self.files.pop(&child.path, child.partition) {
                record.is_removed = true;
                self.files.set(record);
            }
        }

        self.files.pop(&file.path, key.partition);
        let mut removed = file;
        removed.is_removed = true;
        removed.reason_for_removal = Some(reason.clone());
        removed.add_entry(Severity::Info, reason, false);
        let new_key = removed.key();
        self.files.set(removed);
        self.touch();
        Ok(new_key)
    }

    /// Delete a file (or directory tree) outright.
    pub fn delete(&mut self, key: &FileKey) -> Result<(), WorkspaceError> {
        let file = self.file(key)?.clone();
        tracing::debug!(upload_id = self.upload_id, file = %key, "delete");
        let children = if file.is_directory {
            self.child_keys(key)?
        } else {
            Vec::new()
        };
        self.storage.delete(&self.paths, &file)?;
        self.files.pop(&file.path, key.partition);
        for child in children {
            self.files.pop(&child.path, child.partition);
        }
        self.touch();
        Ok(())
    }

    /// Delete every source and ancillary file and recreate the empty roots.
    pub fn delete_all_files(&mut self) -> Result<(), WorkspaceError> {
        tracing::info!(upload_id = self.upload_id, "delete all files");
        self.storage.delete_all(&self.paths)?;
        self.files.clear(Partition::Source);
        self.files.clear(Partition::Ancillary);
        self.storage.makedirs(&self.paths, Partition::Source)?;
        self.storage.makedirs(&self.paths, Partition::Ancillary)?;
        self.touch();
        Ok(())
    }

    /// Move one file to permanent storage.
    pub fn persist(&mut self, key: &FileKey) -> Result<(), WorkspaceError> {
        let file = self.file(key)?.clone();
        self.storage.persist(&self.paths, &file)?;
        let children = if file.is_directory {
            self.child_keys(key)?
        } else {
            Vec::new()
        };
        self.files.get_mut(&key.path, key.partition)?.is_persisted = true;
        for child in children {
            self.files.get_mut(&child.path, child.partition)?.is_persisted = true;
        }
        self.touch();
        Ok(())
    }

    /// Persist every file not yet persisted, system files included.
    pub fn persist_all(&mut self) -> Result<(), WorkspaceError> {
        let keys: Vec<FileKey> = self
            .iter_files(FileFilter::default().directories(true).system(true))
            .into_iter()
            .map(|f| f.key())
            .collect();
        for key in keys {
            // Persisting a directory also persists its children.
            if !self.file(&key)?.is_persisted {
                self.persist(&key)?;
            }
        }
        Ok(())
    }

    /// Extract a tarball next to itself and register what came out as
    /// unchecked files. Members that were refused are listed in the report;
    /// the tarball itself is left where it is.
    pub fn unpack_tarball(&mut self, key: &FileKey) -> Result<UnpackReport, WorkspaceError> {
        let archive = self.file(key)?.clone();
        let dir = archive.dir().to_string();
        let report = self.storage.unpack_tarfile(
            &self.paths,
            &archive,
            key.partition,
            &dir,
            archive.is_persisted,
            &self.archive_limits,
        )?;

        for name in &report.extracted {
            let path = format!("{}{}", dir, name);
            let is_directory = name.ends_with('/');
            let existing = self.files.contains(&path, key.partition);
            if existing {
                self.files.get_mut(&path, key.partition)?.is_checked = false;
                self.refresh(&FileKey::new(path, key.partition))?;
                continue;
            }
            let mut options = if is_directory {
                CreateOptions::directory()
            } else {
                CreateOptions::default()
            };
            options = options.persisted(archive.is_persisted).touch(false);
            if key.partition == Partition::Ancillary {
                options = options.ancillary(true);
            }
            self.create(&path, options)?;
        }
        tracing::debug!(
            upload_id = self.upload_id,
            file = %key,
            extracted = report.extracted.len(),
            skipped = report.skipped.len(),
            "unpacked"
        );
        Ok(report)
    }

    /// Remove every file of the workspace, in every root. The source log is
    /// copied aside first; failing to copy it does not stop the deletion.
    pub fn delete_workspace(&mut self) -> Result<bool, WorkspaceError> {
        if self.status == Status::Deleted {
            return Err(WorkspaceError::InvalidTransition {
                from: self.status.to_string(),
                to: Status::Deleted.to_string(),
            });
        }
        self.log_info(&format!(
            "Move source log for {} to '{}'.",
            self.upload_id,
            self.storage.deleted_logs_path().display()
        ));
        self.log_info(&format!("Delete workspace '{}'.", self.upload_id));
        if let Err(err) = self.stash_log() {
            tracing::warn!(upload_id = self.upload_id, error = %err, "saving source.log failed");
        }

        self.storage.delete_workspace(&self.paths)?;
        for partition in Partition::ALL {
            self.files.clear(partition);
        }
        self.mark_deleted()?;
        tracing::info!(upload_id = self.upload_id, "workspace deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{QuarantineStorageAdapter, SimpleStorageAdapter};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn workspace(dir: &std::path::Path) -> Workspace {
        let mut ws = Workspace::new(42, "owner", Arc::new(SimpleStorageAdapter::new(dir)));
        ws.initialize().unwrap();
        ws
    }

    fn add(ws: &mut Workspace, path: &str, content: &[u8]) -> FileKey {
        let key = ws.create(path, CreateOptions::default()).unwrap();
        ws.write_file(&key, content).unwrap();
        key
    }

    #[test]
    fn create_strips_dot_slash_and_infers_ancillary() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let key = ws.create("./anc/sub/data.csv", CreateOptions::default()).unwrap();
        assert_eq!(key, FileKey::new("sub/data.csv", Partition::Ancillary));
        assert!(ws.exists("sub/", Partition::Ancillary));
        assert!(dir.path().join("42/src/anc/sub/data.csv").exists());
    }

    #[test]
    fn create_refuses_traversal() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let err = ws
            .create("../../etc/passwd", CreateOptions::default())
            .unwrap_err();
        assert!(err.is_security());
        assert!(ws.files().partition(Partition::Source).is_empty());
    }

    #[test]
    fn remove_moves_content_and_records_reason() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let key = add(&mut ws, "junk.aux", b"aux");
        let removed = ws.remove(&key, None).unwrap();

        assert_eq!(removed.partition, Partition::Removed);
        assert!(!ws.exists("junk.aux", Partition::Source));
        let file = ws.file(&removed).unwrap();
        assert_eq!(file.reason_for_removal.as_deref(), Some("Removed file 'junk.aux'."));
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].severity, Severity::Info);
        assert!(!file.errors[0].is_persistent);
        assert!(dir.path().join("42/removed/junk.aux").exists());
        assert!(!dir.path().join("42/src/junk.aux").exists());
    }

    #[test]
    fn remove_directory_takes_children() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        add(&mut ws, "__MACOSX/a", b"x");
        add(&mut ws, "__MACOSX/b/c", b"y");
        ws.remove(&FileKey::source("__MACOSX/"), None).unwrap();
        assert!(ws.files().partition(Partition::Source).is_empty());
        assert!(ws.exists("__MACOSX/b/c", Partition::Removed));
        assert!(ws.exists("__MACOSX/", Partition::Removed));
    }

    #[test]
    fn rename_directory_rehomes_children() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        add(&mut ws, "figs/a.png", b"a");
        add(&mut ws, "figs/sub/b.png", b"b");
        let new_key = ws.rename(&FileKey::source("figs/"), "images").unwrap();
        assert_eq!(new_key, FileKey::source("images/"));
        assert!(ws.exists("images/a.png", Partition::Source));
        assert!(ws.exists("images/sub/b.png", Partition::Source));
        assert!(!ws.exists("figs/a.png", Partition::Source));
        assert_eq!(
            ws.read_file(&FileKey::source("images/sub/b.png")).unwrap(),
            b"b"
        );
    }

    #[test]
    fn copy_refuses_existing_unless_replacing() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let a = add(&mut ws, "a.tex", b"aaa");
        add(&mut ws, "b.tex", b"bbb");
        add(&mut ws, "d/x", b"x");

        let err = ws.copy(&a, "b.tex", false).unwrap_err();
        assert!(matches!(err, WorkspaceError::FileExists { .. }));
        let err = ws.copy(&a, "d/", true).unwrap_err();
        assert!(matches!(err, WorkspaceError::DirectoryExists { .. }));

        let b = ws.copy(&a, "b.tex", true).unwrap();
        assert_eq!(ws.read_file(&b).unwrap(), b"aaa");
        assert_eq!(ws.file(&b).unwrap().size_bytes, 3);
        let c = ws.copy(&a, "c.tex", false).unwrap();
        assert!(ws.cmp(&a, &c, false).unwrap());
    }

    #[test]
    fn replace_carries_errors_when_asked() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        let old = add(&mut ws, "main.tex", b"old");
        let new = add(&mut ws, "main.tex.new", b"new");
        ws.add_warning(&old, "odd encoding", true).unwrap();

        let key = ws.replace(&old, &new, true).unwrap();
        assert_eq!(key, FileKey::source("main.tex"));
        assert!(!ws.exists("main.tex.new", Partition::Source));
        let file = ws.file(&key).unwrap();
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].path.as_deref(), Some("main.tex"));
        assert_eq!(ws.read_file(&key).unwrap(), b"new");
    }

    #[test]
    fn delete_directory_drops_children() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        add(&mut ws, "figs/a.png", b"a");
        ws.delete(&FileKey::source("figs/")).unwrap();
        assert!(!ws.exists("figs/a.png", Partition::Source));
        assert!(!ws.exists("figs/", Partition::Source));
        assert!(!dir.path().join("42/src/figs").exists());
    }

    #[test]
    fn delete_all_files_keeps_removed_and_system() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        add(&mut ws, "a.tex", b"a");
        add(&mut ws, "anc/b.csv", b"b");
        let gone = add(&mut ws, "c.aux", b"c");
        ws.remove(&gone, None).unwrap();

        ws.delete_all_files().unwrap();
        assert!(ws.files().partition(Partition::Source).is_empty());
        assert!(ws.files().partition(Partition::Ancillary).is_empty());
        assert!(ws.exists("c.aux", Partition::Removed));
        assert!(ws.exists("source.log", Partition::System));
        assert!(dir.path().join("42/src/anc").is_dir());
    }

    #[test]
    fn delete_workspace_stashes_log_and_is_terminal() {
        let dir = tempdir().unwrap();
        let mut ws = workspace(dir.path());
        add(&mut ws, "a.tex", b"a");
        assert!(ws.delete_workspace().unwrap());
        assert!(ws.is_deleted());
        assert!(!dir.path().join("42").exists());
        let stashed: Vec<_> = std::fs::read_dir(dir.path().join("deleted_workspace_logs"))
            .unwrap()
            .collect();
        assert_eq!(stashed.len(), 1);
        assert!(ws.delete_workspace().is_err());
    }

    #[test]
    fn persist_all_moves_everything_out_of_quarantine() {
        let dir = tempdir().unwrap();
        let storage = QuarantineStorageAdapter::new(dir.path().join("perm"), dir.path().join("quar"));
        let mut ws = Workspace::new(5, "owner", Arc::new(storage));
        ws.initialize().unwrap();
        add(&mut ws, "figs/a.png", b"a");
        add(&mut ws, "main.tex", b"m");
        assert!(dir.path().join("quar/5/src/main.tex").exists());

        ws.persist_all().unwrap();
        assert!(ws.iter_files(FileFilter::default().directories(true)).iter().all(|f| f.is_persisted));
        assert!(dir.path().join("perm/5/src/figs/a.png").exists());
        assert!(dir.path().join("perm/5/src/main.tex").exists());
        assert!(!dir.path().join("quar/5/src/main.tex").exists());
        assert_eq!(ws.read_file(&FileKey::source("main.tex")).unwrap(), b"m");
    }
}
