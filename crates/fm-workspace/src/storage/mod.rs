// storage/mod.rs — StorageAdapter trait: physical file operations.
//
// Adapters only decide *where* content lives (`root`) and what persisting
// means (`persist`). Every other operation is a provided method built on
// those two, and every one of them resolves paths through `get_path`,
// which refuses anything that would land outside its partition root.
//
// Adapters never touch the file index. The workspace updates records after
// an operation succeeds.

pub mod archive;
pub mod quarantine;
pub mod safety;
pub mod simple;

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::WorkspaceError;
use crate::file::FileRecord;
use crate::index::Partition;
use crate::paths::PathResolver;

pub use archive::{ArchiveLimits, SkipReason, SkippedMember, UnpackReport};
pub use quarantine::QuarantineStorageAdapter;
pub use simple::SimpleStorageAdapter;

/// Physical storage for upload workspaces.
///
/// Implementations must be `Send + Sync` so a workspace can move between
/// request-handling threads.
pub trait StorageAdapter: fmt::Debug + Send + Sync {
    /// Human-readable adapter name (for logs and `fm config`).
    fn name(&self) -> &str;

    /// Storage root for content with the given persistence state.
    fn root(&self, is_persisted: bool) -> &Path;

    /// Every distinct root this adapter writes to.
    fn roots(&self) -> Vec<&Path>;

    /// Where logs of deleted workspaces are kept.
    fn deleted_logs_path(&self) -> &Path;

    /// Make a file's content durable. The caller flips `is_persisted`
    /// on the record afterwards.
    fn persist(&self, paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError>;

    /// Absolute root of a partition.
    fn partition_root(&self, paths: &PathResolver, partition: Partition, is_persisted: bool) -> PathBuf {
        self.root(is_persisted).join(paths.partition_path(partition))
    }

    /// Whether `candidate` is contained in the root of `partition`.
    fn is_safe(
        &self,
        paths: &PathResolver,
        candidate: &Path,
        partition: Partition,
        is_persisted: bool,
    ) -> bool {
        let root = self.partition_root(paths, partition, is_persisted);
        safety::is_contained(candidate, &root)
    }

    /// Absolute path for a relative path in a partition.
    fn get_path(
        &self,
        paths: &PathResolver,
        path: &str,
        partition: Partition,
        is_persisted: bool,
    ) -> Result<PathBuf, WorkspaceError> {
        let full = self.root(is_persisted).join(paths.get_path(path, partition));
        if !self.is_safe(paths, &full, partition, is_persisted) {
            tracing::warn!(
                upload_id = paths.upload_id(),
                path = %path,
                %partition,
                "refusing path outside partition root"
            );
            return Err(WorkspaceError::security(
                path,
                format!("resolves outside the {} root", partition),
            ));
        }
        Ok(full)
    }

    fn file_path(&self, paths: &PathResolver, file: &FileRecord) -> Result<PathBuf, WorkspaceError> {
        self.get_path(paths, &file.path, file.partition(), file.is_persisted)
    }

    /// Create the partition root in every storage root.
    fn makedirs(&self, paths: &PathResolver, partition: Partition) -> Result<(), WorkspaceError> {
        for root in self.roots() {
            let dir = root.join(paths.partition_path(partition));
            fs::create_dir_all(&dir).map_err(|source| WorkspaceError::io(&dir, source))?;
        }
        Ok(())
    }

    /// Bring a file or directory into existence without truncating it.
    fn create(&self, paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError> {
        let full = self.file_path(paths, file)?;
        if file.is_directory {
            return fs::create_dir_all(&full).map_err(|source| WorkspaceError::io(&full, source));
        }
        ensure_parent(&full)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map(|_| ())
            .map_err(|source| WorkspaceError::io(&full, source))
    }

    fn open_read(&self, paths: &PathResolver, file: &FileRecord) -> Result<File, WorkspaceError> {
        let full = self.file_path(paths, file)?;
        File::open(&full).map_err(|source| WorkspaceError::io(&full, source))
    }

    /// Open for writing, truncating unless `append` is set.
    fn open_write(
        &self,
        paths: &PathResolver,
        file: &FileRecord,
        append: bool,
    ) -> Result<File, WorkspaceError> {
        let full = self.file_path(paths, file)?;
        ensure_parent(&full)?;
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options
            .open(&full)
            .map_err(|source| WorkspaceError::io(&full, source))
    }

    /// Move within the file's own partition, replacing anything at the
    /// destination.
    fn move_file(
        &self,
        paths: &PathResolver,
        file: &FileRecord,
        from_path: &str,
        to_path: &str,
    ) -> Result<(), WorkspaceError> {
        let partition = file.partition();
        let from = self.get_path(paths, from_path, partition, file.is_persisted)?;
        let to = self.get_path(paths, to_path, partition, file.is_persisted)?;
        move_path(&from, &to)
    }

    /// Move a file's content from its partition into the removed partition.
    fn remove(&self, paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError> {
        let from = self.file_path(paths, file)?;
        let to = self.get_path(paths, &file.path, Partition::Removed, file.is_persisted)?;
        move_path(&from, &to)
    }

    /// Copy content from one record's location to another's.
    fn copy(&self, paths: &PathResolver, from: &FileRecord, to: &FileRecord) -> Result<(), WorkspaceError> {
        let src = self.file_path(paths, from)?;
        let dst = self.file_path(paths, to)?;
        copy_path(&src, &dst)
    }

    fn delete(&self, paths: &PathResolver, file: &FileRecord) -> Result<(), WorkspaceError> {
        let full = self.file_path(paths, file)?;
        let result = if file.is_directory {
            fs::remove_dir_all(&full)
        } else {
            fs::remove_file(&full)
        };
        result.map_err(|source| WorkspaceError::io(&full, source))
    }

    /// Wipe the source tree (ancillary included) in every root.
    fn delete_all(&self, paths: &PathResolver) -> Result<(), WorkspaceError> {
        for root in self.roots() {
            let src = root.join(paths.source_path());
            remove_tree_if_exists(&src)?;
        }
        Ok(())
    }

    /// Remove the whole workspace directory in every root.
    fn delete_workspace(&self, paths: &PathResolver) -> Result<(), WorkspaceError> {
        for root in self.roots() {
            let base = root.join(paths.base_path());
            remove_tree_if_exists(&base)?;
        }
        Ok(())
    }

    /// Copy a workspace log somewhere that outlives the workspace.
    fn stash_deleted_log(&self, paths: &PathResolver, log: &FileRecord) -> Result<PathBuf, WorkspaceError> {
        let src = self.file_path(paths, log)?;
        let dir = self.deleted_logs_path();
        fs::create_dir_all(dir).map_err(|source| WorkspaceError::io(dir, source))?;
        let name = format!(
            "{}_{}_{}",
            paths.base_path(),
            Utc::now().format("%Y%m%d%H%M%S"),
            log.name()
        );
        let dst = dir.join(name);
        fs::copy(&src, &dst).map_err(|source| WorkspaceError::io(&dst, source))?;
        Ok(dst)
    }

    /// Size in bytes; zero for directories.
    fn size_bytes(&self, paths: &PathResolver, file: &FileRecord) -> Result<u64, WorkspaceError> {
        let full = self.file_path(paths, file)?;
        let meta = fs::metadata(&full).map_err(|source| WorkspaceError::io(&full, source))?;
        Ok(if meta.is_dir() { 0 } else { meta.len() })
    }

    fn last_modified(
        &self,
        paths: &PathResolver,
        file: &FileRecord,
    ) -> Result<DateTime<Utc>, WorkspaceError> {
        let full = self.file_path(paths, file)?;
        let modified = fs::metadata(&full)
            .and_then(|m| m.modified())
            .map_err(|source| WorkspaceError::io(&full, source))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Set the physical modification time. Directories are left alone.
    fn set_last_modified(
        &self,
        paths: &PathResolver,
        file: &FileRecord,
        when: DateTime<Utc>,
    ) -> Result<(), WorkspaceError> {
        if file.is_directory {
            return Ok(());
        }
        let full = self.file_path(paths, file)?;
        let handle = OpenOptions::new()
            .write(true)
            .open(&full)
            .map_err(|source| WorkspaceError::io(&full, source))?;
        handle
            .set_modified(when.into())
            .map_err(|source| WorkspaceError::io(&full, source))
    }

    /// Compare two files. With `shallow`, equal size and mtime count as
    /// equal without reading content.
    fn cmp(
        &self,
        paths: &PathResolver,
        a: &FileRecord,
        b: &FileRecord,
        shallow: bool,
    ) -> Result<bool, WorkspaceError> {
        let pa = self.file_path(paths, a)?;
        let pb = self.file_path(paths, b)?;
        let ma = fs::metadata(&pa).map_err(|source| WorkspaceError::io(&pa, source))?;
        let mb = fs::metadata(&pb).map_err(|source| WorkspaceError::io(&pb, source))?;
        if ma.len() != mb.len() {
            return Ok(false);
        }
        if shallow {
            if let (Ok(ta), Ok(tb)) = (ma.modified(), mb.modified()) {
                if ta == tb {
                    return Ok(true);
                }
            }
        }
        let ca = read_all(&pa)?;
        let cb = read_all(&pb)?;
        Ok(ca == cb)
    }

    fn is_tarfile(&self, paths: &PathResolver, file: &FileRecord) -> bool {
        match self.file_path(paths, file) {
            Ok(full) => archive::is_tarfile(&full),
            Err(_) => false,
        }
    }

    /// Pack a partition (in every root) into the tarball at `target`.
    fn pack_tarfile(
        &self,
        paths: &PathResolver,
        target: &FileRecord,
        partition: Partition,
    ) -> Result<usize, WorkspaceError> {
        let target_path = self.file_path(paths, target)?;
        let roots: Vec<PathBuf> = self
            .roots()
            .into_iter()
            .map(|root| root.join(paths.partition_path(partition)))
            .collect();
        archive::pack_dirs(&roots, &target_path)
    }

    /// Unpack a tarball into `dir` (relative to `partition`'s root).
    fn unpack_tarfile(
        &self,
        paths: &PathResolver,
        archive_file: &FileRecord,
        partition: Partition,
        dir: &str,
        is_persisted: bool,
        limits: &ArchiveLimits,
    ) -> Result<UnpackReport, WorkspaceError> {
        let archive_path = self.file_path(paths, archive_file)?;
        let dest = self.get_path(paths, dir, partition, is_persisted)?;
        archive::unpack(&archive_path, &dest, limits)
    }

    /// Swap a staged tree (a system-partition directory) in as the source
    /// tree. The old source tree is moved aside first and put back if the
    /// swap fails, then removed from every root.
    fn replace_source_tree(
        &self,
        paths: &PathResolver,
        staged_dir: &str,
        is_persisted: bool,
    ) -> Result<(), WorkspaceError> {
        let staged = self.get_path(paths, staged_dir, Partition::System, is_persisted)?;
        let live = self.partition_root(paths, Partition::Source, is_persisted);
        let aside = staged.with_extension("old");

        if live.exists() {
            fs::rename(&live, &aside).map_err(|source| WorkspaceError::io(&live, source))?;
        }
        if let Err(source) = fs::rename(&staged, &live) {
            if aside.exists() {
                if let Err(rollback) = fs::rename(&aside, &live) {
                    tracing::error!(
                        live = %live.display(),
                        aside = %aside.display(),
                        error = %rollback,
                        "could not move the previous source tree back"
                    );
                    return Err(WorkspaceError::io(
                        &aside,
                        io::Error::new(
                            rollback.kind(),
                            format!(
                                "swap failed ({}) and the previous tree is left at {}: {}",
                                source,
                                aside.display(),
                                rollback
                            ),
                        ),
                    ));
                }
            }
            return Err(WorkspaceError::io(&staged, source));
        }
        remove_tree_if_exists(&aside)?;
        for root in self.roots() {
            if root != self.root(is_persisted) {
                remove_tree_if_exists(&root.join(paths.source_path()))?;
            }
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), WorkspaceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
    }
    Ok(())
}

fn remove_tree_if_exists(path: &Path) -> Result<(), WorkspaceError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(WorkspaceError::io(path, source)),
    }
}

fn read_all(path: &Path) -> Result<Vec<u8>, WorkspaceError> {
    let mut buf = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|source| WorkspaceError::io(path, source))?;
    Ok(buf)
}

/// Rename, replacing an existing destination. Falls back to copy + delete
/// when the rename crosses filesystems.
pub(crate) fn move_path(from: &Path, to: &Path) -> Result<(), WorkspaceError> {
    ensure_parent(to)?;
    if to.is_dir() && from != to {
        remove_tree_if_exists(to)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_path(from, to)?;
    if from.is_dir() {
        fs::remove_dir_all(from).map_err(|source| WorkspaceError::io(from, source))
    } else {
        fs::remove_file(from).map_err(|source| WorkspaceError::io(from, source))
    }
}

/// Copy a file, or a directory tree recursively.
pub(crate) fn copy_path(from: &Path, to: &Path) -> Result<(), WorkspaceError> {
    let meta = fs::metadata(from).map_err(|source| WorkspaceError::io(from, source))?;
    if !meta.is_dir() {
        ensure_parent(to)?;
        fs::copy(from, to).map_err(|source| WorkspaceError::io(to, source))?;
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| WorkspaceError::ArchiveError {
            path: from.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rel = match entry.path().strip_prefix(from) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let dst = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst).map_err(|source| WorkspaceError::io(&dst, source))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dst).map_err(|source| WorkspaceError::io(&dst, source))?;
        }
    }
    Ok(())
}

/// Merge `from` into `to`, moving files across and leaving anything that
/// already exists at the destination directory level in place.
pub(crate) fn merge_tree(from: &Path, to: &Path) -> Result<(), WorkspaceError> {
    if !from.is_dir() {
        return move_path(from, to);
    }
    fs::create_dir_all(to).map_err(|source| WorkspaceError::io(to, source))?;
    let entries = fs::read_dir(from).map_err(|source| WorkspaceError::io(from, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::io(from, source))?;
        let dst = to.join(entry.file_name());
        merge_tree(&entry.path(), &dst)?;
    }
    fs::remove_dir(from).map_err(|source| WorkspaceError::io(from, source))
}
