// system_files.rs — The source log and the source package.
//
// Both are system files: indexed in the system partition, stored under the
// workspace base directory, persisted from the moment they are created.
//
// The source log is an append-only, human-readable activity record. Writing
// to it never fails an operation; a failed append is reported through
// tracing and otherwise ignored. Appends do not touch the workspace's
// modification time, so logging never makes the source package stale.

use std::io::{Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::WorkspaceError;
use crate::file::{FileKey, FileRecord};
use crate::index::Partition;
use crate::mutations::CreateOptions;
use crate::workspace::Workspace;

/// Path of the activity log within the system partition.
pub const SOURCE_LOG_PATH: &str = "source.log";

/// Timestamp layout of source log lines.
pub const LOG_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One source log line, newline included.
pub fn format_log_line(when: DateTime<Utc>, message: &str) -> String {
    format!("{} {}\n", when.format(LOG_TIME_FORMAT), message)
}

impl Workspace {
    pub fn source_log_key(&self) -> FileKey {
        FileKey::system(SOURCE_LOG_PATH)
    }

    /// Register the source log if needed and make sure it exists on disk.
    pub(crate) fn ensure_source_log(&mut self) -> Result<(), WorkspaceError> {
        let key = self.source_log_key();
        match self.files.get_key(&key) {
            Ok(record) => self.storage.create(&self.paths, record),
            Err(_) => self.create(SOURCE_LOG_PATH, CreateOptions::system()).map(|_| ()),
        }
    }

    fn append_log(&self, message: &str) {
        let record = match self.files.get_key(&self.source_log_key()) {
            Ok(record) => record,
            Err(_) => {
                tracing::warn!(upload_id = self.upload_id, "no source log to write to");
                return;
            }
        };
        let line = format_log_line(Utc::now(), message);
        let written = self
            .storage
            .open_write(&self.paths, record, true)
            .and_then(|mut handle| {
                handle
                    .write_all(line.as_bytes())
                    .map_err(|source| WorkspaceError::io(SOURCE_LOG_PATH, source))
            });
        if let Err(err) = written {
            tracing::warn!(upload_id = self.upload_id, error = %err, "source log append failed");
        }
    }

    pub fn log_info(&self, message: &str) {
        tracing::info!(upload_id = self.upload_id, "{}", message);
        self.append_log(message);
    }

    pub fn log_error(&self, message: &str) {
        tracing::error!(upload_id = self.upload_id, "{}", message);
        self.append_log(message);
    }

    /// Debug messages go to tracing only; the source log records INFO and up.
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(upload_id = self.upload_id, "{}", message);
    }

    pub fn read_source_log(&self) -> Result<String, WorkspaceError> {
        let record = self.files.get_key(&self.source_log_key())?;
        let full = self.storage.file_path(&self.paths, record)?;
        let mut content = String::new();
        self.storage
            .open_read(&self.paths, record)?
            .read_to_string(&mut content)
            .map_err(|source| WorkspaceError::io(full, source))?;
        Ok(content)
    }

    /// Copy the source log to the deleted-logs area.
    pub(crate) fn stash_log(&self) -> Result<PathBuf, WorkspaceError> {
        let record = self.files.get_key(&self.source_log_key())?;
        self.storage.stash_deleted_log(&self.paths, record)
    }

    // ── source package ──────────────────────────────────────────────

    /// `<upload_id>.tar.gz`, in the system partition.
    pub fn source_package_path(&self) -> String {
        format!("{}.tar.gz", self.upload_id)
    }

    pub fn source_package_key(&self) -> FileKey {
        FileKey::system(self.source_package_path())
    }

    pub fn source_package(&self) -> Option<&FileRecord> {
        self.files.get_key(&self.source_package_key()).ok()
    }

    /// Pack the source tree (ancillary included) into `target`, a system file.
    pub(crate) fn pack_source(&mut self, target: &FileKey) -> Result<usize, WorkspaceError> {
        let count = {
            let record = self.files.get_key(target)?;
            let count = self
                .storage
                .pack_tarfile(&self.paths, record, Partition::Source)?;
            // Filesystem timestamps are coarser than the clock behind
            // `modified_datetime`; stamp the archive with the clock.
            self.storage
                .set_last_modified(&self.paths, record, Utc::now())?;
            count
        };
        self.refresh(target)?;
        Ok(count)
    }

    /// Rebuild the source package from the current source tree.
    pub fn pack_source_package(&mut self) -> Result<FileKey, WorkspaceError> {
        let key = self.source_package_key();
        if !self.files.contains_key(&key) {
            self.create(&key.path, CreateOptions::system())?;
        }
        let count = self.pack_source(&key)?;
        self.log_info(&format!("Packed source package '{}' ({} entries).", key.path, count));
        Ok(key)
    }

    /// True when the package is missing or older than the newest change to
    /// the workspace.
    pub fn source_package_is_stale(&self) -> bool {
        let Some(workspace_modified) = self.last_modified() else {
            return true;
        };
        match self.source_package() {
            Some(package) => package.last_modified < workspace_modified,
            None => true,
        }
    }

    /// Repack only if stale.
    pub fn ensure_source_package(&mut self) -> Result<FileKey, WorkspaceError> {
        if self.source_package_is_stale() {
            return self.pack_source_package();
        }
        Ok(self.source_package_key())
    }

    pub fn source_package_checksum(&self) -> Result<String, WorkspaceError> {
        self.checksum(&self.source_package_key())
    }
}
