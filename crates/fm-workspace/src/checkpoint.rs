// checkpoint.rs — Snapshots of the source tree and workspace metadata.
//
// A checkpoint is a pair of system files under `checkpoint/`:
//
//   checkpoint_<n>[_<user>].tar.gz   the source tree, ancillary included
//   checkpoint_<n>[_<user>].json     the workspace record at capture time
//
// Checkpoints are addressed by the checksum of the tarball. Deleting one
// deletes both files. Restoring unpacks into a staging directory first and
// only swaps it in once the tarball and the sidecar have both been read, so
// a failed restore leaves the live tree as it was.

use std::fs::File;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WorkspaceError;
use crate::file::{FileKey, FileRecord};
use crate::index::Partition;
use crate::ledger::Severity;
use crate::mutations::CreateOptions;
use crate::translate::WorkspaceRecord;
use crate::workspace::{FileFilter, Workspace};

/// Directory of checkpoint files within the system partition.
pub const CHECKPOINT_PREFIX: &str = "checkpoint";

const TARBALL_EXT: &str = ".tar.gz";
const SIDECAR_EXT: &str = ".json";

/// `_<user>` with anything outside `[A-Za-z0-9._@-]` replaced by `_`, so a
/// user name can never add a path component.
fn user_suffix(user: Option<&str>) -> String {
    user.map(|u| {
        let safe: String = u
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '@' | '-' => c,
                _ => '_',
            })
            .collect();
        format!("_{}", safe)
    })
    .unwrap_or_default()
}

/// ` ['user']` style suffix for log lines.
fn user_note(user: Option<&str>) -> String {
    user.map(|u| format!(" ['{}']", u)).unwrap_or_default()
}

fn checkpoint_path(n: usize, user: Option<&str>, ext: &str) -> String {
    format!("{}/checkpoint_{}{}{}", CHECKPOINT_PREFIX, n, user_suffix(user), ext)
}

/// Sequence number in `checkpoint/checkpoint_<n>[_user].tar.gz`.
fn checkpoint_number(path: &str) -> Option<usize> {
    let rest = path.strip_prefix(CHECKPOINT_PREFIX)?.strip_prefix("/checkpoint_")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Sidecar path for a tarball path.
pub fn sidecar_path(tarball_path: &str) -> String {
    let stem = tarball_path
        .strip_suffix(TARBALL_EXT)
        .unwrap_or(tarball_path);
    format!("{}{}", stem, SIDECAR_EXT)
}

fn is_checkpoint_tarball(file: &FileRecord) -> bool {
    file.is_system
        && !file.is_directory
        && file.path.starts_with(&format!("{}/", CHECKPOINT_PREFIX))
        && file.path.ends_with(TARBALL_EXT)
}

impl Workspace {
    /// Checkpoint tarballs, oldest first.
    pub fn list_checkpoints(&self) -> Vec<&FileRecord> {
        let mut checkpoints: Vec<&FileRecord> = self
            .files
            .partition(Partition::System)
            .values()
            .filter(|f| is_checkpoint_tarball(f))
            .collect();
        checkpoints.sort_by_key(|f| (checkpoint_number(&f.path), f.path.clone()));
        checkpoints
    }

    fn find_checkpoint(&self, checksum: &str) -> Result<FileKey, WorkspaceError> {
        for file in self.list_checkpoints() {
            let key = file.key();
            match self.checksum(&key) {
                Ok(sum) if sum == checksum => return Ok(key),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(upload_id = self.upload_id, file = %key, error = %err, "unreadable checkpoint");
                }
            }
        }
        Err(WorkspaceError::CheckpointNotFound {
            checksum: checksum.to_string(),
        })
    }

    pub fn checkpoint_file_exists(&self, checksum: &str) -> bool {
        self.find_checkpoint(checksum).is_ok()
    }

    pub fn get_checkpoint_file(&self, checksum: &str) -> Result<&FileRecord, WorkspaceError> {
        let key = self.find_checkpoint(checksum)?;
        self.file(&key)
    }

    pub fn get_checkpoint_file_size(&self, checksum: &str) -> Result<u64, WorkspaceError> {
        Ok(self.get_checkpoint_file(checksum)?.size_bytes)
    }

    pub fn get_checkpoint_file_last_modified(&self, checksum: &str) -> Result<DateTime<Utc>, WorkspaceError> {
        Ok(self.get_checkpoint_file(checksum)?.last_modified)
    }

    pub fn open_checkpoint_file(&self, checksum: &str) -> Result<File, WorkspaceError> {
        let key = self.find_checkpoint(checksum)?;
        self.open_read(&key)
    }

    /// Capture the source tree and the workspace record. Returns the
    /// checksum that identifies the checkpoint from now on.
    pub fn create_checkpoint(&mut self, user: Option<&str>) -> Result<String, WorkspaceError> {
        if self.iter_files(FileFilter::default()).is_empty() {
            return Err(WorkspaceError::NoSourceFilesToCheckpoint);
        }
        self.log_info(&format!("Creating checkpoint.{}", user_note(user)));

        let existing = self.list_checkpoints();
        if existing.len() >= self.max_checkpoints {
            self.log_error(&format!(
                "ERROR: Checkpoint limit of {} reached.{}",
                self.max_checkpoints,
                user_note(user)
            ));
            return Err(WorkspaceError::CheckpointLimitExceeded {
                max: self.max_checkpoints,
            });
        }
        let next = existing
            .iter()
            .filter_map(|f| checkpoint_number(&f.path))
            .max()
            .unwrap_or(0)
            + 1;

        let tarball = FileKey::system(checkpoint_path(next, user, TARBALL_EXT));
        let checksum = match self.write_checkpoint(&tarball) {
            Ok(checksum) => checksum,
            Err(err) => {
                self.discard_checkpoint(&tarball);
                self.log_error(&format!(
                    "ERROR: Checkpoint {} failed: {}{}",
                    tarball.path,
                    err,
                    user_note(user)
                ));
                return Err(err);
            }
        };
        self.log_info(&format!("Created checkpoint: {} ({}){}", tarball.path, checksum, user_note(user)));
        Ok(checksum)
    }

    fn write_checkpoint(&mut self, tarball: &FileKey) -> Result<String, WorkspaceError> {
        self.create(&tarball.path, CreateOptions::system())?;
        self.pack_source(tarball)?;
        let sidecar = self.create(&sidecar_path(&tarball.path), CreateOptions::system())?;
        let json = serde_json::to_vec_pretty(&self.to_record())?;
        self.write_file(&sidecar, &json)?;
        self.checksum(tarball)
    }

    /// Drop whatever a failed `write_checkpoint` left behind.
    fn discard_checkpoint(&mut self, tarball: &FileKey) {
        let sidecar = FileKey::system(sidecar_path(&tarball.path));
        for key in [&sidecar, tarball] {
            if !self.files.contains_key(key) {
                continue;
            }
            if let Err(err) = self.delete(key) {
                tracing::warn!(upload_id = self.upload_id, file = %key, error = %err, "could not discard partial checkpoint");
                // A partial checkpoint must never be listed.
                self.files.pop(&key.path, key.partition);
            }
        }
    }

    fn delete_checkpoint_files(&mut self, tarball: &FileKey) -> Result<(), WorkspaceError> {
        let sidecar = FileKey::system(sidecar_path(&tarball.path));
        if self.files.contains_key(&sidecar) {
            self.delete(&sidecar)?;
        }
        self.delete(tarball)
    }

    pub fn delete_checkpoint(&mut self, checksum: &str, user: Option<&str>) -> Result<(), WorkspaceError> {
        let key = match self.find_checkpoint(checksum) {
            Ok(key) => key,
            Err(err) => {
                self.log_info(&format!("ERROR: Checkpoint not found: {}{}", checksum, user_note(user)));
                return Err(err);
            }
        };
        self.delete_checkpoint_files(&key)?;
        self.log_info(&format!("Deleted checkpoint: {}{}", key.path, user_note(user)));
        Ok(())
    }

    pub fn delete_all_checkpoints(&mut self, user: Option<&str>) -> Result<(), WorkspaceError> {
        let keys: Vec<FileKey> = self.list_checkpoints().into_iter().map(|f| f.key()).collect();
        for key in &keys {
            self.delete_checkpoint_files(key)?;
        }
        self.log_info(&format!("Deleted ALL checkpoints ({}).{}", keys.len(), user_note(user)));
        Ok(())
    }

    /// Replace the source tree, the source and ancillary records and the
    /// workspace ledger with those captured by a checkpoint.
    pub fn restore_checkpoint(&mut self, checksum: &str, user: Option<&str>) -> Result<(), WorkspaceError> {
        let key = match self.find_checkpoint(checksum) {
            Ok(key) => key,
            Err(err) => {
                self.add_non_file_error("Unable to restore checkpoint. Not found.", Severity::Fatal, true);
                self.log_error(&format!("ERROR: Checkpoint not found: {}{}", checksum, user_note(user)));
                return Err(err);
            }
        };

        let staged = format!(".restore-{}", Uuid::new_v4());
        if let Err(err) = self.stage_checkpoint(&key, &staged) {
            self.discard_staged(&staged);
            self.add_non_file_error(
                format!("Unable to restore checkpoint '{}'.", key.path),
                Severity::Fatal,
                true,
            );
            self.log_error(&format!("ERROR: Restore of {} failed: {}", key.path, err));
            return Err(err);
        }
        let record = match self.read_sidecar(&key) {
            Ok(record) => record,
            Err(err) => {
                self.discard_staged(&staged);
                self.add_non_file_error(
                    format!("Unable to restore checkpoint '{}'. Metadata is missing or unreadable.", key.path),
                    Severity::Fatal,
                    true,
                );
                return Err(err);
            }
        };

        if let Err(err) = self.storage.replace_source_tree(&self.paths, &staged, true) {
            self.discard_staged(&staged);
            return Err(err);
        }
        self.storage.makedirs(&self.paths, Partition::Source)?;
        self.storage.makedirs(&self.paths, Partition::Ancillary)?;

        for partition in [Partition::Source, Partition::Ancillary] {
            let mut records = record.files.partition(partition).clone();
            for file in records.values_mut() {
                file.is_persisted = true;
            }
            self.files.replace_partition(partition, records);
        }
        self.ledger = record.errors;
        self.touch();
        self.log_info(&format!("Restored checkpoint: {}{}", key.path, user_note(user)));
        Ok(())
    }

    fn stage_checkpoint(&self, key: &FileKey, staged: &str) -> Result<(), WorkspaceError> {
        let tarball = self.file(key)?;
        let report = self.storage.unpack_tarfile(
            &self.paths,
            tarball,
            Partition::System,
            staged,
            true,
            &self.archive_limits,
        )?;
        if !report.skipped.is_empty() {
            tracing::warn!(
                upload_id = self.upload_id,
                skipped = report.skipped.len(),
                "checkpoint members skipped during restore"
            );
        }
        Ok(())
    }

    fn read_sidecar(&self, tarball: &FileKey) -> Result<WorkspaceRecord, WorkspaceError> {
        let sidecar = FileKey::system(sidecar_path(&tarball.path));
        let bytes = self.read_file(&sidecar)?;
        let record: WorkspaceRecord = serde_json::from_slice(&bytes)?;
        if record.upload_id != self.upload_id {
            return Err(WorkspaceError::StoreError(format!(
                "checkpoint metadata belongs to upload {}",
                record.upload_id
            )));
        }
        Ok(record)
    }

    fn discard_staged(&self, staged: &str) {
        let mut dir = FileRecord::directory(staged);
        dir.is_system = true;
        dir.is_persisted = true;
        if let Err(err) = self.storage.delete(&self.paths, &dir) {
            if !err.is_not_found() {
                tracing::warn!(upload_id = self.upload_id, error = %err, "could not clean up restore staging");
            }
        }
    }
}
