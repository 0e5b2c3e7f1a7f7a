// workspace.rs — The Workspace aggregate: identity, file index, ledger,
// storage, and checking, composed in one struct.
//
// Behaviour is split across modules by concern, each adding an
// `impl Workspace` block:
//
//   workspace.rs     construction, queries, counts, lifecycle, checking, I/O
//   mutations.rs     create / copy / rename / replace / remove / delete / persist
//   checkpoint.rs    checkpoint create / list / restore / delete
//   system_files.rs  source log and source package
//   translate.rs     conversion to and from the stored record
//
// Every storage call goes through `self.storage` with `self.paths`, so an
// adapter never needs a handle on the workspace itself.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checking::{Checker, CheckingStrategy, SynchronousCheckingStrategy};
use crate::config::WorkspaceConfig;
use crate::error::WorkspaceError;
use crate::file::{FileKey, FileRecord};
use crate::file_type::FileType;
use crate::index::{FileIndex, Partition};
use crate::ledger::{warnings_for, ErrorLedger, LedgerEntry, Readiness, Severity};
use crate::lifecycle::{LockState, SourceType, Status};
use crate::paths::{sanitize_public_path, PathResolver, ANCILLARY_PREFIX};
use crate::storage::{ArchiveLimits, StorageAdapter};

/// Default cap on checkpoints per workspace.
pub const MAX_CHECKPOINTS: usize = 10;

/// Which records `iter_files` yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFilter {
    pub allow_ancillary: bool,
    pub allow_removed: bool,
    pub allow_directories: bool,
    pub allow_system: bool,
}

impl Default for FileFilter {
    /// Source and ancillary files; no directories, removed or system files.
    fn default() -> Self {
        Self {
            allow_ancillary: true,
            allow_removed: false,
            allow_directories: false,
            allow_system: false,
        }
    }
}

impl FileFilter {
    pub fn ancillary(mut self, allow: bool) -> Self {
        self.allow_ancillary = allow;
        self
    }

    pub fn removed(mut self, allow: bool) -> Self {
        self.allow_removed = allow;
        self
    }

    pub fn directories(mut self, allow: bool) -> Self {
        self.allow_directories = allow;
        self
    }

    pub fn system(mut self, allow: bool) -> Self {
        self.allow_system = allow;
        self
    }

    pub fn matches(&self, file: &FileRecord) -> bool {
        (self.allow_directories || !file.is_directory)
            && (self.allow_removed || !file.is_removed)
            && (self.allow_ancillary || !file.is_ancillary)
            && (self.allow_system || !file.is_system)
    }
}

/// Per-type tallies of active files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTypeCounts {
    pub all_files: usize,
    pub ancillary: usize,
    pub ignore: usize,
    pub files: usize,
    pub by_type: BTreeMap<FileType, usize>,
}

impl FileTypeCounts {
    pub fn get(&self, file_type: FileType) -> usize {
        self.by_type.get(&file_type).copied().unwrap_or(0)
    }
}

/// One line of the last-upload file summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub size_bytes: u64,
    pub file_type: FileType,
}

/// Bookkeeping about the most recent upload-and-check run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUpload {
    #[serde(default)]
    pub start_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Vec<LedgerEntry>,
    #[serde(default)]
    pub file_summary: Vec<FileSummary>,
    #[serde(default)]
    pub readiness: Readiness,
}

/// An upload workspace.
pub struct Workspace {
    pub(crate) upload_id: u64,
    pub(crate) owner_user_id: String,
    pub(crate) created_datetime: DateTime<Utc>,
    pub(crate) modified_datetime: DateTime<Utc>,
    pub(crate) status: Status,
    pub(crate) lock_state: LockState,
    pub(crate) source_type: SourceType,
    pub(crate) last_upload: LastUpload,
    pub(crate) files: FileIndex,
    pub(crate) ledger: ErrorLedger,
    pub(crate) paths: PathResolver,
    pub(crate) storage: Arc<dyn StorageAdapter>,
    pub(crate) checkers: Vec<Arc<dyn Checker>>,
    pub(crate) strategy: Arc<dyn CheckingStrategy>,
    pub(crate) max_checkpoints: usize,
    pub(crate) archive_limits: ArchiveLimits,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("upload_id", &self.upload_id)
            .field("owner_user_id", &self.owner_user_id)
            .field("status", &self.status)
            .field("lock_state", &self.lock_state)
            .field("source_type", &self.source_type)
            .field("files", &self.files.len())
            .field("storage", &self.storage.name())
            .field("checkers", &self.checkers.len())
            .finish()
    }
}

impl Workspace {
    /// A new, empty workspace. Call `initialize` before adding files.
    pub fn new(
        upload_id: u64,
        owner_user_id: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        let now = Utc::now();
        Self {
            upload_id,
            owner_user_id: owner_user_id.into(),
            created_datetime: now,
            modified_datetime: now,
            status: Status::Active,
            lock_state: LockState::Unlocked,
            source_type: SourceType::Unknown,
            last_upload: LastUpload::default(),
            files: FileIndex::new(),
            ledger: ErrorLedger::new(),
            paths: PathResolver::new(upload_id),
            storage,
            checkers: Vec::new(),
            strategy: Arc::new(SynchronousCheckingStrategy::new()),
            max_checkpoints: MAX_CHECKPOINTS,
            archive_limits: ArchiveLimits::default(),
        }
    }

    pub fn with_checkers(mut self, checkers: Vec<Arc<dyn Checker>>) -> Self {
        self.checkers = checkers;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn CheckingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    pub fn with_archive_limits(mut self, limits: ArchiveLimits) -> Self {
        self.archive_limits = limits;
        self
    }

    /// Apply the checkpoint cap, archive limits, and pass limit from config.
    pub fn with_config(self, config: &WorkspaceConfig) -> Self {
        let strategy = SynchronousCheckingStrategy {
            max_passes: config.checking.max_passes,
        };
        self.with_max_checkpoints(config.checkpoints.max_checkpoints)
            .with_archive_limits(config.archive)
            .with_strategy(Arc::new(strategy))
    }

    /// Create the partition directories and the source log.
    pub fn initialize(&mut self) -> Result<(), WorkspaceError> {
        for partition in [Partition::Source, Partition::Ancillary, Partition::Removed] {
            self.storage.makedirs(&self.paths, partition)?;
        }
        self.ensure_source_log()?;
        tracing::info!(upload_id = self.upload_id, storage = self.storage.name(), "workspace initialized");
        Ok(())
    }

    // ── identity and state ──────────────────────────────────────────

    pub fn upload_id(&self) -> u64 {
        self.upload_id
    }

    pub fn owner_user_id(&self) -> &str {
        &self.owner_user_id
    }

    pub fn created_datetime(&self) -> DateTime<Utc> {
        self.created_datetime
    }

    pub fn modified_datetime(&self) -> DateTime<Utc> {
        self.modified_datetime
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state == LockState::Locked
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn is_released(&self) -> bool {
        self.status == Status::Released
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn last_upload(&self) -> &LastUpload {
        &self.last_upload
    }

    pub fn files(&self) -> &FileIndex {
        &self.files
    }

    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn storage(&self) -> &dyn StorageAdapter {
        self.storage.as_ref()
    }

    pub fn checkers(&self) -> &[Arc<dyn Checker>] {
        &self.checkers
    }

    pub fn max_checkpoints(&self) -> usize {
        self.max_checkpoints
    }

    pub fn archive_limits(&self) -> &ArchiveLimits {
        &self.archive_limits
    }

    pub(crate) fn touch(&mut self) {
        self.modified_datetime = Utc::now();
    }

    // ── lifecycle ───────────────────────────────────────────────────

    fn transition(&mut self, next: Status) -> Result<(), WorkspaceError> {
        if !self.status.can_transition_to(&next) {
            return Err(WorkspaceError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::info!(upload_id = self.upload_id, from = %self.status, to = %next, "status change");
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn release(&mut self) -> Result<(), WorkspaceError> {
        self.transition(Status::Released)
    }

    pub fn unrelease(&mut self) -> Result<(), WorkspaceError> {
        self.transition(Status::Active)
    }

    pub(crate) fn mark_deleted(&mut self) -> Result<(), WorkspaceError> {
        self.transition(Status::Deleted)
    }

    pub fn lock(&mut self) {
        if self.lock_state != LockState::Locked {
            tracing::info!(upload_id = self.upload_id, "workspace locked");
            self.lock_state = LockState::Locked;
            self.touch();
        }
    }

    pub fn unlock(&mut self) {
        if self.lock_state != LockState::Unlocked {
            tracing::info!(upload_id = self.upload_id, "workspace unlocked");
            self.lock_state = LockState::Unlocked;
            self.touch();
        }
    }

    /// Decide the source type. Once it is known, changing it needs `force`.
    pub fn set_source_type(&mut self, source_type: SourceType, force: bool) -> Result<(), WorkspaceError> {
        if !force && !self.source_type.is_unknown() && self.source_type != source_type {
            return Err(WorkspaceError::SourceTypeAlreadySet {
                current: self.source_type.to_string(),
            });
        }
        self.source_type = source_type;
        self.touch();
        Ok(())
    }

    // ── lookup ──────────────────────────────────────────────────────

    pub fn exists(&self, path: &str, partition: Partition) -> bool {
        self.files.contains(path, partition)
    }

    pub fn get(&self, path: &str, partition: Partition) -> Result<&FileRecord, WorkspaceError> {
        self.files.get(path, partition)
    }

    pub fn file(&self, key: &FileKey) -> Result<&FileRecord, WorkspaceError> {
        self.files.get_key(key)
    }

    /// Key for a client-supplied path (`anc/` selects the ancillary
    /// partition). Manipulated paths are refused.
    pub fn resolve_public_path(&self, public_path: &str) -> Result<FileKey, WorkspaceError> {
        let (path, ancillary) = sanitize_public_path(public_path)?;
        let partition = if ancillary {
            Partition::Ancillary
        } else {
            Partition::Source
        };
        Ok(FileKey::new(path, partition))
    }

    /// The path clients see: ancillary files get their `anc/` prefix back.
    pub fn get_public_path(&self, file: &FileRecord) -> Result<String, WorkspaceError> {
        if file.is_removed || file.is_system {
            return Err(WorkspaceError::NotPublic {
                path: file.path.clone(),
            });
        }
        if file.is_ancillary {
            Ok(format!("{}/{}", ANCILLARY_PREFIX, file.path))
        } else {
            Ok(file.path.clone())
        }
    }

    pub fn get_full_path(&self, key: &FileKey) -> Result<std::path::PathBuf, WorkspaceError> {
        let file = self.file(key)?;
        self.storage.file_path(&self.paths, file)
    }

    /// Whether a relative path is contained in its partition root.
    pub fn is_safe(&self, path: &str, partition: Partition, is_persisted: bool) -> bool {
        let candidate = self
            .storage
            .root(is_persisted)
            .join(self.paths.get_path(path, partition));
        self.storage
            .is_safe(&self.paths, &candidate, partition, is_persisted)
    }

    pub fn iter_files(&self, filter: FileFilter) -> Vec<&FileRecord> {
        self.files.iter().filter(|f| filter.matches(f)).collect()
    }

    fn directory_prefix(&self, dir: &FileKey) -> Result<String, WorkspaceError> {
        if let Ok(file) = self.files.get_key(dir) {
            if !file.is_directory {
                return Err(WorkspaceError::NotADirectory {
                    path: dir.path.clone(),
                });
            }
        }
        if dir.path.is_empty() || dir.path.ends_with('/') {
            Ok(dir.path.clone())
        } else {
            Ok(format!("{}/", dir.path))
        }
    }

    /// Records under `dir` in the same partition, optionally limited to
    /// `max_depth` levels. An empty path lists the whole partition.
    pub fn iter_children(
        &self,
        dir: &FileKey,
        max_depth: Option<usize>,
    ) -> Result<Vec<&FileRecord>, WorkspaceError> {
        let prefix = self.directory_prefix(dir)?;
        Ok(self
            .files
            .items(dir.partition)
            .filter(|(path, _)| path.starts_with(&prefix) && path.as_str() != prefix)
            .filter(|(path, _)| match max_depth {
                None => true,
                Some(max) => {
                    let remainder = path[prefix.len()..].trim_matches('/');
                    remainder.split('/').count() <= max
                }
            })
            .map(|(_, file)| file)
            .collect())
    }

    pub(crate) fn child_keys(&self, dir: &FileKey) -> Result<Vec<FileKey>, WorkspaceError> {
        Ok(self
            .iter_children(dir, None)?
            .into_iter()
            .map(|f| f.key())
            .collect())
    }

    // ── aggregates ──────────────────────────────────────────────────

    /// Total size of source and ancillary content.
    pub fn size_bytes(&self) -> u64 {
        self.iter_files(FileFilter::default())
            .iter()
            .map(|f| f.size_bytes)
            .sum()
    }

    /// Latest change to any source or ancillary file, or to the workspace
    /// itself. `None` when there are no files.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let newest = self
            .iter_files(FileFilter::default())
            .iter()
            .map(|f| f.last_modified)
            .max()?;
        Some(newest.max(self.modified_datetime))
    }

    /// Non-ancillary, non-removed files.
    pub fn file_count(&self) -> usize {
        self.iter_files(FileFilter::default().ancillary(false)).len()
    }

    pub fn ancillary_file_count(&self) -> usize {
        self.iter_files(FileFilter::default())
            .iter()
            .filter(|f| f.is_ancillary)
            .count()
    }

    pub fn get_file_type_counts(&self) -> FileTypeCounts {
        let mut counts = FileTypeCounts::default();
        for file in self.iter_files(FileFilter::default()) {
            counts.all_files += 1;
            if file.is_ancillary {
                counts.ancillary += 1;
            } else if file.is_always_ignore() {
                counts.ignore += 1;
            } else {
                *counts.by_type.entry(file.file_type).or_insert(0) += 1;
            }
        }
        counts.files = counts.all_files - counts.ancillary;
        counts
    }

    /// Exactly one non-ancillary file, and it is not an always-ignore file.
    pub fn is_single_file_submission(&self) -> bool {
        self.file_count() == 1 && self.get_file_type_counts().ignore != 1
    }

    pub fn get_single_file(&self) -> Option<&FileRecord> {
        if !self.is_single_file_submission() {
            return None;
        }
        self.iter_files(FileFilter::default().ancillary(false))
            .into_iter()
            .next()
    }

    // ── errors and readiness ────────────────────────────────────────

    /// Attach an entry to a file.
    pub fn add_error(
        &mut self,
        key: &FileKey,
        message: impl Into<String>,
        severity: Severity,
        persistent: bool,
    ) -> Result<(), WorkspaceError> {
        let message = message.into();
        tracing::debug!(upload_id = self.upload_id, file = %key, %severity, %message, "ledger entry");
        self.files
            .get_mut(&key.path, key.partition)?
            .add_entry(severity, message, persistent);
        Ok(())
    }

    pub fn add_warning(
        &mut self,
        key: &FileKey,
        message: impl Into<String>,
        persistent: bool,
    ) -> Result<(), WorkspaceError> {
        self.add_error(key, message, Severity::Warning, persistent)
    }

    /// Record an entry that concerns the workspace, not one file.
    pub fn add_non_file_error(&mut self, message: impl Into<String>, severity: Severity, persistent: bool) {
        let message = message.into();
        tracing::debug!(upload_id = self.upload_id, %severity, %message, "workspace ledger entry");
        self.ledger
            .push(LedgerEntry::new(severity, message).persistent(persistent));
    }

    pub fn add_non_file_warning(&mut self, message: impl Into<String>, persistent: bool) {
        self.add_non_file_error(message, Severity::Warning, persistent);
    }

    /// Every entry, on files of any partition and on the workspace.
    pub fn errors(&self) -> Vec<&LedgerEntry> {
        self.ledger.all(&self.files)
    }

    pub fn fatal_errors(&self) -> Vec<&LedgerEntry> {
        self.ledger.fatal_errors(&self.files)
    }

    pub fn warnings(&self) -> Vec<&LedgerEntry> {
        self.ledger.warnings(&self.files)
    }

    pub fn active_warnings(&self) -> Vec<&LedgerEntry> {
        self.ledger.active_warnings(&self.files)
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.ledger.has_fatal_errors(&self.files)
    }

    pub fn has_active_warnings(&self) -> bool {
        self.ledger.has_active_warnings(&self.files)
    }

    pub fn readiness(&self) -> Readiness {
        self.ledger.readiness(&self.files)
    }

    /// Warnings on the file at a public path.
    pub fn get_warnings_for_path(&self, public_path: &str) -> Result<Vec<&LedgerEntry>, WorkspaceError> {
        let key = self.resolve_public_path(public_path)?;
        Ok(warnings_for(self.file(&key)?))
    }

    // ── checking ────────────────────────────────────────────────────

    pub fn add_checker(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn set_strategy(&mut self, strategy: Arc<dyn CheckingStrategy>) {
        self.strategy = strategy;
    }

    /// Active files and directories not yet through the checkers.
    pub fn unchecked_files(&self) -> Vec<&FileRecord> {
        self.iter_files(FileFilter::default().directories(true))
            .into_iter()
            .filter(|f| !f.is_checked)
            .collect()
    }

    pub fn has_unchecked_files(&self) -> bool {
        !self.unchecked_files().is_empty()
    }

    pub fn set_checked(&mut self, key: &FileKey, checked: bool) -> Result<(), WorkspaceError> {
        self.files.get_mut(&key.path, key.partition)?.is_checked = checked;
        Ok(())
    }

    pub fn set_file_type(&mut self, key: &FileKey, file_type: FileType) -> Result<(), WorkspaceError> {
        self.files.get_mut(&key.path, key.partition)?.file_type = file_type;
        Ok(())
    }

    /// Run the configured strategy over the configured checkers, then
    /// record the last-upload summary.
    pub fn perform_checks(&mut self) -> Result<(), WorkspaceError> {
        let checkers = self.checkers.clone();
        let strategy = Arc::clone(&self.strategy);
        let started = Utc::now();
        tracing::info!(upload_id = self.upload_id, checkers = checkers.len(), "performing checks");

        strategy.check(self, &checkers)?;

        let readiness = self.readiness();
        let mut summary = Vec::new();
        for file in self.iter_files(FileFilter::default()) {
            summary.push(FileSummary {
                path: self.get_public_path(file)?,
                size_bytes: file.size_bytes,
                file_type: file.file_type,
            });
        }
        let logs = self.ledger.all(&self.files).into_iter().cloned().collect();
        self.last_upload = LastUpload {
            start_datetime: Some(started),
            completion_datetime: Some(Utc::now()),
            logs,
            file_summary: summary,
            readiness,
        };
        tracing::info!(upload_id = self.upload_id, %readiness, "checks complete");
        Ok(())
    }

    // ── content access ──────────────────────────────────────────────

    /// Re-read size and mtime from storage into the record.
    pub fn refresh(&mut self, key: &FileKey) -> Result<(), WorkspaceError> {
        let (size, modified) = {
            let file = self.files.get_key(key)?;
            (
                self.storage.size_bytes(&self.paths, file)?,
                self.storage.last_modified(&self.paths, file)?,
            )
        };
        let file = self.files.get_mut(&key.path, key.partition)?;
        file.size_bytes = size;
        file.last_modified = modified;
        Ok(())
    }

    /// Write through a scoped handle; the record's size and mtime are
    /// refreshed once the handle is closed.
    pub fn with_writer<T>(
        &mut self,
        key: &FileKey,
        append: bool,
        write: impl FnOnce(&mut std::fs::File) -> std::io::Result<T>,
    ) -> Result<T, WorkspaceError> {
        let result = {
            let file = self.files.get_key(key)?;
            let full = self.storage.file_path(&self.paths, file)?;
            let mut handle = self.storage.open_write(&self.paths, file, append)?;
            write(&mut handle).map_err(|source| WorkspaceError::io(full, source))?
        };
        self.refresh(key)?;
        self.touch();
        Ok(result)
    }

    pub fn write_file(&mut self, key: &FileKey, content: &[u8]) -> Result<(), WorkspaceError> {
        self.with_writer(key, false, |handle| handle.write_all(content))
    }

    pub fn open_read(&self, key: &FileKey) -> Result<std::fs::File, WorkspaceError> {
        let file = self.files.get_key(key)?;
        self.storage.open_read(&self.paths, file)
    }

    pub fn read_file(&self, key: &FileKey) -> Result<Vec<u8>, WorkspaceError> {
        let full = self.get_full_path(key)?;
        let mut handle = self.open_read(key)?;
        let mut buf = Vec::new();
        handle
            .read_to_end(&mut buf)
            .map_err(|source| WorkspaceError::io(full, source))?;
        Ok(buf)
    }

    /// URL-safe base64 MD5 of a file's content.
    pub fn checksum(&self, key: &FileKey) -> Result<String, WorkspaceError> {
        let full = self.get_full_path(key)?;
        let mut handle = self.open_read(key)?;
        let mut context = md5::Context::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = handle
                .read(&mut buf)
                .map_err(|source| WorkspaceError::io(&full, source))?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
        Ok(URL_SAFE.encode(context.compute().0))
    }

    pub fn cmp(&self, a: &FileKey, b: &FileKey, shallow: bool) -> Result<bool, WorkspaceError> {
        let fa = self.file(a)?;
        let fb = self.file(b)?;
        self.storage.cmp(&self.paths, fa, fb, shallow)
    }

    pub fn is_tarfile(&self, key: &FileKey) -> bool {
        match self.file(key) {
            Ok(file) => self.storage.is_tarfile(&self.paths, file),
            Err(_) => false,
        }
    }
}
