// error.rs — Error types for the upload workspace.

use std::path::PathBuf;
use thiserror::Error;

use crate::index::Partition;

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No file is registered at this path in the given partition.
    #[error("no such file: '{path}' ({partition})")]
    NoSuchFile { path: String, partition: Partition },

    /// A path would resolve outside its partition root, or was
    /// manipulated in a way that changes what it points at.
    #[error("unsafe path '{path}': {reason}")]
    SecurityError { path: String, reason: String },

    /// A checkpoint was requested but there are no active files to capture.
    #[error("no source files to checkpoint")]
    NoSourceFilesToCheckpoint,

    /// The workspace already holds the maximum number of checkpoints.
    #[error("checkpoint limit reached ({max})")]
    CheckpointLimitExceeded { max: usize },

    /// No checkpoint carries this checksum.
    #[error("checkpoint not found: {checksum}")]
    CheckpointNotFound { checksum: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A tarball could not be read or violated an unpack limit.
    #[error("archive error at {path}: {reason}")]
    ArchiveError { path: PathBuf, reason: String },

    /// Failed to serialize/deserialize workspace data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The workspace store has no record for this upload.
    #[error("workspace {upload_id} not found")]
    WorkspaceNotFound { upload_id: u64 },

    /// The workspace store operation failed.
    #[error("workspace store error: {0}")]
    StoreError(String),

    /// A status transition that the lifecycle does not allow.
    #[error("cannot move workspace from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The source type was already decided and `force` was not set.
    #[error("source type already set to {current}")]
    SourceTypeAlreadySet { current: String },

    /// The checking strategy hit its pass limit with files still unchecked.
    #[error("checks did not converge after {passes} passes")]
    CheckingDidNotConverge { passes: usize },

    /// An operation that needs a directory got a file.
    #[error("not a directory: '{path}'")]
    NotADirectory { path: String },

    /// A copy would overwrite an existing directory.
    #[error("directory already exists: '{path}'")]
    DirectoryExists { path: String },

    /// A copy target is already taken and `replace` was not set.
    #[error("file already exists: '{path}'")]
    FileExists { path: String },

    /// Removed and system files have no public path.
    #[error("not a public file: '{path}'")]
    NotPublic { path: String },

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    ConfigError(String),
}

impl WorkspaceError {
    pub fn no_such_file(path: impl Into<String>, partition: Partition) -> Self {
        WorkspaceError::NoSuchFile {
            path: path.into(),
            partition,
        }
    }

    pub fn security(path: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkspaceError::SecurityError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::IoError {
            path: path.into(),
            source,
        }
    }

    /// True for the "missing thing" family of errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkspaceError::NoSuchFile { .. }
            | WorkspaceError::CheckpointNotFound { .. }
            | WorkspaceError::WorkspaceNotFound { .. } => true,
            WorkspaceError::IoError { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, WorkspaceError::SecurityError { .. })
    }
}
