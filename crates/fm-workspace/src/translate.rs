// translate.rs — Conversion between a live Workspace and its stored record.
//
// The record is the whole persistent state: identity, lifecycle, last
// upload bookkeeping, every file record and the workspace-scoped ledger.
// Storage, checkers and strategy are not part of it; they are injected
// again when a record is loaded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::FileIndex;
use crate::ledger::ErrorLedger;
use crate::lifecycle::{LockState, SourceType, Status};
use crate::paths::PathResolver;
use crate::storage::StorageAdapter;
use crate::workspace::{LastUpload, Workspace};

/// Serialized form of a workspace, as kept by a `WorkspaceStore` and in
/// checkpoint sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub upload_id: u64,
    pub owner_user_id: String,
    pub created_datetime: DateTime<Utc>,
    pub modified_datetime: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub lock_state: LockState,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub last_upload: LastUpload,
    #[serde(default)]
    pub files: FileIndex,
    /// Workspace-scoped entries only; file entries travel with their files.
    #[serde(default)]
    pub errors: ErrorLedger,
}

impl Workspace {
    /// Snapshot for storage. Non-persistent workspace entries are dropped.
    pub fn to_record(&self) -> WorkspaceRecord {
        WorkspaceRecord {
            upload_id: self.upload_id,
            owner_user_id: self.owner_user_id.clone(),
            created_datetime: self.created_datetime,
            modified_datetime: self.modified_datetime,
            status: self.status,
            lock_state: self.lock_state,
            source_type: self.source_type,
            last_upload: self.last_upload.clone(),
            files: self.files.clone(),
            errors: self.ledger.persistent(),
        }
    }

    /// Rebuild a workspace around a stored record. Checkers and strategy
    /// start at their defaults; attach them with `with_checkers` /
    /// `with_config`.
    pub fn from_record(record: WorkspaceRecord, storage: Arc<dyn StorageAdapter>) -> Self {
        let mut workspace = Workspace::new(record.upload_id, record.owner_user_id, storage);
        workspace.created_datetime = record.created_datetime;
        workspace.modified_datetime = record.modified_datetime;
        workspace.status = record.status;
        workspace.lock_state = record.lock_state;
        workspace.source_type = record.source_type;
        workspace.last_upload = record.last_upload;
        workspace.files = record.files.normalized();
        workspace.ledger = record.errors;
        workspace.paths = PathResolver::new(record.upload_id);
        workspace
    }
}
