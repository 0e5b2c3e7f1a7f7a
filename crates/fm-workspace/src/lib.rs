//! # fm-workspace
//!
//! Upload workspaces: a versioned, security-checked virtual filesystem over
//! physical storage. A workspace receives the files of one submission,
//! runs them through pluggable checkers, keeps a ledger of what went
//! wrong, and can snapshot and restore its whole source tree.
//!
//! ## Key components
//!
//! - [`Workspace`] — the aggregate. Owns the [`FileIndex`], the
//!   [`ErrorLedger`] and a handle on a [`StorageAdapter`]; every operation
//!   goes through it.
//! - [`StorageAdapter`] — physical storage. [`SimpleStorageAdapter`] keeps
//!   everything in one root; [`QuarantineStorageAdapter`] holds new content
//!   in a quarantine root until it is persisted. Every path is checked for
//!   containment before it is used.
//! - [`Checker`] / [`CheckingStrategy`] — the checking pipeline. The
//!   default [`SynchronousCheckingStrategy`] runs to a fixed point, so
//!   checkers that produce files (archive extraction) are handled.
//! - Checkpoints — `create_checkpoint` / `restore_checkpoint` on
//!   [`Workspace`], addressed by the tarball's content checksum.
//! - [`WorkspaceStore`] — persistence contract for [`WorkspaceRecord`]s;
//!   [`JsonFileStore`] keeps one JSON document per upload.

pub mod checking;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod file;
pub mod file_type;
pub mod index;
pub mod ledger;
pub mod lifecycle;
pub mod mutations;
pub mod paths;
pub mod storage;
pub mod store;
pub mod system_files;
pub mod translate;
pub mod workspace;

pub use checking::{CheckError, Checker, CheckingStrategy, SynchronousCheckingStrategy};
pub use config::WorkspaceConfig;
pub use error::WorkspaceError;
pub use file::{FileKey, FileRecord};
pub use file_type::FileType;
pub use index::{FileIndex, Partition};
pub use ledger::{ErrorLedger, LedgerEntry, Readiness, Severity};
pub use lifecycle::{LockState, SourceType, Status};
pub use mutations::CreateOptions;
pub use paths::PathResolver;
pub use storage::{
    ArchiveLimits, QuarantineStorageAdapter, SimpleStorageAdapter, SkipReason, StorageAdapter,
    UnpackReport,
};
pub use store::{JsonFileStore, WorkspaceStore};
pub use translate::WorkspaceRecord;
pub use workspace::{FileFilter, FileSummary, FileTypeCounts, LastUpload, Workspace};
