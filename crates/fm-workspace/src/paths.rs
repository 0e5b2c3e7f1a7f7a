// paths.rs — Workspace-relative path layout and public-path sanitizing.
//
// Layout under a storage root, for upload 1234:
//
//   1234/              system files (source.log, 1234.tar.gz, checkpoint/)
//   1234/src/          source files
//   1234/src/anc/      ancillary files
//   1234/removed/      removed files
//
// Everything here is lexical. Turning these into absolute paths and checking
// containment on disk is the storage adapter's job.

use std::path::{Component, Path};

use path_clean::PathClean;

use crate::error::WorkspaceError;
use crate::index::Partition;

pub const SOURCE_PREFIX: &str = "src";
pub const REMOVED_PREFIX: &str = "removed";
pub const ANCILLARY_PREFIX: &str = "anc";

/// Maps (relative path, partition) to a path relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    upload_id: u64,
    base_path: String,
}

impl PathResolver {
    pub fn new(upload_id: u64) -> Self {
        Self {
            upload_id,
            base_path: upload_id.to_string(),
        }
    }

    pub fn upload_id(&self) -> u64 {
        self.upload_id
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn source_path(&self) -> String {
        format!("{}/{}", self.base_path, SOURCE_PREFIX)
    }

    pub fn removed_path(&self) -> String {
        format!("{}/{}", self.base_path, REMOVED_PREFIX)
    }

    pub fn ancillary_path(&self) -> String {
        format!("{}/{}/{}", self.base_path, SOURCE_PREFIX, ANCILLARY_PREFIX)
    }

    /// Root of a partition, relative to the storage root.
    pub fn partition_path(&self, partition: Partition) -> String {
        match partition {
            Partition::Source => self.source_path(),
            Partition::Ancillary => self.ancillary_path(),
            Partition::Removed => self.removed_path(),
            Partition::System => self.base_path.clone(),
        }
    }

    /// Path of a file relative to the storage root.
    pub fn get_path(&self, path: &str, partition: Partition) -> String {
        let path = path.trim_start_matches('/');
        let root = self.partition_path(partition);
        if path.is_empty() {
            root
        } else {
            format!("{}/{}", root, path)
        }
    }
}

/// Drop a leading `./` (repeatedly).
pub fn strip_dot_slash(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path
}

/// Split off the ancillary prefix. Returns the path relative to the
/// ancillary root and `true` when `path` is `anc/...`.
pub fn is_ancillary_path(path: &str) -> (String, bool) {
    let prefix = format!("{}/", ANCILLARY_PREFIX);
    match path.strip_prefix(&prefix) {
        Some(rest) => (rest.to_string(), true),
        None => (path.to_string(), false),
    }
}

/// True when a relative path has a `..` component or is absolute.
pub fn has_traversal(path: &str) -> bool {
    Path::new(path).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Normalize a path supplied by a client.
///
/// The result is relative to its partition root, plus whether it belongs
/// in the ancillary partition. Any path that lexical cleaning would change
/// (`a/../b`, `a//b`, `./a`), or that is absolute or climbs out of the
/// root, is refused. A trailing `/` is kept.
pub fn sanitize_public_path(raw: &str) -> Result<(String, bool), WorkspaceError> {
    if raw.is_empty() {
        return Err(WorkspaceError::security(raw, "empty path"));
    }
    if raw.contains('\0') || raw.contains('\\') {
        return Err(WorkspaceError::security(raw, "illegal character"));
    }
    if raw.starts_with('/') || has_traversal(raw) {
        return Err(WorkspaceError::security(raw, "escapes partition root"));
    }

    let is_dir = raw.ends_with('/');
    let trimmed = raw.trim_end_matches('/');
    let cleaned = Path::new(trimmed).clean();
    let cleaned = cleaned.to_string_lossy();
    if cleaned != trimmed || cleaned == "." {
        return Err(WorkspaceError::security(raw, "path is not normalized"));
    }

    let (path, ancillary) = is_ancillary_path(raw);
    let path = if is_dir && !path.ends_with('/') {
        format!("{}/", path)
    } else {
        path
    };
    Ok((path, ancillary))
}
