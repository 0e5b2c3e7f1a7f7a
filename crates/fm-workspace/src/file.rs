// file.rs — A single file or directory tracked by a workspace.
//
// Records carry no reference back to their workspace. Anything that needs
// storage (paths, checksums, I/O) goes through `Workspace` methods that take
// a `FileKey`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file_type::FileType;
use crate::index::Partition;
use crate::ledger::{LedgerEntry, Severity};

/// Addresses one record: its relative path within one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub path: String,
    pub partition: Partition,
}

impl FileKey {
    pub fn new(path: impl Into<String>, partition: Partition) -> Self {
        Self {
            path: path.into(),
            partition,
        }
    }

    pub fn source(path: impl Into<String>) -> Self {
        Self::new(path, Partition::Source)
    }

    pub fn system(path: impl Into<String>) -> Self {
        Self::new(path, Partition::System)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.path)
    }
}

impl From<&FileRecord> for FileKey {
    fn from(file: &FileRecord) -> Self {
        file.key()
    }
}

/// Metadata about one uploaded file or directory.
///
/// `path` is relative to the partition root. Directory paths end with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub is_removed: bool,
    #[serde(default)]
    pub is_ancillary: bool,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub is_checked: bool,
    #[serde(default)]
    pub is_persisted: bool,
    #[serde(default)]
    pub is_system: bool,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub reason_for_removal: Option<String>,
    #[serde(default)]
    pub errors: Vec<LedgerEntry>,
}

impl FileRecord {
    /// A fresh, unchecked source file.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size_bytes: 0,
            file_type: FileType::Unknown,
            is_removed: false,
            is_ancillary: false,
            is_directory: false,
            is_checked: false,
            is_persisted: false,
            is_system: false,
            last_modified: Utc::now(),
            reason_for_removal: None,
            errors: Vec::new(),
        }
    }

    /// A directory record. A trailing `/` is added if missing.
    pub fn directory(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        let mut record = Self::new(path);
        record.is_directory = true;
        record.file_type = FileType::Directory;
        record
    }

    /// Which index partition this record belongs to.
    ///
    /// Priority is system, then removed, then ancillary, then source.
    pub fn partition(&self) -> Partition {
        Partition::from_flags(self.is_ancillary, self.is_removed, self.is_system)
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(self.path.clone(), self.partition())
    }

    /// Final path component, without any trailing `/`.
    pub fn name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Name with everything from the last `.` removed.
    pub fn name_sans_ext(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Extension without the dot, or empty.
    pub fn ext(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(0) | None => "",
            Some(idx) => &name[idx + 1..],
        }
    }

    /// Parent directory path with a trailing `/`, or empty at the root.
    pub fn dir(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[..=idx],
            None => "",
        }
    }

    pub fn type_string(&self) -> &'static str {
        if self.is_removed {
            "Invalid File"
        } else if self.is_directory {
            if self.path == "anc/" {
                "Ancillary files directory"
            } else {
                "Directory"
            }
        } else {
            self.file_type.name()
        }
    }

    pub fn is_always_ignore(&self) -> bool {
        self.file_type == FileType::AlwaysIgnore
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// A source file: not ancillary, removed or system.
    pub fn is_active(&self) -> bool {
        !self.is_ancillary && !self.is_removed && !self.is_system
    }

    pub(crate) fn add_entry(&mut self, severity: Severity, message: impl Into<String>, persistent: bool) {
        let entry = LedgerEntry::new(severity, message)
            .for_path(self.path.clone())
            .persistent(persistent);
        self.errors.push(entry);
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.is_fatal())
    }

    pub fn has_warnings(&self) -> bool {
        self.errors.iter().any(|e| e.is_warning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_parts() {
        let f = FileRecord::new("figs/plot.final.eps");
        assert_eq!(f.name(), "plot.final.eps");
        assert_eq!(f.name_sans_ext(), "plot.final");
        assert_eq!(f.ext(), "eps");
        assert_eq!(f.dir(), "figs/");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let f = FileRecord::new(".hidden");
        assert_eq!(f.ext(), "");
        assert_eq!(f.name_sans_ext(), ".hidden");
        assert_eq!(f.dir(), "");
    }

    #[test]
    fn directory_paths_get_trailing_slash() {
        let d = FileRecord::directory("figs/sub");
        assert_eq!(d.path, "figs/sub/");
        assert_eq!(d.name(), "sub");
        assert_eq!(d.dir(), "figs/");
        assert_eq!(d.type_string(), "Directory");
        assert_eq!(FileRecord::directory("anc").type_string(), "Ancillary files directory");
    }

    #[test]
    fn partition_priority() {
        let mut f = FileRecord::new("x.tex");
        assert_eq!(f.partition(), Partition::Source);
        f.is_ancillary = true;
        assert_eq!(f.partition(), Partition::Ancillary);
        f.is_removed = true;
        assert_eq!(f.partition(), Partition::Removed);
        f.is_system = true;
        assert_eq!(f.partition(), Partition::System);
        assert_eq!(f.key(), FileKey::system("x.tex"));
    }

    #[test]
    fn only_source_files_are_active() {
        let mut f = FileRecord::new("x.tex");
        assert!(f.is_active());
        f.is_removed = true;
        assert!(!f.is_active());
        assert_eq!(f.type_string(), "Invalid File");

        let mut anc = FileRecord::new("anc/data.csv");
        anc.is_ancillary = true;
        assert!(!anc.is_active());
        let mut log = FileRecord::new("source.log");
        log.is_system = true;
        assert!(!log.is_active());
    }
}
