// ledger.rs — Errors and warnings attached to files and to the workspace.
//
// Entries live in two places: on the `FileRecord` they concern, and in the
// workspace-scoped `ErrorLedger`. Every aggregate query takes the file
// index explicitly, so readiness is always derived from current state and
// never cached.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::FileRecord;
use crate::index::FileIndex;

/// How bad an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "fatal")]
    Fatal,
    #[serde(rename = "warn")]
    Warning,
    #[serde(rename = "info")]
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Warning => write!(f, "warn"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A single error, warning, or informational note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub severity: Severity,
    pub message: String,
    /// Path of the file this concerns; `None` for workspace-scoped entries.
    #[serde(default)]
    pub path: Option<String>,
    /// Non-persistent entries describe the current request only and are
    /// not written back to the workspace store.
    #[serde(default = "default_persistent", alias = "is_persistant")]
    pub is_persistent: bool,
}

fn default_persistent() -> bool {
    true
}

impl LedgerEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: None,
            is_persistent: true,
        }
    }

    pub fn for_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn persistent(mut self, is_persistent: bool) -> Self {
        self.is_persistent = is_persistent;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

/// Overall status of the workspace, derived from its entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Readiness {
    #[default]
    Ready,
    ReadyWithWarnings,
    Errors,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => write!(f, "READY"),
            Readiness::ReadyWithWarnings => write!(f, "READY_WITH_WARNINGS"),
            Readiness::Errors => write!(f, "ERRORS"),
        }
    }
}

/// Workspace-scoped entries (those not tied to any one file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLedger {
    entries: Vec<LedgerEntry>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries that should survive a round trip through the store.
    pub fn persistent(&self) -> ErrorLedger {
        ErrorLedger {
            entries: self
                .entries
                .iter()
                .filter(|e| e.is_persistent)
                .cloned()
                .collect(),
        }
    }

    /// Every entry: those on each file, then workspace-scoped ones.
    pub fn all<'a>(&'a self, files: &'a FileIndex) -> Vec<&'a LedgerEntry> {
        files
            .iter()
            .flat_map(|f| f.errors.iter())
            .chain(self.entries.iter())
            .collect()
    }

    /// Fatal entries on active files plus workspace-scoped fatal entries.
    pub fn fatal_errors<'a>(&'a self, files: &'a FileIndex) -> Vec<&'a LedgerEntry> {
        self.active(files, LedgerEntry::is_fatal)
    }

    /// Warnings on active files plus workspace-scoped warnings.
    pub fn active_warnings<'a>(&'a self, files: &'a FileIndex) -> Vec<&'a LedgerEntry> {
        self.active(files, LedgerEntry::is_warning)
    }

    /// Every warning, including those on removed and system files.
    pub fn warnings<'a>(&'a self, files: &'a FileIndex) -> Vec<&'a LedgerEntry> {
        self.all(files)
            .into_iter()
            .filter(|e| e.is_warning())
            .collect()
    }

    pub fn has_fatal_errors(&self, files: &FileIndex) -> bool {
        !self.fatal_errors(files).is_empty()
    }

    pub fn has_active_warnings(&self, files: &FileIndex) -> bool {
        !self.active_warnings(files).is_empty()
    }

    pub fn readiness(&self, files: &FileIndex) -> Readiness {
        if self.has_fatal_errors(files) {
            Readiness::Errors
        } else if self.has_active_warnings(files) {
            Readiness::ReadyWithWarnings
        } else {
            Readiness::Ready
        }
    }

    fn active<'a>(
        &'a self,
        files: &'a FileIndex,
        keep: fn(&LedgerEntry) -> bool,
    ) -> Vec<&'a LedgerEntry> {
        files
            .iter()
            .filter(|f| f.is_active())
            .flat_map(|f| f.errors.iter())
            .chain(self.entries.iter())
            .filter(|e| keep(e))
            .collect()
    }
}

/// Warnings recorded against one file.
pub fn warnings_for(file: &FileRecord) -> Vec<&LedgerEntry> {
    file.errors.iter().filter(|e| e.is_warning()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileRecord;

    fn index_with(files: Vec<FileRecord>) -> FileIndex {
        files.into_iter().collect()
    }

    #[test]
    fn readiness_is_ready_when_empty() {
        let ledger = ErrorLedger::new();
        assert_eq!(ledger.readiness(&FileIndex::new()), Readiness::Ready);
    }

    #[test]
    fn warning_on_active_file_gives_ready_with_warnings() {
        let mut f = FileRecord::new("a.tex");
        f.errors
            .push(LedgerEntry::new(Severity::Warning, "odd").for_path("a.tex"));
        let files = index_with(vec![f]);
        assert_eq!(
            ErrorLedger::new().readiness(&files),
            Readiness::ReadyWithWarnings
        );
    }

    #[test]
    fn fatal_on_removed_file_is_ignored() {
        let mut f = FileRecord::new("a.tex");
        f.is_removed = true;
        f.errors
            .push(LedgerEntry::new(Severity::Fatal, "broken").for_path("a.tex"));
        let files = index_with(vec![f]);
        let ledger = ErrorLedger::new();
        assert!(ledger.fatal_errors(&files).is_empty());
        assert_eq!(ledger.readiness(&files), Readiness::Ready);
        assert_eq!(ledger.all(&files).len(), 1);
    }

    #[test]
    fn entries_on_ancillary_and_system_files_are_ignored() {
        let mut anc = FileRecord::new("data.csv");
        anc.is_ancillary = true;
        anc.errors
            .push(LedgerEntry::new(Severity::Fatal, "unreadable").for_path("data.csv"));
        let mut notes = FileRecord::new("notes.csv");
        notes.is_ancillary = true;
        notes
            .errors
            .push(LedgerEntry::new(Severity::Warning, "odd").for_path("notes.csv"));
        let mut log = FileRecord::new("source.log");
        log.is_system = true;
        log.errors
            .push(LedgerEntry::new(Severity::Fatal, "truncated").for_path("source.log"));
        log.errors
            .push(LedgerEntry::new(Severity::Warning, "rotated").for_path("source.log"));

        let files = index_with(vec![anc, notes, log]);
        let ledger = ErrorLedger::new();
        assert!(ledger.fatal_errors(&files).is_empty());
        assert!(ledger.active_warnings(&files).is_empty());
        assert_eq!(ledger.readiness(&files), Readiness::Ready);
        assert_eq!(ledger.warnings(&files).len(), 2);
        assert_eq!(ledger.all(&files).len(), 4);
    }

    #[test]
    fn fatal_on_source_file_wins_over_ancillary_warning() {
        let mut anc = FileRecord::new("data.csv");
        anc.is_ancillary = true;
        anc.errors
            .push(LedgerEntry::new(Severity::Warning, "odd").for_path("data.csv"));
        let mut main = FileRecord::new("main.tex");
        main.errors
            .push(LedgerEntry::new(Severity::Fatal, "broken").for_path("main.tex"));
        let files = index_with(vec![anc, main]);
        let ledger = ErrorLedger::new();
        assert_eq!(ledger.fatal_errors(&files).len(), 1);
        assert_eq!(ledger.readiness(&files), Readiness::Errors);
    }

    #[test]
    fn workspace_scoped_fatal_counts() {
        let mut ledger = ErrorLedger::new();
        ledger.push(LedgerEntry::new(Severity::Fatal, "no usable source"));
        assert_eq!(ledger.readiness(&FileIndex::new()), Readiness::Errors);
    }

    #[test]
    fn persistent_filter_drops_transient_entries() {
        let mut ledger = ErrorLedger::new();
        ledger.push(LedgerEntry::new(Severity::Info, "this request only").persistent(false));
        ledger.push(LedgerEntry::new(Severity::Warning, "sticky"));
        let kept = ledger.persistent();
        assert_eq!(kept.entries().len(), 1);
        assert_eq!(kept.entries()[0].message, "sticky");
    }

    #[test]
    fn legacy_persistence_field_is_accepted() {
        let entry: LedgerEntry = serde_json::from_str(
            r#"{"severity":"warn","message":"m","path":null,"is_persistant":false}"#,
        )
        .unwrap();
        assert!(!entry.is_persistent);
        assert_eq!(entry.severity, Severity::Warning);
    }
}
