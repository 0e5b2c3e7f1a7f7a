// index.rs — Partitioned index of file records.
//
// Four maps keyed by relative path. A record's partition is derived from
// its flags, so the same relative path may exist in more than one
// partition at once (for example `main.tex` in source and in removed).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::file::{FileKey, FileRecord};

/// The four disjoint groups of files in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Source,
    Ancillary,
    Removed,
    System,
}

impl Partition {
    /// Iteration order of `FileIndex::iter`.
    pub const ALL: [Partition; 4] = [
        Partition::Source,
        Partition::Ancillary,
        Partition::Removed,
        Partition::System,
    ];

    pub fn from_flags(is_ancillary: bool, is_removed: bool, is_system: bool) -> Self {
        if is_system {
            Partition::System
        } else if is_removed {
            Partition::Removed
        } else if is_ancillary {
            Partition::Ancillary
        } else {
            Partition::Source
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Source => write!(f, "source"),
            Partition::Ancillary => write!(f, "ancillary"),
            Partition::Removed => write!(f, "removed"),
            Partition::System => write!(f, "system"),
        }
    }
}

/// Records grouped by partition. Serializes as four path-keyed maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    #[serde(default)]
    source: BTreeMap<String, FileRecord>,
    #[serde(default)]
    ancillary: BTreeMap<String, FileRecord>,
    #[serde(default)]
    removed: BTreeMap<String, FileRecord>,
    #[serde(default)]
    system: BTreeMap<String, FileRecord>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(&self, partition: Partition) -> &BTreeMap<String, FileRecord> {
        match partition {
            Partition::Source => &self.source,
            Partition::Ancillary => &self.ancillary,
            Partition::Removed => &self.removed,
            Partition::System => &self.system,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<String, FileRecord> {
        match partition {
            Partition::Source => &mut self.source,
            Partition::Ancillary => &mut self.ancillary,
            Partition::Removed => &mut self.removed,
            Partition::System => &mut self.system,
        }
    }

    /// Insert a record under its own path, in the partition its flags
    /// select. Returns whatever was there before.
    pub fn set(&mut self, record: FileRecord) -> Option<FileRecord> {
        let partition = record.partition();
        self.partition_mut(partition)
            .insert(record.path.clone(), record)
    }

    pub fn contains(&self, path: &str, partition: Partition) -> bool {
        self.partition(partition).contains_key(path)
    }

    pub fn contains_key(&self, key: &FileKey) -> bool {
        self.contains(&key.path, key.partition)
    }

    pub fn get(&self, path: &str, partition: Partition) -> Result<&FileRecord, WorkspaceError> {
        self.partition(partition)
            .get(path)
            .ok_or_else(|| WorkspaceError::no_such_file(path, partition))
    }

    pub fn get_key(&self, key: &FileKey) -> Result<&FileRecord, WorkspaceError> {
        self.get(&key.path, key.partition)
    }

    /// Mutable access. Callers must not change `path` or the partition
    /// flags through this; re-home the record with `pop` + `set` instead.
    pub(crate) fn get_mut(
        &mut self,
        path: &str,
        partition: Partition,
    ) -> Result<&mut FileRecord, WorkspaceError> {
        self.partition_mut(partition)
            .get_mut(path)
            .ok_or_else(|| WorkspaceError::no_such_file(path, partition))
    }

    pub fn pop(&mut self, path: &str, partition: Partition) -> Option<FileRecord> {
        self.partition_mut(partition).remove(path)
    }

    pub fn items(&self, partition: Partition) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.partition(partition).iter()
    }

    /// All records: source, ancillary, removed, then system.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.source
            .values()
            .chain(self.ancillary.values())
            .chain(self.removed.values())
            .chain(self.system.values())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.source
            .values_mut()
            .chain(self.ancillary.values_mut())
            .chain(self.removed.values_mut())
            .chain(self.system.values_mut())
    }

    pub fn clear(&mut self, partition: Partition) {
        self.partition_mut(partition).clear();
    }

    /// Swap one partition wholesale.
    pub(crate) fn replace_partition(
        &mut self,
        partition: Partition,
        records: BTreeMap<String, FileRecord>,
    ) {
        *self.partition_mut(partition) = records;
    }

    pub fn len(&self) -> usize {
        Partition::ALL
            .iter()
            .map(|p| self.partition(*p).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild from deserialized maps, re-deriving each record's partition
    /// from its flags rather than trusting the map it arrived in.
    pub fn normalized(self) -> Self {
        let records: Vec<FileRecord> = Partition::ALL
            .iter()
            .flat_map(|p| self.partition(*p).values().cloned().collect::<Vec<_>>())
            .collect();
        records.into_iter().collect()
    }
}

impl FromIterator<FileRecord> for FileIndex {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut index = FileIndex::new();
        for record in iter {
            index.set(record);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(path: &str, ancillary: bool, removed: bool, system: bool) -> FileRecord {
        let mut r = FileRecord::new(path);
        r.is_ancillary = ancillary;
        r.is_removed = removed;
        r.is_system = system;
        r
    }

    #[test]
    fn set_routes_by_flag_priority() {
        let mut index = FileIndex::new();
        index.set(record("a", false, false, false));
        index.set(record("b", true, false, false));
        index.set(record("c", true, true, false));
        index.set(record("d", true, true, true));

        assert!(index.contains("a", Partition::Source));
        assert!(index.contains("b", Partition::Ancillary));
        assert!(index.contains("c", Partition::Removed));
        assert!(index.contains("d", Partition::System));
        assert!(!index.contains("d", Partition::Removed));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn same_path_in_two_partitions() {
        let mut index = FileIndex::new();
        index.set(record("main.tex", false, false, false));
        index.set(record("main.tex", false, true, false));
        assert_eq!(index.len(), 2);
        assert!(index.get("main.tex", Partition::Source).is_ok());
        assert!(index.get("main.tex", Partition::Removed).is_ok());
    }

    #[test]
    fn get_missing_is_no_such_file() {
        let index = FileIndex::new();
        let err = index.get("nope", Partition::Source).unwrap_err();
        assert!(matches!(err, WorkspaceError::NoSuchFile { .. }));
    }

    #[test]
    fn iteration_order_is_source_ancillary_removed_system() {
        let index: FileIndex = vec![
            record("s", false, false, true),
            record("r", false, true, false),
            record("x", false, false, false),
            record("n", true, false, false),
        ]
        .into_iter()
        .collect();
        let order: Vec<&str> = index.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["x", "n", "r", "s"]);
    }

    #[test]
    fn pop_removes_only_that_partition() {
        let mut index = FileIndex::new();
        index.set(record("a", false, false, false));
        index.set(record("a", true, false, false));
        assert!(index.pop("a", Partition::Source).is_some());
        assert!(index.pop("a", Partition::Source).is_none());
        assert!(index.contains("a", Partition::Ancillary));
    }

    #[test]
    fn normalized_moves_misfiled_records() {
        let mut index = FileIndex::new();
        index
            .source
            .insert("r".into(), record("r", false, true, false));
        let index = index.normalized();
        assert!(index.contains("r", Partition::Removed));
        assert!(!index.contains("r", Partition::Source));
    }
}
