// store.rs — WorkspaceStore trait and JsonFileStore implementation.
//
// The WorkspaceStore trait is the persistence contract for workspace
// records. JsonFileStore keeps one pretty-printed JSON document per upload:
// `<store_dir>/<upload_id>.json`. Writes go to a temp file in the same
// directory and are renamed into place, so a reader never sees half a record.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::translate::WorkspaceRecord;

/// Trait for persisting and retrieving workspace records.
pub trait WorkspaceStore {
    /// Load a record. A missing id is `WorkspaceNotFound`, not an I/O error.
    fn retrieve(&self, upload_id: u64) -> Result<WorkspaceRecord, WorkspaceError>;

    /// Save a new record. Fails if one already exists for this id.
    fn store(&mut self, record: &WorkspaceRecord) -> Result<(), WorkspaceError>;

    /// Overwrite an existing record.
    fn update(&mut self, record: &WorkspaceRecord) -> Result<(), WorkspaceError>;

    /// Remove a record. Returns false if there was none.
    fn delete(&mut self, upload_id: u64) -> Result<bool, WorkspaceError>;

    /// Every stored upload id, ascending.
    fn list_ids(&self) -> Result<Vec<u64>, WorkspaceError>;

    /// Next unused upload id.
    fn next_id(&self) -> Result<u64, WorkspaceError> {
        Ok(self.list_ids()?.last().map_or(1, |id| id + 1))
    }
}

/// One JSON file per upload.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    store_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given directory, creating it if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| WorkspaceError::io(&store_dir, source))?;
        Ok(Self { store_dir })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn record_file(&self, upload_id: u64) -> PathBuf {
        self.store_dir.join(format!("{}.json", upload_id))
    }

    fn write(&self, record: &WorkspaceRecord) -> Result<(), WorkspaceError> {
        let path = self.record_file(record.upload_id);
        let tmp = self
            .store_dir
            .join(format!(".{}.json.tmp", record.upload_id));
        let json = serde_json::to_vec_pretty(record)?;
        {
            let mut file = fs::File::create(&tmp).map_err(|source| WorkspaceError::io(&tmp, source))?;
            file.write_all(&json)
                .and_then(|_| file.sync_all())
                .map_err(|source| WorkspaceError::io(&tmp, source))?;
        }
        fs::rename(&tmp, &path).map_err(|source| WorkspaceError::io(&path, source))?;
        tracing::debug!(upload_id = record.upload_id, path = %path.display(), "record written");
        Ok(())
    }
}

impl WorkspaceStore for JsonFileStore {
    fn retrieve(&self, upload_id: u64) -> Result<WorkspaceRecord, WorkspaceError> {
        let path = self.record_file(upload_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::WorkspaceNotFound { upload_id });
            }
            Err(source) => return Err(WorkspaceError::io(path, source)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn store(&mut self, record: &WorkspaceRecord) -> Result<(), WorkspaceError> {
        if self.record_file(record.upload_id).exists() {
            return Err(WorkspaceError::StoreError(format!(
                "workspace {} already stored",
                record.upload_id
            )));
        }
        self.write(record)
    }

    fn update(&mut self, record: &WorkspaceRecord) -> Result<(), WorkspaceError> {
        if !self.record_file(record.upload_id).exists() {
            return Err(WorkspaceError::WorkspaceNotFound {
                upload_id: record.upload_id,
            });
        }
        self.write(record)
    }

    fn delete(&mut self, upload_id: u64) -> Result<bool, WorkspaceError> {
        let path = self.record_file(upload_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(WorkspaceError::io(path, source)),
        }
    }

    fn list_ids(&self) -> Result<Vec<u64>, WorkspaceError> {
        let entries = fs::read_dir(&self.store_dir)
            .map_err(|source| WorkspaceError::io(&self.store_dir, source))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WorkspaceError::io(&self.store_dir, source))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json").and_then(|s| s.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
