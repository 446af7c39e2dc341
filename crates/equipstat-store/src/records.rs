//! Dataset record store: id → {blob handle, upload time}
//!
//! Records are kept in a single JSON index (`records.json`) that is
//! rewritten atomically on every change. Ids come from a persisted
//! counter and are never reused.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blob::BlobHandle;
use crate::error::{StoreError, StoreResult};

/// File name of the record index inside the data directory.
pub const INDEX_FILE: &str = "records.json";

/// Metadata for one uploaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: u64,
    pub storage_handle: BlobHandle,
    pub uploaded_at: DateTime<Utc>,
    /// Full blake3 hex digest of the stored bytes.
    pub content_hash: String,
}

impl DatasetRecord {
    /// Base file name of the stored upload.
    pub fn dataset_name(&self) -> &str {
        self.storage_handle.file_name()
    }
}

/// Order records newest first: `uploaded_at` descending, later insert wins ties.
pub fn sort_newest_first(records: &mut [DatasetRecord]) {
    records.sort_by(|a, b| {
        b.uploaded_at
            .cmp(&a.uploaded_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Persistent mapping from dataset id to its record.
pub trait RecordStore: Send + Sync {
    /// Insert a new record, assigning its id.
    fn insert(
        &self,
        storage_handle: BlobHandle,
        content_hash: String,
        uploaded_at: DateTime<Utc>,
    ) -> StoreResult<DatasetRecord>;

    fn get(&self, id: u64) -> StoreResult<Option<DatasetRecord>>;

    /// All records, newest first (see [`sort_newest_first`]).
    fn list_newest_first(&self) -> StoreResult<Vec<DatasetRecord>>;

    /// Remove a record. Returns `None` when the id does not exist.
    fn delete(&self, id: u64) -> StoreResult<Option<DatasetRecord>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordIndex {
    next_id: u64,
    records: Vec<DatasetRecord>,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: Vec::new(),
        }
    }
}

/// [`RecordStore`] backed by `{base}/records.json`.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    // Serializes read-modify-write of the index file.
    lock: Mutex<()>,
}

impl JsonRecordStore {
    /// Open (or lazily create) the record index under `base`.
    pub fn new(base: &Path) -> StoreResult<Self> {
        fs::create_dir_all(base).map_err(|e| {
            StoreError::io(format!("failed to create data dir {}", base.display()), e)
        })?;
        let store = Self {
            path: base.join(INDEX_FILE),
            lock: Mutex::new(()),
        };
        // Fail early on a corrupt index rather than on first upload
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<RecordIndex> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordIndex::default());
            }
            Err(e) => {
                return Err(StoreError::io(
                    format!("failed to read {}", self.path.display()),
                    e,
                ))
            }
        };
        serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Write tmp then rename so readers never see a half-written index.
    fn save(&self, index: &RecordIndex) -> StoreResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(index).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&tmp, json)
            .map_err(|e| StoreError::io(format!("failed to write {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            StoreError::io(
                format!("failed to rename {} → {}", tmp.display(), self.path.display()),
                e,
            )
        })
    }

    fn with_index<T>(&self, f: impl FnOnce(&mut RecordIndex) -> (T, bool)) -> StoreResult<T> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut index = self.load()?;
        let (out, dirty) = f(&mut index);
        if dirty {
            self.save(&index)?;
        }
        Ok(out)
    }
}

impl RecordStore for JsonRecordStore {
    fn insert(
        &self,
        storage_handle: BlobHandle,
        content_hash: String,
        uploaded_at: DateTime<Utc>,
    ) -> StoreResult<DatasetRecord> {
        self.with_index(|index| {
            let record = DatasetRecord {
                id: index.next_id,
                storage_handle,
                uploaded_at,
                content_hash,
            };
            index.next_id += 1;
            index.records.push(record.clone());
            (record, true)
        })
    }

    fn get(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
        self.with_index(|index| {
            let found = index.records.iter().find(|r| r.id == id).cloned();
            (found, false)
        })
    }

    fn list_newest_first(&self) -> StoreResult<Vec<DatasetRecord>> {
        let mut records = self.with_index(|index| (std::mem::take(&mut index.records), false))?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
        self.with_index(|index| match index.records.iter().position(|r| r.id == id) {
            Some(pos) => (Some(index.records.remove(pos)), true),
            None => (None, false),
        })
    }
}
