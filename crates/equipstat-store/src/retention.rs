//! Retention window: keep only the N most recent datasets

use std::sync::Mutex;

use crate::blob::BlobStore;
use crate::error::StoreResult;
use crate::records::{DatasetRecord, RecordStore};

/// Default size of the retention window.
pub const DEFAULT_KEEP: usize = 5;

/// Outcome of deleting a single dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub record: DatasetRecord,
    /// False when the bytes could not be removed (already absent or I/O failure).
    pub blob_removed: bool,
}

/// Delete a record and its backing bytes.
///
/// The record goes first; a failure to remove the bytes is logged and
/// reported, never returned, so the record deletion always stands.
/// Returns `None` when no record has this id.
pub fn delete_dataset<B, R>(blobs: &B, records: &R, id: u64) -> StoreResult<Option<Deletion>>
where
    B: BlobStore + ?Sized,
    R: RecordStore + ?Sized,
{
    let Some(record) = records.delete(id)? else {
        return Ok(None);
    };
    let blob_removed = match blobs.delete(&record.storage_handle) {
        Ok(true) => true,
        Ok(false) => {
            log::debug!(
                "dataset {}: blob {} already absent",
                record.id,
                record.storage_handle
            );
            false
        }
        Err(e) => {
            log::warn!(
                "dataset {}: failed to delete blob {}: {e}",
                record.id,
                record.storage_handle
            );
            false
        }
    };
    Ok(Some(Deletion {
        record,
        blob_removed,
    }))
}

/// Summary of one retention pass.
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub evicted: Vec<Deletion>,
}

impl RetentionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }
}

/// Enforces the retention window over a record store and its blobs.
#[derive(Debug)]
pub struct RetentionManager {
    keep: usize,
    // Held across enumerate + trim so concurrent passes cannot interleave.
    lock: Mutex<()>,
}

impl Default for RetentionManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP)
    }
}

impl RetentionManager {
    /// Window of `keep` records. A window of 0 evicts everything.
    pub fn new(keep: usize) -> Self {
        Self {
            keep,
            lock: Mutex::new(()),
        }
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Evict every record beyond the `keep` newest, with its bytes.
    pub fn enforce<B, R>(&self, blobs: &B, records: &R) -> StoreResult<RetentionReport>
    where
        B: BlobStore + ?Sized,
        R: RecordStore + ?Sized,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let live = records.list_newest_first()?;
        let mut report = RetentionReport::default();
        if live.len() <= self.keep {
            return Ok(report);
        }

        for record in &live[self.keep..] {
            // None: another writer already removed it
            if let Some(deletion) = delete_dataset(blobs, records, record.id)? {
                log::info!(
                    "retention: evicted dataset {} ({}, uploaded {})",
                    record.id,
                    record.dataset_name(),
                    record.uploaded_at.to_rfc3339()
                );
                report.evicted.push(deletion);
            }
        }
        Ok(report)
    }
}
