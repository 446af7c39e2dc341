//! Ingestion workflow: store, validate, summarize, retain
//!
//! The upload is persisted *before* it is validated. A rejected upload is
//! rolled back (record and bytes) so that nothing survives a failed
//! attempt, and the retention window is enforced after every attempt.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use equipstat_store::{
    BlobStore, DatasetRecord, FsBlobStore, JsonRecordStore, RecordStore, RetentionManager,
    VerifyResult, hash_bytes, maintenance, retention,
};

use crate::error::IngestError;
use crate::stats::{self, StatisticsPayload};
use crate::table::Table;
use crate::validate;

/// Default number of entries returned by [`Ingestor::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// One line of the upload history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub dataset_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&DatasetRecord> for HistoryEntry {
    fn from(record: &DatasetRecord) -> Self {
        Self {
            id: record.id,
            dataset_name: record.dataset_name().to_string(),
            uploaded_at: record.uploaded_at,
        }
    }
}

/// Runs uploads end to end over a blob store and a record store.
pub struct Ingestor<B = FsBlobStore, R = JsonRecordStore> {
    blobs: B,
    records: R,
    retention: RetentionManager,
}

impl Ingestor {
    /// Open the filesystem stores under `data_dir`, keeping `keep` datasets.
    pub fn open(data_dir: &Path, keep: usize) -> Result<Self, IngestError> {
        let blobs = FsBlobStore::new(data_dir)?;
        let records = JsonRecordStore::new(data_dir)?;
        Ok(Self::new(blobs, records, RetentionManager::new(keep)))
    }
}

impl<B: BlobStore, R: RecordStore> Ingestor<B, R> {
    pub fn new(blobs: B, records: R, retention: RetentionManager) -> Self {
        Self {
            blobs,
            records,
            retention,
        }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    /// Ingest an upload stamped with the current time.
    pub fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<StatisticsPayload, IngestError> {
        self.ingest_at(file_name, bytes, Utc::now())
    }

    /// Ingest an upload with an explicit upload time.
    pub fn ingest_at(
        &self,
        file_name: &str,
        bytes: &[u8],
        uploaded_at: DateTime<Utc>,
    ) -> Result<StatisticsPayload, IngestError> {
        let record = self.create_pending(file_name, bytes, uploaded_at)?;

        let result = self.analyze(&record);
        match &result {
            Ok(payload) => log::info!(
                "dataset {} ({}): accepted {} rows",
                record.id,
                record.dataset_name(),
                payload.total_equipment_count
            ),
            Err(e) => {
                log::info!("dataset {} ({}): rejected: {e}", record.id, record.dataset_name());
                self.rollback(&record);
            }
        }

        self.trim();
        result
    }

    /// Store the bytes and insert a record pointing at them.
    fn create_pending(
        &self,
        file_name: &str,
        bytes: &[u8],
        uploaded_at: DateTime<Utc>,
    ) -> Result<DatasetRecord, IngestError> {
        let handle = self.blobs.put(file_name, bytes)?;
        let content_hash = hash_bytes(bytes).to_hex().to_string();
        match self.records.insert(handle.clone(), content_hash, uploaded_at) {
            Ok(record) => Ok(record),
            Err(e) => {
                if let Err(del) = self.blobs.delete(&handle) {
                    log::error!("failed to remove blob {handle} after insert failure: {del}");
                }
                Err(e.into())
            }
        }
    }

    /// Read the stored upload back, validate it and compute statistics.
    fn analyze(&self, record: &DatasetRecord) -> Result<StatisticsPayload, IngestError> {
        let bytes = self.blobs.read(&record.storage_handle)?;
        let table = Table::parse(&bytes)?;
        let columns = validate::validate(&table)?;
        stats::compute(&table, &columns)
    }

    fn rollback(&self, record: &DatasetRecord) {
        match retention::delete_dataset(&self.blobs, &self.records, record.id) {
            Ok(Some(_)) => log::debug!("dataset {}: rolled back", record.id),
            Ok(None) => log::debug!("dataset {}: already gone", record.id),
            Err(e) => log::error!("dataset {}: rollback failed: {e}", record.id),
        }
    }

    /// Best-effort retention pass; failures never fail the ingestion.
    fn trim(&self) {
        match self.retention.enforce(&self.blobs, &self.records) {
            Ok(report) if !report.is_empty() => log::info!(
                "retention: evicted {} dataset(s), keeping {}",
                report.evicted.len(),
                self.retention.keep()
            ),
            Ok(_) => {}
            Err(e) => log::warn!("retention pass failed: {e}"),
        }
    }

    /// The `limit` most recent uploads, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, IngestError> {
        Ok(self
            .records
            .list_newest_first()?
            .iter()
            .take(limit)
            .map(HistoryEntry::from)
            .collect())
    }

    pub fn get(&self, id: u64) -> Result<Option<DatasetRecord>, IngestError> {
        Ok(self.records.get(id)?)
    }

    /// Every live record, newest first.
    pub fn records(&self) -> Result<Vec<DatasetRecord>, IngestError> {
        Ok(self.records.list_newest_first()?)
    }

    /// Delete a dataset and its bytes. Returns `false` for an unknown id.
    pub fn delete(&self, id: u64) -> Result<bool, IngestError> {
        let deleted = retention::delete_dataset(&self.blobs, &self.records, id)?;
        if let Some(d) = &deleted {
            log::info!("dataset {} ({}): deleted", id, d.record.dataset_name());
        }
        Ok(deleted.is_some())
    }

    /// Check every live dataset's bytes against its recorded hash.
    pub fn verify(&self) -> Result<Vec<VerifyResult>, IngestError> {
        Ok(maintenance::verify(&self.blobs, &self.records)?)
    }

    /// Blobs no record references (what [`Self::sweep`] would remove, minus tmp files).
    pub fn orphans(&self) -> Result<Vec<String>, IngestError> {
        Ok(maintenance::orphans(&self.blobs, &self.records)?)
    }

    /// Remove unreferenced blobs and stale tmp files.
    pub fn sweep(&self) -> Result<Vec<String>, IngestError> {
        Ok(maintenance::sweep(&self.blobs, &self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use equipstat_store::{BlobHandle, StoreError, StoreResult};

    const VALID: &[u8] = b"Equipment Name,Type,Flowrate,Pressure,Temperature\n\
        P-1,Pump,10,5.5,80\n\
        P-2,Pump,20,6.5,90\n\
        T-1,Tank,21,7.0,100\n";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ingestor() -> (tempfile::TempDir, Ingestor) {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = Ingestor::open(dir.path(), 5).unwrap();
        (dir, ingestor)
    }

    #[test]
    fn ingest_valid_keeps_record_and_blob() {
        let (_dir, ing) = ingestor();
        let payload = ing.ingest("plant.csv", VALID).unwrap();
        assert_eq!(payload.total_equipment_count, 3);

        let records = ing.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dataset_name(), "plant.csv");
        assert_eq!(ing.blobs().read(&records[0].storage_handle).unwrap(), VALID);
        assert_eq!(records[0].content_hash, hash_bytes(VALID).to_hex().to_string());
    }

    #[test]
    fn rejected_upload_leaves_nothing() {
        let (_dir, ing) = ingestor();
        let err = ing
            .ingest("bad.csv", b"Equipment Name,Type\nP-1,Pump\n")
            .unwrap_err();
        assert!(matches!(err, IngestError::Schema { .. }));
        assert!(ing.records().unwrap().is_empty());
        assert!(ing.blobs().list().unwrap().is_empty());
    }

    #[test]
    fn rejected_upload_does_not_evict() {
        let (_dir, ing) = ingestor();
        for i in 0..5 {
            ing.ingest_at(&format!("{i}.csv"), VALID, at(i)).unwrap();
        }
        ing.ingest_at("bad.csv", b"", at(10)).unwrap_err();
        let names: Vec<_> = ing
            .history(10)
            .unwrap()
            .into_iter()
            .map(|h| h.dataset_name)
            .collect();
        assert_eq!(names, vec!["4.csv", "3.csv", "2.csv", "1.csv", "0.csv"]);
    }

    #[test]
    fn history_respects_limit() {
        let (_dir, ing) = ingestor();
        for i in 0..4 {
            ing.ingest_at(&format!("{i}.csv"), VALID, at(i)).unwrap();
        }
        let h = ing.history(2).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].dataset_name, "3.csv");
        assert!(h[0].uploaded_at > h[1].uploaded_at);
        assert_eq!(ing.history(DEFAULT_HISTORY_LIMIT).unwrap().len(), 4);
    }

    #[test]
    fn history_entry_json() {
        let (_dir, ing) = ingestor();
        ing.ingest_at("plant.csv", VALID, at(0)).unwrap();
        let json = serde_json::to_value(&ing.history(5).unwrap()[0]).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["dataset_name"], "plant.csv");
        assert_eq!(json["uploaded_at"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn delete_removes_record_and_blob() {
        let (_dir, ing) = ingestor();
        ing.ingest("plant.csv", VALID).unwrap();
        let rec = ing.records().unwrap().remove(0);
        assert!(ing.delete(rec.id).unwrap());
        assert!(ing.get(rec.id).unwrap().is_none());
        assert!(ing.blobs().list().unwrap().is_empty());
        assert!(!ing.delete(rec.id).unwrap());
    }

    /// Record store whose inserts always fail.
    struct FailingInsert(JsonRecordStore);

    /// Record store that cannot be enumerated, so retention passes fail.
    struct FailingList(JsonRecordStore);

    fn disk_full() -> StoreError {
        StoreError::io("failed to write records.json", std::io::Error::other("disk full"))
    }

    impl RecordStore for FailingInsert {
        fn insert(&self, _: BlobHandle, _: String, _: DateTime<Utc>) -> StoreResult<DatasetRecord> {
            Err(disk_full())
        }
        fn get(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
            self.0.get(id)
        }
        fn list_newest_first(&self) -> StoreResult<Vec<DatasetRecord>> {
            self.0.list_newest_first()
        }
        fn delete(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
            self.0.delete(id)
        }
    }

    impl RecordStore for FailingList {
        fn insert(
            &self,
            handle: BlobHandle,
            content_hash: String,
            uploaded_at: DateTime<Utc>,
        ) -> StoreResult<DatasetRecord> {
            self.0.insert(handle, content_hash, uploaded_at)
        }
        fn get(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
            self.0.get(id)
        }
        fn list_newest_first(&self) -> StoreResult<Vec<DatasetRecord>> {
            Err(disk_full())
        }
        fn delete(&self, id: u64) -> StoreResult<Option<DatasetRecord>> {
            self.0.delete(id)
        }
    }

    #[test]
    fn insert_failure_removes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let ing = Ingestor::new(
            FsBlobStore::new(dir.path()).unwrap(),
            FailingInsert(JsonRecordStore::new(dir.path()).unwrap()),
            RetentionManager::default(),
        );

        let err = ing.ingest("plant.csv", VALID).unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert!(!err.is_client_error());
        assert!(ing.blobs().list().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(ing.blobs().dir()).unwrap().count(), 0);
    }

    #[test]
    fn retention_failure_does_not_fail_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let ing = Ingestor::new(
            FsBlobStore::new(dir.path()).unwrap(),
            FailingList(JsonRecordStore::new(dir.path()).unwrap()),
            RetentionManager::new(1),
        );

        let payload = ing.ingest_at("a.csv", VALID, at(0)).unwrap();
        assert_eq!(payload.total_equipment_count, 3);
        ing.ingest_at("b.csv", VALID, at(1)).unwrap();

        // Nothing evicted: both datasets and their bytes remain
        assert!(ing.get(1).unwrap().is_some());
        assert!(ing.get(2).unwrap().is_some());
        assert_eq!(ing.blobs().list().unwrap().len(), 2);
    }

    #[test]
    fn verify_and_sweep() {
        let (_dir, ing) = ingestor();
        ing.ingest("plant.csv", VALID).unwrap();
        ing.blobs().put("stray.csv", b"stray").unwrap();

        assert!(ing.verify().unwrap().iter().all(|r| r.ok));
        assert_eq!(ing.orphans().unwrap(), vec!["stray.csv"]);
        assert_eq!(ing.sweep().unwrap(), vec!["stray.csv"]);
        assert!(ing.orphans().unwrap().is_empty());
        assert_eq!(ing.records().unwrap().len(), 1);
    }
}
