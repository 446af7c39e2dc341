//! Integrity checks and orphan cleanup across blobs and records

use std::collections::HashSet;

use serde::Serialize;

use crate::blob::BlobStore;
use crate::error::StoreResult;
use crate::hash;
use crate::records::RecordStore;

/// Verification result for a single dataset.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    pub id: u64,
    pub dataset_name: String,
    pub expected: String,
    pub actual: String,
    pub ok: bool,
}

/// Recompute the content hash of every live dataset.
pub fn verify<B, R>(blobs: &B, records: &R) -> StoreResult<Vec<VerifyResult>>
where
    B: BlobStore + ?Sized,
    R: RecordStore + ?Sized,
{
    let mut results = Vec::new();
    for record in records.list_newest_first()? {
        let path = blobs.path(&record.storage_handle)?;
        let (actual, ok) = if path.exists() {
            match hash::hash_file(&path) {
                Ok(h) => {
                    let hex = h.to_hex().to_string();
                    let ok = hex == record.content_hash;
                    (hex, ok)
                }
                Err(e) => (format!("error: {e}"), false),
            }
        } else {
            ("MISSING".to_string(), false)
        };

        results.push(VerifyResult {
            id: record.id,
            dataset_name: record.dataset_name().to_string(),
            expected: record.content_hash.clone(),
            actual,
            ok,
        });
    }
    Ok(results)
}

/// Blobs that no live record points at.
pub fn orphans<B, R>(blobs: &B, records: &R) -> StoreResult<Vec<String>>
where
    B: BlobStore + ?Sized,
    R: RecordStore + ?Sized,
{
    let referenced: HashSet<_> = records
        .list_newest_first()?
        .into_iter()
        .map(|r| r.storage_handle)
        .collect();
    Ok(blobs
        .list()?
        .into_iter()
        .filter(|h| !referenced.contains(h))
        .map(|h| h.file_name().to_string())
        .collect())
}

/// Remove stale tmp files and unreferenced blobs.
/// Returns the removed file names.
pub fn sweep<B, R>(blobs: &B, records: &R) -> StoreResult<Vec<String>>
where
    B: BlobStore + ?Sized,
    R: RecordStore + ?Sized,
{
    let mut removed = blobs.cleanup_tmp()?;

    let referenced: HashSet<_> = records
        .list_newest_first()?
        .into_iter()
        .map(|r| r.storage_handle)
        .collect();

    for handle in blobs.list()? {
        if referenced.contains(&handle) {
            continue;
        }
        if blobs.delete(&handle)? {
            log::info!("sweep: removed unreferenced {}", handle.file_name());
            removed.push(handle.file_name().to_string());
        }
    }
    Ok(removed)
}
