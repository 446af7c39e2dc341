//! equipstat-store: Durable storage for uploaded telemetry datasets
//!
//! Holds the raw uploaded bytes (blobs), the record index that maps
//! dataset ids to blobs and upload times, and the retention policy that
//! keeps only the most recent datasets alive.

pub mod blob;
pub mod error;
pub mod hash;
pub mod maintenance;
pub mod records;
pub mod retention;

pub use blob::{BlobHandle, BlobStore, FsBlobStore};
pub use error::{StoreError, StoreResult};
pub use hash::{hash_bytes, hash_file, short_hash};
pub use maintenance::VerifyResult;
pub use records::{DatasetRecord, JsonRecordStore, RecordStore, sort_newest_first};
pub use retention::{DEFAULT_KEEP, Deletion, RetentionManager, RetentionReport, delete_dataset};
