//! equipstat-core: Equipment telemetry ingestion
//!
//! Parses uploaded CSV files, checks them for the required telemetry
//! columns, computes summary statistics, and keeps a bounded window of
//! recent uploads through `equipstat-store`.

pub mod error;
pub mod ingest;
pub mod logging;
pub mod stats;
pub mod table;
pub mod validate;

// Re-exports for convenience
pub use error::IngestError;
pub use ingest::{DEFAULT_HISTORY_LIMIT, HistoryEntry, Ingestor};
pub use logging::init_logging;
pub use stats::{StatisticsPayload, TypeDistribution};
pub use table::Table;
pub use validate::{Columns, REQUIRED_COLUMNS, validate};

pub use equipstat_store::{DEFAULT_KEEP, DatasetRecord, RetentionManager, VerifyResult};
