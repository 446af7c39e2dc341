pub mod datasets;
pub mod history;
pub mod ingest;
