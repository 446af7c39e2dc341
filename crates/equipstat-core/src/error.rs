//! Error type for the ingestion workflow

use equipstat_store::StoreError;

use crate::validate::REQUIRED_COLUMNS;

/// Why an ingestion was rejected.
///
/// `Schema` and `Parse` are caused by the uploaded file and can be fixed
/// by the client; `Storage` is a server-side fault.
#[derive(Debug)]
pub enum IngestError {
    /// Required columns are absent.
    Schema { missing: Vec<String> },
    /// File is not readable as a table, or a numeric column holds a non-number.
    Parse(String),
    /// Blob or record storage failed.
    Storage(StoreError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema { missing } => write!(
                f,
                "Missing columns. Required: {} (missing: {})",
                REQUIRED_COLUMNS.join(", "),
                missing.join(", ")
            ),
            Self::Parse(msg) => write!(f, "Error processing CSV: {msg}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl IngestError {
    /// True for errors the uploader caused (a 400 in HTTP terms).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::Parse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_message_lists_all_required() {
        let err = IngestError::Schema {
            missing: vec!["Pressure".into()],
        };
        let msg = err.to_string();
        for col in REQUIRED_COLUMNS {
            assert!(msg.contains(col), "{col} missing from {msg}");
        }
        assert!(msg.contains("missing: Pressure"));
    }

    #[test]
    fn parse_message_carries_cause() {
        let err = IngestError::Parse("bad value 'abc'".into());
        assert!(err.to_string().contains("bad value 'abc'"));
    }

    #[test]
    fn client_error_classification() {
        assert!(IngestError::Schema { missing: vec![] }.is_client_error());
        assert!(IngestError::Parse("x".into()).is_client_error());
        let storage = IngestError::from(StoreError::io("write", std::io::Error::other("full")));
        assert!(!storage.is_client_error());
        assert!(std::error::Error::source(&storage).is_some());
    }
}
