//! Error type for blob and record storage

use std::path::PathBuf;

/// Failure of the underlying byte store or record index.
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem operation failed; `context` says which one.
    Io {
        context: String,
        source: std::io::Error,
    },
    /// Record index exists but cannot be decoded.
    Corrupt { path: PathBuf, message: String },
    /// Handle does not name a blob inside the store.
    InvalidHandle(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Corrupt { path, message } => {
                write!(f, "corrupt record index {}: {message}", path.display())
            }
            Self::InvalidHandle(h) => write!(f, "invalid blob handle: {h}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the error is a missing file rather than a real fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
