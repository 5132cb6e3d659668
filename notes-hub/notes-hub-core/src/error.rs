use thiserror::Error;

/// Outcomes of the read-only document layer that callers must handle.
///
/// Neither variant carries filesystem detail, so both are safe to surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("invalid path")]
    PathRejected,

    #[error("not found")]
    NotFound,
}

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unsupported schema: {0}")]
    Schema(String),
}

pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;
