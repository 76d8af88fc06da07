use linkgraph_extract::ExtractError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the domain identifier store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Identifier store unavailable: {0}")]
    Unavailable(String),

    #[error("Identifier store returned {returned} ids for {requested} domains")]
    BatchMismatch { requested: usize, returned: usize },

    #[error("Identifier store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Identifier store error: {0}")]
    Store(#[from] StoreError),

    #[error("Document error: {0}")]
    Document(#[from] ExtractError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
