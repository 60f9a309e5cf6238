//! Error type shared by the engine and the driver.

use thiserror::Error;

/// Failures raised while reading, folding, encoding or persisting batches.
#[derive(Debug, Error)]
pub enum FoldError {
    /// A value that should have been a document is not a JSON object.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A top-level field uses a name the persisted batch reserves for itself.
    #[error("record field '{field}' collides with a reserved batch key")]
    ReservedField { field: String },

    /// A line-oriented source could not parse one of its lines.
    #[error("malformed record at line {line}: {reason}")]
    MalformedLine { line: u64, reason: String },

    /// A persisted key could not be decoded back to text.
    #[error("codec error on key '{key}': {reason}")]
    Codec { key: String, reason: String },

    /// The sink refused a flushed batch. Batches before `batch` are durable
    /// and cover the first `resume_after` records of the source.
    #[error("failed to persist batch {batch} (resume after {resume_after} records): {reason}")]
    Persist {
        batch: u64,
        resume_after: u64,
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<duckdb::Error> for FoldError {
    fn from(e: duckdb::Error) -> Self {
        FoldError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FoldError>;
