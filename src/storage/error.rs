//! Storage error types
//!
//! Defines the errors raised by the local reading cache and by record parsing.

use thiserror::Error;

/// Errors that can occur in the reading store
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed (creating the database directory, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite rejected an operation or the database is unavailable
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A retention or query window reaches past the representable time range
    #[error("Time window out of range: {0}")]
    WindowOutOfRange(chrono::Duration),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while turning a raw upstream record into a [`Reading`](super::Reading)
///
/// A parse error only ever drops the offending record; the rest of the batch
/// is still ingested.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("record has no timestamp")]
    MissingTimestamp,

    #[error("record has no value")]
    MissingValue,

    #[error("unrecognised timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("glucose value must be above 0 and at most 50 mmol/L, got {0}")]
    InvalidValue(f64),
}
