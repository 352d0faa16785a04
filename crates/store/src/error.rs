//! Error type shared by every store operation.

use std::path::PathBuf;

/// Errors produced by the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// None of the candidate database locations could be created or opened.
    #[error("could not create or open a database for writing (tried {tried:?})")]
    NoWritableLocation { tried: Vec<PathBuf> },

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// A stored enum column held a value this version does not understand.
    #[error("unknown {field} value {value:?} in database")]
    UnknownValue { field: &'static str, value: String },

    /// Returned from a transaction body to roll back without reporting a failure.
    #[error("transaction rolled back")]
    Rollback,

    #[error("query worker could not be started: {0}")]
    Worker(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
