//! Core error types.

use crate::catalog::ValidationError;
use thiserror::Error;

/// Core errors raised by the catalog and the physical store.
#[derive(Debug, Error)]
pub enum Error {
    /// SQLite error.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A catalog write was rejected before persistence.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Catalog node not found.
    #[error("catalog node {id} not found")]
    NotFound {
        /// The requested node id.
        id: i64,
    },

    /// Invalid data read back from the store.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Convenience alias for core results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
