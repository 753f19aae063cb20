//! Errors for persistence operations.

use gatehouse_state::StateError;
use thiserror::Error;

/// Errors raised while reading or writing engine state.
#[derive(Debug, Error)]
pub enum DbError {
    /// A SQL statement failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No pooled connection was available.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value that does not decode.
    #[error("corrupt row in {table}: {detail}")]
    Corrupt {
        /// The table holding the row.
        table: &'static str,
        /// What failed to decode.
        detail: String,
    },

    /// The restored stores violate a cross-store invariant.
    #[error("restored state is inconsistent: {0}")]
    Inconsistent(#[from] StateError),
}

impl DbError {
    pub(crate) fn corrupt(table: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            table,
            detail: detail.to_string(),
        }
    }
}
