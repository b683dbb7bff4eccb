//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("schema bootstrap error: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("clearing assignments failed after {attempts} attempts: {source}")]
    ClearContention {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Whether the underlying failure is transient lock contention.
    pub fn is_busy(&self) -> bool {
        let source = match self {
            Self::Connection(e) | Self::Schema(e) | Self::Query(e) => e,
            Self::ClearContention { source, .. } => source,
        };
        is_busy(source)
    }
}

/// Transient SQLite lock contention, worth a retry.
pub(crate) fn is_busy(source: &sqlx::Error) -> bool {
    match source {
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}
