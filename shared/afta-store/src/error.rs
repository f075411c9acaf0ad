//! Store Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Row not found")]
    NotFound,
}

impl StoreError {
    /// Whether the error is a UNIQUE constraint violation.
    ///
    /// The ledger's reference column and the orders' idempotency-key column
    /// rely on this to detect duplicate submissions at insert time.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Query(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}
