//! Error types for tern-db

use tern_core::CoreError;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Ledger row could not be decoded (D004)
    #[error("[D004] Invalid schema history row: {0}")]
    InvalidRow(String),

    /// Primary key or unique constraint violated (D005)
    #[error("[D005] Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants, so classify by
        // message.
        let msg = err.to_string();
        if msg.contains("Constraint Error") || msg.contains("Duplicate key") {
            DbError::ConstraintViolation(msg)
        } else if msg.contains("Table with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        CoreError::Persistence(err.to_string())
    }
}
