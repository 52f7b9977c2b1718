//! Execution contracts between the engine and the database driver layer.
//!
//! The engine never talks to a driver directly. It runs migration bodies
//! through a [`MigrationExecutor`] against a [`Connection`], and asks the
//! connection whether DDL is transactional on this engine.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Transactional execution primitive supplied by the driver layer.
pub trait Connection {
    /// Execute one or more statements.
    fn execute_batch(&self, sql: &str) -> CoreResult<()>;

    /// Start a transaction.
    fn begin(&self) -> CoreResult<()>;

    /// Commit the open transaction.
    fn commit(&self) -> CoreResult<()>;

    /// Roll back the open transaction.
    fn rollback(&self) -> CoreResult<()>;

    /// Whether DDL statements roll back together with the transaction.
    fn supports_atomic_ddl(&self) -> bool;

    /// Engine name for reporting (e.g. "duckdb").
    fn db_type(&self) -> &'static str;
}

/// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
/// error.
pub fn with_transaction<T, F>(conn: &dyn Connection, body: F) -> CoreResult<T>
where
    F: FnOnce(&dyn Connection) -> CoreResult<T>,
{
    conn.begin()?;

    let result = body(conn);

    match &result {
        Ok(_) => {
            if let Err(commit_err) = conn.commit() {
                let _ = conn.rollback();
                return Err(CoreError::Statement(format!("COMMIT failed: {commit_err}")));
            }
        }
        Err(_) => {
            if let Err(rollback_err) = conn.rollback() {
                log::warn!("ROLLBACK failed: {rollback_err}");
            }
        }
    }
    result
}

/// An executable migration body.
pub trait MigrationExecutor: Send + Sync {
    /// Run the migration against `conn`.
    fn execute(&self, conn: &dyn Connection) -> CoreResult<()>;

    /// Whether the body may run inside a transaction.
    fn can_execute_in_transaction(&self) -> bool {
        true
    }
}

/// Runs a SQL script as a single batch.
#[derive(Debug, Clone)]
pub struct SqlMigrationExecutor {
    sql: String,
    in_transaction: bool,
}

impl SqlMigrationExecutor {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            in_transaction: true,
        }
    }

    /// Mark the script as unable to run inside a transaction
    /// (e.g. it contains statements the engine forbids in one).
    pub fn non_transactional(mut self) -> Self {
        self.in_transaction = false;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl MigrationExecutor for SqlMigrationExecutor {
    fn execute(&self, conn: &dyn Connection) -> CoreResult<()> {
        conn.execute_batch(&self.sql)
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.in_transaction
    }
}

type ProgramBody = Box<dyn Fn(&dyn Connection) -> CoreResult<()> + Send + Sync>;

/// Runs a migration implemented as a closure.
pub struct ProgramMigrationExecutor {
    body: ProgramBody,
    in_transaction: bool,
}

impl ProgramMigrationExecutor {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&dyn Connection) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            body: Box::new(body),
            in_transaction: true,
        }
    }

    pub fn non_transactional(mut self) -> Self {
        self.in_transaction = false;
        self
    }
}

impl fmt::Debug for ProgramMigrationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramMigrationExecutor")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl MigrationExecutor for ProgramMigrationExecutor {
    fn execute(&self, conn: &dyn Connection) -> CoreResult<()> {
        (self.body)(conn)
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
