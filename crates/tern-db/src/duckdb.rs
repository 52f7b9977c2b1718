//! DuckDB connection backend

use crate::error::{DbError, DbResult};
use duckdb::Connection;
use std::path::Path;
use std::sync::Mutex;
use tern_core::{CoreError, CoreResult};

/// DuckDB database backend
///
/// Implements [`tern_core::Connection`] for migration bodies and is shared
/// with [`crate::DuckDbSchemaHistory`], so ledger writes made inside a
/// migration's transaction commit or roll back with it.
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    atomic_ddl: bool,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self::from_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            atomic_ddl: true,
        }
    }

    /// Override whether DDL is reported as transactional.
    ///
    /// DuckDB rolls DDL back with the transaction. Turning this off makes the
    /// engine run migrations outside a transaction and record failures.
    pub fn with_atomic_ddl(mut self, atomic_ddl: bool) -> Self {
        self.atomic_ddl = atomic_ddl;
        self
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        f(&conn)
    }

    /// Whether a table or view exists. Unqualified names resolve to `main`.
    pub fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let (schema, table) = split_qualified(name);
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                duckdb::params![schema, table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn schema_exists(&self, schema: &str) -> DbResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
                duckdb::params![schema],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Count the rows returned by `sql`.
    pub fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM ({sql})"), [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn execute_statement(&self, sql: &str) -> CoreResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(DbError::from))
            .map_err(|e| CoreError::Statement(e.to_string()))
    }
}

impl tern_core::Connection for DuckDbBackend {
    fn execute_batch(&self, sql: &str) -> CoreResult<()> {
        self.execute_statement(sql)
    }

    fn begin(&self) -> CoreResult<()> {
        self.execute_statement("BEGIN TRANSACTION")
    }

    fn commit(&self) -> CoreResult<()> {
        self.execute_statement("COMMIT")
    }

    fn rollback(&self) -> CoreResult<()> {
        self.execute_statement("ROLLBACK")
    }

    fn supports_atomic_ddl(&self) -> bool {
        self.atomic_ddl
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Split `schema.table` into its parts, defaulting the schema to `main`.
pub(crate) fn split_qualified(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("main", name),
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
