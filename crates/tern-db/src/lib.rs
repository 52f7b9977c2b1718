//! tern-db - DuckDB backend for Tern
//!
//! Provides the transactional [`tern_core::Connection`] that migration bodies
//! run against and the [`tern_core::SchemaHistory`] ledger stored in the same
//! database.

pub mod duckdb;
pub mod error;
pub mod history;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use history::DuckDbSchemaHistory;
