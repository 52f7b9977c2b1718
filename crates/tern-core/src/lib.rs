//! tern-core - Core library for Tern
//!
//! This crate provides the migration model, the state classifier, the
//! schema-history ledger contract, and the migrate/repair/baseline/validate
//! engine. It is independent of any database driver; see `tern-db` for the
//! DuckDB realisation of [`Connection`] and [`SchemaHistory`].

pub mod applied;
pub mod checksum;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod info;
pub mod migration_type;
pub mod observer;
pub mod pattern;
pub mod resolved;
pub mod retry;
pub(crate) mod serde_helpers;
pub mod state;
pub mod validate;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use applied::{AppliedMigration, AppliedMigrationEntry};
pub use checksum::compute_checksum;
pub use command::{
    BaselineResult, Engine, InfoOutput, InfoResult, MigrateError, MigrateOutput, MigrateResult,
    MigrateStatus, RepairOptions, RepairOutput, RepairResult,
};
pub use config::{Config, LockConfig};
pub use error::{CoreError, CoreResult};
pub use executor::{
    with_transaction, Connection, MigrationExecutor, ProgramMigrationExecutor,
    SqlMigrationExecutor,
};
pub use history::{InMemorySchemaHistory, SchemaHistory};
pub use info::{classify, MigrationInfo, MigrationInfoService};
pub use migration_type::MigrationType;
pub use observer::{LogObserver, MigrationObserver, NoopObserver};
pub use pattern::{IgnorePattern, MigrationPattern};
pub use resolved::ResolvedMigration;
pub use retry::{Backoff, RetryPolicy};
pub use state::MigrationState;
pub use validate::{validate_infos, ValidateErrorCode, ValidateResult, ValidationError};
pub use version::MigrationVersion;
