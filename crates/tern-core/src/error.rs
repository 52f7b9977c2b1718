//! Error types for tern-core

use thiserror::Error;

/// Core error type for Tern
#[derive(Error, Debug)]
pub enum CoreError {
    /// T001: Configuration file not found
    #[error("[T001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// T002: Failed to parse configuration file
    #[error("[T002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// T003: Invalid configuration value or contradictory policy
    #[error("[T003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// T004: Version string could not be parsed
    #[error("[T004] Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// T005: Ledger lock not acquired within the retry budget
    #[error("[T005] Unable to obtain lock on schema history table '{table}' after {attempts} attempts")]
    LockTimeout { table: String, attempts: u32 },

    /// T006: A failed migration is already recorded in the ledger
    #[error("[T006] Schema history contains failed migration {migration}: {message}")]
    FailedMigration { migration: String, message: String },

    /// T007: A migration body failed while executing
    #[error("[T007] Migration {migration} failed: {message}")]
    MigrationExecution {
        migration: String,
        message: String,
        /// Whether a `success = false` row was written to the ledger
        failure_recorded: bool,
    },

    /// T008: Ledger storage read or write failed
    #[error("[T008] Schema history persistence failed: {0}")]
    Persistence(String),

    /// T009: Validation found problems
    #[error("[T009] Validate failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// T010: Baseline request conflicts with the current ledger
    #[error("[T010] Unable to baseline: {message}")]
    Baseline { message: String },

    /// T011: A statement failed on the underlying connection
    #[error("[T011] Statement failed: {0}")]
    Statement(String),

    /// T012: IO error with file path context
    #[error("[T012] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },
}

impl CoreError {
    /// True for errors raised before any ledger mutation because the
    /// configuration or inputs are unusable.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CoreError::ConfigNotFound { .. }
                | CoreError::ConfigParseError { .. }
                | CoreError::ConfigInvalid { .. }
                | CoreError::InvalidVersion { .. }
        )
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
