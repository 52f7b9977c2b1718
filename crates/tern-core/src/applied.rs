//! Ledger rows.

use crate::migration_type::MigrationType;
use crate::resolved::ResolvedMigration;
use crate::version::MigrationVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution attempt recorded in the schema history.
///
/// `installed_rank` is assigned by the ledger on insert and defines the true
/// application order, independent of `version` ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub installed_rank: i32,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time_ms: i32,
    pub success: bool,
}

impl AppliedMigration {
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Repeatable rows have no version and are not synthetic markers.
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none() && !self.migration_type.is_synthetic()
    }

    pub fn is_synthetic(&self) -> bool {
        self.migration_type.is_synthetic()
    }

    /// Short label for messages: the version, or the description for repeatables.
    pub fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{} ({})", version, self.description),
            None => self.description.clone(),
        }
    }
}

/// Row contents handed to the ledger for appending.
///
/// The ledger assigns `installed_rank` and `installed_on`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigrationEntry {
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub execution_time_ms: i32,
    pub success: bool,
}

impl AppliedMigrationEntry {
    /// Entry recording one execution of a resolved migration.
    pub fn from_resolved(
        resolved: &ResolvedMigration,
        installed_by: &str,
        execution_time_ms: i32,
        success: bool,
    ) -> Self {
        Self {
            version: resolved.version.clone(),
            description: resolved.description.clone(),
            migration_type: resolved.migration_type,
            script: resolved.script.clone(),
            checksum: resolved.checksum,
            installed_by: installed_by.to_string(),
            execution_time_ms,
            success,
        }
    }
}
