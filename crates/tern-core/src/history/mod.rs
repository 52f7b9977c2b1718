//! Schema history ledger contract.
//!
//! The ledger is the single source of truth for what has been applied. It is
//! appended to by migrate, rewritten by repair, and only read by the
//! classifier. Implementations live next to their storage (see `tern-db`);
//! [`InMemorySchemaHistory`] backs engine tests.

mod memory;

pub use memory::InMemorySchemaHistory;

use crate::applied::{AppliedMigration, AppliedMigrationEntry};
use crate::error::CoreResult;
use crate::migration_type::MigrationType;
use crate::resolved::ResolvedMigration;
use crate::retry::RetryPolicy;
use crate::version::MigrationVersion;

/// Longest description stored in the ledger.
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// Longest script name stored in the ledger.
pub const MAX_SCRIPT_LEN: usize = 1000;

/// Description of the schema-creation marker row.
pub const SCHEMA_MARKER_DESCRIPTION: &str = "<< Tern Schema Creation >>";

/// Durable, lockable ledger of applied migrations.
///
/// All mutations must be visible to subsequent reads from this or any other
/// process. `installed_rank` values are assigned by the ledger, strictly
/// increase in insertion order, and are never reused.
pub trait SchemaHistory {
    /// Name of the ledger table, used in messages.
    fn table(&self) -> &str;

    /// Whether the physical ledger has been created.
    fn exists(&self) -> CoreResult<bool>;

    /// Create the physical ledger. No-op if it already exists.
    fn create(&self) -> CoreResult<()>;

    /// All rows ordered by `installed_rank` ascending.
    fn all_applied_migrations(&self) -> CoreResult<Vec<AppliedMigration>>;

    /// Append a row with the next rank.
    fn add_applied_migration(&self, entry: AppliedMigrationEntry) -> CoreResult<AppliedMigration>;

    /// Rewrite description, type and checksum of `applied` to match `resolved`,
    /// keeping its rank and version.
    fn update(
        &self,
        applied: &AppliedMigration,
        resolved: &ResolvedMigration,
    ) -> CoreResult<AppliedMigration>;

    /// Remove the row with `applied.installed_rank`.
    fn delete(&self, applied: &AppliedMigration) -> CoreResult<()>;

    /// Run `body` while holding the ledger-wide lock, acquiring it under
    /// `policy`. The lock is released whether or not `body` succeeds.
    fn lock<T, F>(&self, policy: &RetryPolicy, body: F) -> CoreResult<T>
    where
        F: FnOnce() -> CoreResult<T>;

    fn baseline_marker(&self) -> CoreResult<Option<AppliedMigration>> {
        Ok(self
            .all_applied_migrations()?
            .into_iter()
            .find(|m| m.migration_type == MigrationType::Baseline))
    }

    fn has_baseline_marker(&self) -> CoreResult<bool> {
        Ok(self.baseline_marker()?.is_some())
    }

    fn has_schemas_marker(&self) -> CoreResult<bool> {
        Ok(self
            .all_applied_migrations()?
            .iter()
            .any(|m| m.migration_type == MigrationType::Schema))
    }

    fn has_non_synthetic_applied_migrations(&self) -> CoreResult<bool> {
        Ok(self
            .all_applied_migrations()?
            .iter()
            .any(|m| !m.is_synthetic()))
    }

    /// Record that the schema already corresponds to `version`.
    fn add_baseline_marker(
        &self,
        version: &MigrationVersion,
        description: &str,
        installed_by: &str,
    ) -> CoreResult<AppliedMigration> {
        self.add_applied_migration(AppliedMigrationEntry {
            version: Some(version.clone()),
            description: description.to_string(),
            migration_type: MigrationType::Baseline,
            script: description.to_string(),
            checksum: None,
            installed_by: installed_by.to_string(),
            execution_time_ms: 0,
            success: true,
        })
    }

    /// Record that the engine created `schemas`.
    fn add_schemas_marker(
        &self,
        schemas: &[String],
        installed_by: &str,
    ) -> CoreResult<AppliedMigration> {
        self.add_applied_migration(AppliedMigrationEntry {
            version: None,
            description: SCHEMA_MARKER_DESCRIPTION.to_string(),
            migration_type: MigrationType::Schema,
            script: schemas.join(","),
            checksum: None,
            installed_by: installed_by.to_string(),
            execution_time_ms: 0,
            success: true,
        })
    }
}

/// Truncate a description to the ledger's column width, marking the cut
/// with `...`.
pub fn abbreviate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_LEN {
        return description.to_string();
    }
    let head: String = description.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
    format!("{head}...")
}

/// Shorten a script name to the ledger's column width, keeping the end
/// (which carries the file name).
pub fn abbreviate_script(script: &str) -> String {
    let len = script.chars().count();
    if len <= MAX_SCRIPT_LEN {
        return script.to_string();
    }
    let tail: String = script.chars().skip(len - (MAX_SCRIPT_LEN - 3)).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_unchanged() {
        assert_eq!(abbreviate_description("add users"), "add users");
    }

    #[test]
    fn long_description_truncated_with_ellipsis() {
        let long = "x".repeat(250);
        let short = abbreviate_description(&long);
        assert_eq!(short.chars().count(), MAX_DESCRIPTION_LEN);
        assert!(short.ends_with("..."));
        assert_eq!(abbreviate_description(&short), short);
    }

    #[test]
    fn long_script_keeps_file_name() {
        let script = format!("{}/V1__init.sql", "dir".repeat(400));
        let short = abbreviate_script(&script);
        assert_eq!(short.chars().count(), MAX_SCRIPT_LEN);
        assert!(short.starts_with("..."));
        assert!(short.ends_with("V1__init.sql"));
    }
}
