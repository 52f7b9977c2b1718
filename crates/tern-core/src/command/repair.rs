//! Ledger repair: remove failed rows, delete missing rows, realign metadata.
//!
//! Repair only rewrites the ledger. It never executes migration bodies and
//! never undoes the effects of a failed migration on the schema.

use super::Engine;
use crate::applied::AppliedMigration;
use crate::error::CoreResult;
use crate::history::{abbreviate_description, SchemaHistory};
use crate::migration_type::MigrationType;
use crate::resolved::ResolvedMigration;
use crate::state::MigrationState;
use crate::version::MigrationVersion;
use serde::{Deserialize, Serialize};

/// Which repair actions to run. All are enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOptions {
    pub remove_failed: bool,
    pub delete_missing: bool,
    pub align: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            remove_failed: true,
            delete_missing: true,
            align: true,
        }
    }
}

/// A ledger row touched by repair, as it was before the change.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutput {
    pub installed_rank: i32,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
}

impl From<&AppliedMigration> for RepairOutput {
    fn from(row: &AppliedMigration) -> Self {
        Self {
            installed_rank: row.installed_rank,
            version: row.version.clone(),
            description: row.description.clone(),
            migration_type: row.migration_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairResult {
    pub schema_history_table: String,
    pub removed_failed: Vec<RepairOutput>,
    pub deleted_missing: Vec<RepairOutput>,
    pub aligned: Vec<RepairOutput>,
    pub warnings: Vec<String>,
}

impl RepairResult {
    pub fn actions_taken(&self) -> usize {
        self.removed_failed.len() + self.deleted_missing.len() + self.aligned.len()
    }
}

impl<H: SchemaHistory> Engine<'_, H> {
    /// Run the enabled repair actions under the ledger lock.
    pub fn repair(&self, options: RepairOptions) -> CoreResult<RepairResult> {
        let mut result = RepairResult {
            schema_history_table: self.history.table().to_string(),
            removed_failed: Vec::new(),
            deleted_missing: Vec::new(),
            aligned: Vec::new(),
            warnings: Vec::new(),
        };

        if !self.history.exists()? {
            self.warn(
                &mut result.warnings,
                format!(
                    "Schema history {} does not exist. Nothing to repair.",
                    self.history.table()
                ),
            );
            return Ok(result);
        }

        let policy = self.config.lock.retry_policy();
        self.history.lock(&policy, || {
            if options.remove_failed {
                self.remove_failed(&mut result)?;
            }
            if options.delete_missing {
                self.delete_missing(&mut result)?;
            }
            if options.align {
                self.align(&mut result)?;
            }
            Ok(())
        })?;

        if result.actions_taken() == 0 {
            self.observer.on_info(&format!(
                "Repair of schema history {} found nothing to change",
                self.history.table()
            ));
        } else {
            self.observer.on_info(&format!(
                "Repaired schema history {}: removed {} failed, deleted {} missing, aligned {}",
                self.history.table(),
                result.removed_failed.len(),
                result.deleted_missing.len(),
                result.aligned.len()
            ));
        }
        Ok(result)
    }

    fn remove_failed(&self, result: &mut RepairResult) -> CoreResult<()> {
        for row in self.history.all_applied_migrations()? {
            if row.success {
                continue;
            }
            log::debug!("Removing failed migration {} from {}", row.label(), self.history.table());
            self.history.delete(&row)?;
            result.removed_failed.push(RepairOutput::from(&row));
        }

        if !result.removed_failed.is_empty() && !self.connection.supports_atomic_ddl() {
            self.warn(
                &mut result.warnings,
                format!(
                    "Removed failed migrations from {}. This {} database cannot roll back DDL, \
                     so manual cleanup of their remaining effects may be required.",
                    self.history.table(),
                    self.connection.db_type()
                ),
            );
        }
        Ok(())
    }

    fn delete_missing(&self, result: &mut RepairResult) -> CoreResult<()> {
        let service = self.classify()?;
        for info in service.all() {
            let Some(row) = &info.applied else {
                continue;
            };
            let orphaned_run = info.state == MigrationState::Superseded && info.resolved.is_none();
            if !(info.state.is_missing() || info.state.is_future() || orphaned_run) {
                continue;
            }
            log::debug!("Deleting missing migration {} from {}", row.label(), self.history.table());
            self.history.delete(row)?;
            result.deleted_missing.push(RepairOutput::from(row));
        }
        Ok(())
    }

    fn align(&self, result: &mut RepairResult) -> CoreResult<()> {
        let service = self.classify()?;
        for info in service.all() {
            let (Some(row), Some(resolved)) = (&info.applied, &info.resolved) else {
                continue;
            };
            if !row.is_versioned()
                || row.is_synthetic()
                || !row.success
                || !needs_alignment(row, resolved)
            {
                continue;
            }
            log::debug!("Aligning {} in {}", row.label(), self.history.table());
            self.history.update(row, resolved)?;
            result.aligned.push(RepairOutput::from(row));
        }
        Ok(())
    }
}

fn needs_alignment(row: &AppliedMigration, resolved: &ResolvedMigration) -> bool {
    row.checksum != resolved.checksum
        || row.migration_type != resolved.migration_type
        || row.description != abbreviate_description(&resolved.description)
}

#[cfg(test)]
#[path = "repair_test.rs"]
mod tests;
