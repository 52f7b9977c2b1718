//! Observation hooks for engine progress.
//!
//! The engine reports through a [`MigrationObserver`] handle passed in by
//! the caller. Everything it reports is also present in the operation's
//! result, so observers are purely a side channel.

use crate::error::CoreError;
use crate::resolved::ResolvedMigration;

/// Receives engine progress notifications. All methods default to no-ops.
pub trait MigrationObserver {
    fn on_migration_start(&self, _migration: &ResolvedMigration, _out_of_order: bool) {}

    fn on_migration_success(&self, _migration: &ResolvedMigration, _execution_time_ms: i32) {}

    fn on_migration_failure(&self, _migration: &ResolvedMigration, _error: &CoreError) {}

    fn on_warning(&self, _message: &str) {}

    fn on_info(&self, _message: &str) {}
}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MigrationObserver for LogObserver {
    fn on_migration_start(&self, migration: &ResolvedMigration, out_of_order: bool) {
        let suffix = if out_of_order { " [out of order]" } else { "" };
        match &migration.version {
            Some(version) => log::info!(
                "Migrating to version {} - {}{}",
                version,
                migration.description,
                suffix
            ),
            None => log::info!("Migrating with repeatable migration {}", migration.description),
        }
    }

    fn on_migration_success(&self, migration: &ResolvedMigration, execution_time_ms: i32) {
        log::debug!(
            "Successfully applied {} in {}ms",
            migration.script,
            execution_time_ms
        );
    }

    fn on_migration_failure(&self, migration: &ResolvedMigration, error: &CoreError) {
        log::error!("Migration {} failed: {}", migration.script, error);
    }

    fn on_warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn on_info(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Discards all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}
