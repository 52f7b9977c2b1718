//! The migrate loop: lock, classify, apply one migration, record, repeat.

use super::Engine;
use crate::applied::{AppliedMigration, AppliedMigrationEntry};
use crate::error::{CoreError, CoreResult};
use crate::executor::with_transaction;
use crate::history::SchemaHistory;
use crate::info::MigrationInfoService;
use crate::migration_type::MigrationType;
use crate::pattern::is_future_ignored;
use crate::resolved::ResolvedMigration;
use crate::state::MigrationState;
use crate::validate::validate_infos;
use crate::version::MigrationVersion;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

/// How a migrate call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrateStatus {
    /// At least one migration applied and nothing is left pending
    Completed,
    /// Nothing was pending
    UpToDate,
    /// Stopped at `batch_size` with migrations still pending
    BatchLimitReached,
    /// Stopped at an iteration boundary because cancellation was requested
    Cancelled,
}

/// One migration applied by this call.
#[derive(Debug, Clone, Serialize)]
pub struct MigrateOutput {
    pub category: &'static str,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub execution_time_ms: i32,
    pub out_of_order: bool,
    pub installed_rank: i32,
}

/// Summary of a migrate call.
#[derive(Debug, Clone, Serialize)]
pub struct MigrateResult {
    pub schema_history_table: String,
    pub database_type: String,
    /// Highest applied version before this call
    pub initial_schema_version: Option<MigrationVersion>,
    /// Highest version applied by this call
    pub target_schema_version: Option<MigrationVersion>,
    pub migrations: Vec<MigrateOutput>,
    pub migrations_executed: usize,
    pub total_execution_time_ms: i64,
    pub warnings: Vec<String>,
    pub status: MigrateStatus,
    pub success: bool,
}

impl MigrateResult {
    fn new(table: &str, database_type: &str) -> Self {
        Self {
            schema_history_table: table.to_string(),
            database_type: database_type.to_string(),
            initial_schema_version: None,
            target_schema_version: None,
            migrations: Vec::new(),
            migrations_executed: 0,
            total_execution_time_ms: 0,
            warnings: Vec::new(),
            status: MigrateStatus::UpToDate,
            success: false,
        }
    }

    fn record(&mut self, migration: &ResolvedMigration, row: &AppliedMigration, out_of_order: bool) {
        if let Some(version) = &migration.version {
            if self.target_schema_version.as_ref().map_or(true, |t| version > t) {
                self.target_schema_version = Some(version.clone());
            }
        }
        self.migrations.push(MigrateOutput {
            category: if migration.is_repeatable() {
                "Repeatable"
            } else {
                "Versioned"
            },
            version: migration.version.clone(),
            description: migration.description.clone(),
            migration_type: migration.migration_type,
            script: migration.script.clone(),
            execution_time_ms: row.execution_time_ms,
            out_of_order,
            installed_rank: row.installed_rank,
        });
        self.migrations_executed += 1;
        self.total_execution_time_ms += i64::from(row.execution_time_ms);
    }
}

/// A fatal migrate failure together with what was applied before it.
#[derive(Debug, Error)]
#[error("{source} ({} migration(s) applied before the failure)", .result.migrations_executed)]
pub struct MigrateError {
    pub result: Box<MigrateResult>,
    #[source]
    pub source: CoreError,
}

impl MigrateError {
    /// True when the call failed before changing anything.
    pub fn nothing_changed(&self) -> bool {
        self.result.migrations_executed == 0
            && !matches!(
                self.source,
                CoreError::MigrationExecution {
                    failure_recorded: true,
                    ..
                }
            )
    }
}

enum Step {
    Applied,
    Done(MigrateStatus),
}

struct Run {
    first: bool,
    executed: HashSet<(Option<MigrationVersion>, String)>,
    installed_by: String,
}

impl<H: SchemaHistory> Engine<'_, H> {
    /// Apply every pending migration up to the configured target.
    ///
    /// The ledger lock is taken for each classify-apply-record step and
    /// released between steps.
    pub fn migrate(&self) -> Result<MigrateResult, MigrateError> {
        let mut result = MigrateResult::new(self.history.table(), self.connection.db_type());
        match self.run_migrate(&mut result) {
            Ok(()) => {
                result.success = true;
                Ok(result)
            }
            Err(source) => Err(MigrateError {
                result: Box::new(result),
                source,
            }),
        }
    }

    fn run_migrate(&self, result: &mut MigrateResult) -> CoreResult<()> {
        let policy = self.config.lock.retry_policy();
        let mut run = Run {
            first: true,
            executed: HashSet::new(),
            installed_by: self.config.effective_installed_by(),
        };

        loop {
            let step = self
                .history
                .lock(&policy, || self.migrate_step(result, &mut run))?;
            match step {
                Step::Applied if self.config.target == MigrationVersion::Next => {
                    result.status = MigrateStatus::Completed;
                    break;
                }
                Step::Applied => {}
                Step::Done(status) => {
                    result.status = status;
                    break;
                }
            }
        }

        match result.status {
            MigrateStatus::UpToDate => self.observer.on_info(&format!(
                "Schema history {} is up to date. No migration necessary.",
                self.history.table()
            )),
            _ => self.observer.on_info(&format!(
                "Successfully applied {} migration(s) to {} (execution time {}ms)",
                result.migrations_executed,
                self.history.table(),
                result.total_execution_time_ms
            )),
        }
        Ok(())
    }

    fn migrate_step(&self, result: &mut MigrateResult, run: &mut Run) -> CoreResult<Step> {
        if run.first {
            self.prepare_history(&run.installed_by)?;
        }

        let applied = self.history.all_applied_migrations()?;
        let service = MigrationInfoService::classify(self.migrations, &applied, self.config)?;

        if run.first {
            self.inspect(&service, result)?;
        }
        self.check_failures(&service, result, run.first)?;
        run.first = false;

        let next = service
            .all()
            .iter()
            .filter(|i| i.state == MigrationState::Pending)
            .find_map(|i| i.resolved.as_ref());
        let Some(migration) = next else {
            return Ok(Step::Done(if result.migrations_executed == 0 {
                MigrateStatus::UpToDate
            } else {
                MigrateStatus::Completed
            }));
        };

        if self
            .config
            .batch_size
            .is_some_and(|limit| result.migrations_executed >= limit)
        {
            return Ok(Step::Done(MigrateStatus::BatchLimitReached));
        }
        if self.is_cancelled() {
            self.observer.on_info("Migration cancelled before the next migration");
            return Ok(Step::Done(MigrateStatus::Cancelled));
        }

        let key = (migration.version.clone(), migration.description.clone());
        if run.executed.contains(&key) {
            return Err(CoreError::Persistence(format!(
                "migration {} was applied but is not recorded in {}",
                migration.label(),
                self.history.table()
            )));
        }

        let current = service.current().and_then(|i| i.version().cloned());
        let out_of_order = matches!(
            (&migration.version, &current),
            (Some(version), Some(current)) if version < current
        );

        self.apply(migration, out_of_order, &run.installed_by, result)?;
        run.executed.insert(key);
        Ok(Step::Applied)
    }

    /// Create the ledger if needed and baseline an empty one when configured.
    fn prepare_history(&self, installed_by: &str) -> CoreResult<()> {
        if !self.history.exists()? {
            self.history.create()?;
        }
        if self.config.baseline_on_migrate && self.history.all_applied_migrations()?.is_empty() {
            let version = &self.config.baseline_version;
            self.history.add_baseline_marker(
                version,
                &self.config.baseline_description,
                installed_by,
            )?;
            self.observer.on_info(&format!(
                "Successfully baselined schema history {} with version {version}",
                self.history.table()
            ));
        }
        Ok(())
    }

    /// First-step checks: record the starting version and report anomalies.
    fn inspect(&self, service: &MigrationInfoService, result: &mut MigrateResult) -> CoreResult<()> {
        result.initial_schema_version = service.current().and_then(|i| i.version().cloned());
        match &result.initial_schema_version {
            Some(version) => self
                .observer
                .on_info(&format!("Current version of schema history: {version}")),
            None => self.observer.on_info("Schema history is empty"),
        }

        if self.config.out_of_order {
            self.warn(
                &mut result.warnings,
                "out_of_order mode is active. Migration of schema may not be reproducible."
                    .to_string(),
            );
        }

        for info in service.future() {
            if let Some(version) = info.version() {
                self.warn(
                    &mut result.warnings,
                    format!(
                        "Schema history {} has version {version} which is newer than the latest \
                         available migration ({})",
                        self.history.table(),
                        service.last_resolved()
                    ),
                );
            }
        }

        let missing: Vec<String> = service.missing().iter().map(|i| i.label()).collect();
        if !missing.is_empty() {
            let message = format!(
                "Detected applied migrations not resolved locally: {}",
                missing.join(", ")
            );
            if self.config.abort_on_missing {
                return Err(CoreError::Validation {
                    errors: vec![message],
                });
            }
            self.warn(&mut result.warnings, message);
        }

        if self.config.validate_on_migrate {
            let validation = validate_infos(service.all(), self.config, true);
            if !validation.valid {
                return Err(CoreError::Validation {
                    errors: validation.error_messages(),
                });
            }
        }
        Ok(())
    }

    fn check_failures(
        &self,
        service: &MigrationInfoService,
        result: &mut MigrateResult,
        report_tolerated: bool,
    ) -> CoreResult<()> {
        let future_ignored = is_future_ignored(&self.config.ignore_migration_patterns);
        for info in service.failed() {
            if future_ignored && info.state == MigrationState::FutureFailed {
                if report_tolerated {
                    self.warn(
                        &mut result.warnings,
                        format!(
                            "Schema history {} contains a failed future migration {}",
                            self.history.table(),
                            info.label()
                        ),
                    );
                }
                continue;
            }
            return Err(CoreError::FailedMigration {
                migration: info.label(),
                message: "remove any half-completed changes then run repair".to_string(),
            });
        }
        Ok(())
    }

    /// Execute one migration and record the outcome.
    fn apply(
        &self,
        migration: &ResolvedMigration,
        out_of_order: bool,
        installed_by: &str,
        result: &mut MigrateResult,
    ) -> CoreResult<()> {
        self.observer.on_migration_start(migration, out_of_order);

        let in_transaction =
            migration.executor.can_execute_in_transaction() && self.connection.supports_atomic_ddl();
        let started = Instant::now();
        let mut body_finished = false;
        let record = |success: bool| {
            self.history.add_applied_migration(AppliedMigrationEntry::from_resolved(
                migration,
                installed_by,
                elapsed_ms(started),
                success,
            ))
        };

        let outcome = if in_transaction {
            // The ledger row joins the migration's transaction when the
            // ledger shares the connection.
            with_transaction(self.connection, |conn| {
                migration.executor.execute(conn)?;
                body_finished = true;
                record(true)
            })
        } else {
            migration.executor.execute(self.connection).and_then(|()| {
                body_finished = true;
                record(true)
            })
        };

        match outcome {
            Ok(row) => {
                self.observer
                    .on_migration_success(migration, row.execution_time_ms);
                result.record(migration, &row, out_of_order);
                Ok(())
            }
            Err(err) if body_finished => Err(err),
            Err(err) => {
                self.observer.on_migration_failure(migration, &err);
                let failure_recorded = !in_transaction;
                if failure_recorded {
                    record(false)?;
                }
                Err(CoreError::MigrationExecution {
                    migration: migration.label(),
                    message: err.to_string(),
                    failure_recorded,
                })
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> i32 {
    i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX)
}

#[cfg(test)]
#[path = "migrate_test.rs"]
mod tests;
