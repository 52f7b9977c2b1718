//! Shared test utilities for tern-core and its dependents

use crate::applied::AppliedMigration;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::executor::Connection;
use crate::migration_type::MigrationType;
use crate::observer::MigrationObserver;
use crate::resolved::ResolvedMigration;
use crate::retry::Backoff;
use crate::version::MigrationVersion;
use chrono::Utc;
use std::sync::Mutex;

/// Marker that makes [`FakeConnection`] reject a statement.
pub const FAIL_MARKER: &str = "-- fail";

/// In-memory [`Connection`] that records every statement and transaction
/// boundary it sees.
///
/// Statements containing [`FAIL_MARKER`] fail. Statements executed inside a
/// transaction are only kept in [`FakeConnection::committed`] once committed.
pub struct FakeConnection {
    atomic_ddl: bool,
    log: Mutex<Vec<String>>,
    pending: Mutex<Option<Vec<String>>>,
    committed: Mutex<Vec<String>>,
}

impl FakeConnection {
    /// Connection whose engine rolls DDL back with the transaction.
    pub fn transactional() -> Self {
        Self::new(true)
    }

    /// Connection whose engine auto-commits DDL.
    pub fn non_transactional() -> Self {
        Self::new(false)
    }

    fn new(atomic_ddl: bool) -> Self {
        Self {
            atomic_ddl,
            log: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            committed: Mutex::new(Vec::new()),
        }
    }

    /// Everything seen, including BEGIN/COMMIT/ROLLBACK.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Statements that took effect.
    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }
}

impl Connection for FakeConnection {
    fn execute_batch(&self, sql: &str) -> CoreResult<()> {
        self.log.lock().unwrap().push(sql.to_string());
        if sql.contains(FAIL_MARKER) {
            return Err(CoreError::Statement(format!("simulated failure: {sql}")));
        }
        match self.pending.lock().unwrap().as_mut() {
            Some(pending) => pending.push(sql.to_string()),
            None => self.committed.lock().unwrap().push(sql.to_string()),
        }
        Ok(())
    }

    fn begin(&self) -> CoreResult<()> {
        self.log.lock().unwrap().push("BEGIN".to_string());
        *self.pending.lock().unwrap() = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        self.log.lock().unwrap().push("COMMIT".to_string());
        if let Some(pending) = self.pending.lock().unwrap().take() {
            self.committed.lock().unwrap().extend(pending);
        }
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        self.log.lock().unwrap().push("ROLLBACK".to_string());
        self.pending.lock().unwrap().take();
        Ok(())
    }

    fn supports_atomic_ddl(&self) -> bool {
        self.atomic_ddl
    }

    fn db_type(&self) -> &'static str {
        "fake"
    }
}

/// Observer that records every callback as a line of text.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl MigrationObserver for RecordingObserver {
    fn on_migration_start(&self, migration: &ResolvedMigration, out_of_order: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {} out_of_order={out_of_order}", migration.label()));
    }

    fn on_migration_success(&self, migration: &ResolvedMigration, _execution_time_ms: i32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("success {}", migration.label()));
    }

    fn on_migration_failure(&self, migration: &ResolvedMigration, _error: &CoreError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failure {}", migration.label()));
    }

    fn on_warning(&self, message: &str) {
        self.events.lock().unwrap().push(format!("warn {message}"));
    }
}

/// Versioned SQL migration whose script name follows the usual convention.
pub fn versioned(version: &str, description: &str, sql: &str) -> ResolvedMigration {
    let script = format!("V{version}__{}.sql", description.replace(' ', "_"));
    ResolvedMigration::sql(Some(version), description, &script, sql).unwrap()
}

/// Versioned SQL migration that fails when executed on a [`FakeConnection`].
pub fn failing(version: &str, description: &str) -> ResolvedMigration {
    versioned(version, description, &format!("SELECT 1; {FAIL_MARKER}"))
}

/// Repeatable SQL migration.
pub fn repeatable(description: &str, sql: &str) -> ResolvedMigration {
    let script = format!("R__{}.sql", description.replace(' ', "_"));
    ResolvedMigration::sql(None, description, &script, sql).unwrap()
}

/// Default configuration with lock retries that never sleep.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.installed_by = Some("tester".to_string());
    config.lock.retry_count = 3;
    config.lock.backoff = Backoff::Fixed;
    config.lock.interval_ms = 0;
    config
}

/// Ledger row recording an execution of `migration` at `rank`.
pub fn applied_row(rank: i32, migration: &ResolvedMigration, success: bool) -> AppliedMigration {
    AppliedMigration {
        installed_rank: rank,
        version: migration.version.clone(),
        description: migration.description.clone(),
        migration_type: migration.migration_type,
        script: migration.script.clone(),
        checksum: migration.checksum,
        installed_by: "tester".to_string(),
        installed_on: Utc::now(),
        execution_time_ms: 1,
        success,
    }
}

/// Baseline marker row at `rank`.
pub fn baseline_row(rank: i32, version: &str) -> AppliedMigration {
    AppliedMigration {
        installed_rank: rank,
        version: Some(MigrationVersion::parse(version).unwrap()),
        description: "<< Tern Baseline >>".to_string(),
        migration_type: MigrationType::Baseline,
        script: "<< Tern Baseline >>".to_string(),
        checksum: None,
        installed_by: "tester".to_string(),
        installed_on: Utc::now(),
        execution_time_ms: 0,
        success: true,
    }
}
