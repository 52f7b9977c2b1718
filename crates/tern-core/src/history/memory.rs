//! In-process ledger.

use super::{abbreviate_description, abbreviate_script, SchemaHistory};
use crate::applied::{AppliedMigration, AppliedMigrationEntry};
use crate::error::{CoreError, CoreResult};
use crate::resolved::ResolvedMigration;
use crate::retry::RetryPolicy;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct State {
    exists: bool,
    rows: Vec<AppliedMigration>,
    next_rank: i32,
    lock_owner: Option<u64>,
    fail_writes: bool,
}

/// [`SchemaHistory`] held in memory.
///
/// Shares the durable ledger's semantics (monotonic ranks, exclusive lock)
/// so the engine can be exercised without a database. `hold_lock` and
/// `set_fail_writes` simulate a concurrent holder and storage faults.
#[derive(Debug)]
pub struct InMemorySchemaHistory {
    table: String,
    state: Mutex<State>,
}

impl InMemorySchemaHistory {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            state: Mutex::new(State {
                next_rank: 1,
                ..State::default()
            }),
        }
    }

    /// Ledger that already exists and contains `rows`.
    pub fn with_rows(table: &str, rows: Vec<AppliedMigration>) -> Self {
        let history = Self::new(table);
        {
            let mut state = history.state_unpoisoned();
            state.exists = true;
            state.next_rank = rows.iter().map(|r| r.installed_rank).max().unwrap_or(0) + 1;
            state.rows = rows;
            state.rows.sort_by_key(|r| r.installed_rank);
        }
        history
    }

    /// Mark the lock as held by someone else until [`Self::release_lock`].
    pub fn hold_lock(&self) {
        self.state_unpoisoned().lock_owner = Some(0);
    }

    pub fn release_lock(&self) {
        self.state_unpoisoned().lock_owner = None;
    }

    pub fn is_locked(&self) -> bool {
        self.state_unpoisoned().lock_owner.is_some()
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state_unpoisoned().fail_writes = fail;
    }

    fn state(&self) -> CoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| CoreError::Persistence(format!("ledger mutex poisoned: {e}")))
    }

    fn state_unpoisoned(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writable(&self) -> CoreResult<MutexGuard<'_, State>> {
        let state = self.state()?;
        if state.fail_writes {
            return Err(CoreError::Persistence(format!(
                "write to {} rejected",
                self.table
            )));
        }
        if !state.exists {
            return Err(CoreError::Persistence(format!(
                "schema history table {} does not exist",
                self.table
            )));
        }
        Ok(state)
    }
}

impl SchemaHistory for InMemorySchemaHistory {
    fn table(&self) -> &str {
        &self.table
    }

    fn exists(&self) -> CoreResult<bool> {
        Ok(self.state()?.exists)
    }

    fn create(&self) -> CoreResult<()> {
        let mut state = self.state()?;
        if state.exists {
            return Ok(());
        }
        if state.fail_writes {
            return Err(CoreError::Persistence(format!(
                "cannot create {}",
                self.table
            )));
        }
        log::info!("Creating schema history table {}", self.table);
        state.exists = true;
        Ok(())
    }

    fn all_applied_migrations(&self) -> CoreResult<Vec<AppliedMigration>> {
        let state = self.state()?;
        Ok(state.rows.clone())
    }

    fn add_applied_migration(&self, entry: AppliedMigrationEntry) -> CoreResult<AppliedMigration> {
        let mut state = self.writable()?;
        let row = AppliedMigration {
            installed_rank: state.next_rank,
            version: entry.version,
            description: abbreviate_description(&entry.description),
            migration_type: entry.migration_type,
            script: abbreviate_script(&entry.script),
            checksum: entry.checksum,
            installed_by: entry.installed_by,
            installed_on: Utc::now(),
            execution_time_ms: entry.execution_time_ms,
            success: entry.success,
        };
        state.next_rank += 1;
        state.rows.push(row.clone());
        Ok(row)
    }

    fn update(
        &self,
        applied: &AppliedMigration,
        resolved: &ResolvedMigration,
    ) -> CoreResult<AppliedMigration> {
        let mut state = self.writable()?;
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.installed_rank == applied.installed_rank)
            .ok_or_else(|| {
                CoreError::Persistence(format!(
                    "no row with installed_rank {} in {}",
                    applied.installed_rank, self.table
                ))
            })?;
        row.description = abbreviate_description(&resolved.description);
        row.migration_type = resolved.migration_type;
        row.checksum = resolved.checksum;
        Ok(row.clone())
    }

    fn delete(&self, applied: &AppliedMigration) -> CoreResult<()> {
        let mut state = self.writable()?;
        state
            .rows
            .retain(|r| r.installed_rank != applied.installed_rank);
        Ok(())
    }

    fn lock<T, F>(&self, policy: &RetryPolicy, body: F) -> CoreResult<T>
    where
        F: FnOnce() -> CoreResult<T>,
    {
        let owner = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        policy.acquire(&self.table, || {
            let mut state = self.state()?;
            if state.lock_owner.is_some() {
                return Ok(false);
            }
            state.lock_owner = Some(owner);
            Ok(true)
        })?;

        let result = body();

        let mut state = self.state_unpoisoned();
        if state.lock_owner == Some(owner) {
            state.lock_owner = None;
        }
        result
    }
}
