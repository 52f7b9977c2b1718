//! Schema history ledger stored in a DuckDB table.
//!
//! Ranks come from a sequence so they are never reused after deletes. The
//! ledger-wide lock is a row at [`LOCK_RANK`] whose primary key makes the
//! insert succeed for exactly one holder; its description carries the
//! holder's token and its `installed_on` lets abandoned locks expire. While
//! the lock is held a background thread refreshes `installed_on` every half
//! stale timeout, so a long-running migration never looks abandoned.

use crate::duckdb::{split_qualified, DuckDbBackend};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tern_core::history::{abbreviate_description, abbreviate_script};
use tern_core::{
    AppliedMigration, AppliedMigrationEntry, Config, CoreError, CoreResult, MigrationType,
    MigrationVersion, ResolvedMigration, RetryPolicy, SchemaHistory,
};
use uuid::Uuid;

/// Rank of the lock row. Negative ranks are never returned as applied rows.
pub const LOCK_RANK: i32 = -100;

const LOCK_TYPE: &str = "TERN_LOCK";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const COLUMNS: &str = "installed_rank, version, description, type, script, checksum, \
                       installed_by, epoch_ms(installed_on), execution_time, success";

type RawRow = (
    i32,
    Option<String>,
    String,
    String,
    String,
    Option<i32>,
    String,
    i64,
    i32,
    bool,
);

/// [`SchemaHistory`] backed by a DuckDB table.
pub struct DuckDbSchemaHistory<'a> {
    backend: &'a DuckDbBackend,
    table: String,
    installed_by: String,
    stale_timeout: Duration,
    heartbeat: Duration,
}

impl<'a> DuckDbSchemaHistory<'a> {
    /// Ledger named by `config.table`, expiring locks after the configured
    /// stale timeout.
    pub fn new(backend: &'a DuckDbBackend, config: &Config) -> Self {
        Self {
            backend,
            table: config.table.clone(),
            installed_by: config.effective_installed_by(),
            stale_timeout: config.lock.stale_timeout(),
            heartbeat: config.lock.stale_timeout() / 2,
        }
    }

    /// Expire locks older than `timeout`, refreshing held locks at half that.
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self.heartbeat = timeout / 2;
        self
    }

    fn sequence(&self) -> String {
        format!("{}_rank_seq", self.table)
    }

    /// Token of the current lock holder, if any.
    pub fn lock_owner(&self) -> CoreResult<Option<String>> {
        if !self.exists()? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT description FROM {} WHERE installed_rank = ?",
            self.table
        );
        let owner = self.backend.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows =
                stmt.query_map(duckdb::params![LOCK_RANK], |row| row.get::<_, String>(0))?;
            Ok(rows.next().transpose()?)
        })?;
        Ok(owner)
    }

    fn try_acquire(&self, owner: &str) -> DbResult<bool> {
        self.remove_stale_lock()?;
        let sql = format!(
            "INSERT INTO {} (installed_rank, version, description, type, script, checksum, \
             installed_by, installed_on, execution_time, success) \
             VALUES (?, NULL, ?, ?, '', NULL, ?, CAST(? AS TIMESTAMP), 0, true)",
            self.table
        );
        let inserted = self.backend.with_conn(|conn| {
            conn.execute(
                &sql,
                duckdb::params![
                    LOCK_RANK,
                    owner,
                    LOCK_TYPE,
                    self.installed_by,
                    format_timestamp(&Utc::now())
                ],
            )
            .map_err(DbError::from)
        });
        match inserted {
            Ok(_) => Ok(true),
            Err(DbError::ConstraintViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn remove_stale_lock(&self) -> DbResult<()> {
        let cutoff = chrono::Duration::from_std(self.stale_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout));
        let Some(cutoff) = cutoff else {
            return Ok(());
        };
        let sql = format!(
            "DELETE FROM {} WHERE installed_rank = ? AND installed_on < CAST(? AS TIMESTAMP)",
            self.table
        );
        let removed = self.backend.with_conn(|conn| {
            Ok(conn.execute(&sql, duckdb::params![LOCK_RANK, format_timestamp(&cutoff)])?)
        })?;
        if removed > 0 {
            log::warn!(
                "Removed stale lock on {} older than {}s",
                self.table,
                self.stale_timeout.as_secs()
            );
        }
        Ok(())
    }

    /// Move the lock row's `installed_on` to now. Returns false when `owner`
    /// no longer holds the lock.
    fn refresh(&self, owner: &str) -> DbResult<bool> {
        let sql = format!(
            "UPDATE {} SET installed_on = CAST(? AS TIMESTAMP) \
             WHERE installed_rank = ? AND description = ?",
            self.table
        );
        let changed = self.backend.with_conn(|conn| {
            Ok(conn.execute(
                &sql,
                duckdb::params![format_timestamp(&Utc::now()), LOCK_RANK, owner],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Run `body` while a scoped thread keeps the lock row fresh.
    ///
    /// Refreshes go through the shared connection, so during a migration they
    /// join its open transaction.
    fn with_heartbeat<T, F>(&self, owner: &str, body: F) -> CoreResult<T>
    where
        F: FnOnce() -> CoreResult<T>,
    {
        if self.heartbeat.is_zero() {
            return body();
        }
        let (stop, stopped) = mpsc::channel::<()>();
        std::thread::scope(|s| {
            s.spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(self.heartbeat) {
                    match self.refresh(owner) {
                        Ok(true) => log::trace!("Refreshed lock on {}", self.table),
                        Ok(false) => {
                            log::error!("Lock on {} was taken over (owner {owner})", self.table);
                            break;
                        }
                        Err(e) => log::warn!("Failed to refresh lock on {}: {e}", self.table),
                    }
                }
            });
            let result = body();
            drop(stop);
            result
        })
    }

    fn release(&self, owner: &str) -> DbResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE installed_rank = ? AND description = ?",
            self.table
        );
        let removed = self
            .backend
            .with_conn(|conn| Ok(conn.execute(&sql, duckdb::params![LOCK_RANK, owner])?))?;
        if removed == 0 {
            log::warn!("Lock on {} was already released (owner {owner})", self.table);
        }
        Ok(())
    }
}

impl SchemaHistory for DuckDbSchemaHistory<'_> {
    fn table(&self) -> &str {
        &self.table
    }

    fn exists(&self) -> CoreResult<bool> {
        Ok(self.backend.relation_exists(&self.table)?)
    }

    fn create(&self) -> CoreResult<()> {
        if self.exists()? {
            return Ok(());
        }

        let (schema, _) = split_qualified(&self.table);
        let created_schema = schema != "main" && !self.backend.schema_exists(schema)?;

        log::info!("Creating schema history table {}", self.table);
        let ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE SEQUENCE IF NOT EXISTS {seq} START 1;
             CREATE TABLE IF NOT EXISTS {table} (
                 installed_rank INTEGER PRIMARY KEY,
                 version VARCHAR(50),
                 description VARCHAR(200) NOT NULL,
                 type VARCHAR(20) NOT NULL,
                 script VARCHAR(1000) NOT NULL,
                 checksum INTEGER,
                 installed_by VARCHAR(100) NOT NULL,
                 installed_on TIMESTAMP NOT NULL,
                 execution_time INTEGER NOT NULL,
                 success BOOLEAN NOT NULL
             );",
            seq = self.sequence(),
            table = self.table,
        );
        self.backend
            .with_conn(|conn| conn.execute_batch(&ddl).map_err(DbError::from))?;

        if created_schema {
            self.add_schemas_marker(&[schema.to_string()], &self.installed_by)?;
        }
        Ok(())
    }

    fn all_applied_migrations(&self) -> CoreResult<Vec<AppliedMigration>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE installed_rank >= 0 ORDER BY installed_rank",
            self.table
        );
        let raw: Vec<RawRow> = self.backend.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<RawRow> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })?;
        raw.into_iter()
            .map(|row| decode_row(row).map_err(CoreError::from))
            .collect()
    }

    fn add_applied_migration(&self, entry: AppliedMigrationEntry) -> CoreResult<AppliedMigration> {
        let installed_on = now_millis();
        let description = abbreviate_description(&entry.description);
        let script = abbreviate_script(&entry.script);
        let version = entry.version.as_ref().map(ToString::to_string);
        let sql = format!(
            "INSERT INTO {} (installed_rank, version, description, type, script, checksum, \
             installed_by, installed_on, execution_time, success) \
             VALUES (nextval('{}'), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), ?, ?) \
             RETURNING installed_rank",
            self.table,
            self.sequence()
        );
        let installed_rank: i32 = self.backend.with_conn(|conn| {
            Ok(conn.query_row(
                &sql,
                duckdb::params![
                    version,
                    description,
                    entry.migration_type.as_str(),
                    script,
                    entry.checksum,
                    entry.installed_by,
                    format_timestamp(&installed_on),
                    entry.execution_time_ms,
                    entry.success,
                ],
                |row| row.get(0),
            )?)
        })?;
        log::debug!(
            "Recorded {} in {} at rank {installed_rank}",
            entry.script,
            self.table
        );

        Ok(AppliedMigration {
            installed_rank,
            version: entry.version,
            description,
            migration_type: entry.migration_type,
            script,
            checksum: entry.checksum,
            installed_by: entry.installed_by,
            installed_on,
            execution_time_ms: entry.execution_time_ms,
            success: entry.success,
        })
    }

    fn update(
        &self,
        applied: &AppliedMigration,
        resolved: &ResolvedMigration,
    ) -> CoreResult<AppliedMigration> {
        let description = abbreviate_description(&resolved.description);
        let sql = format!(
            "UPDATE {} SET description = ?, type = ?, checksum = ? WHERE installed_rank = ?",
            self.table
        );
        let changed = self.backend.with_conn(|conn| {
            Ok(conn.execute(
                &sql,
                duckdb::params![
                    description,
                    resolved.migration_type.as_str(),
                    resolved.checksum,
                    applied.installed_rank,
                ],
            )?)
        })?;
        if changed != 1 {
            return Err(CoreError::Persistence(format!(
                "no row with installed_rank {} in {}",
                applied.installed_rank, self.table
            )));
        }
        Ok(AppliedMigration {
            description,
            migration_type: resolved.migration_type,
            checksum: resolved.checksum,
            ..applied.clone()
        })
    }

    fn delete(&self, applied: &AppliedMigration) -> CoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE installed_rank = ?", self.table);
        self.backend.with_conn(|conn| {
            conn.execute(&sql, duckdb::params![applied.installed_rank])?;
            Ok(())
        })?;
        Ok(())
    }

    fn lock<T, F>(&self, policy: &RetryPolicy, body: F) -> CoreResult<T>
    where
        F: FnOnce() -> CoreResult<T>,
    {
        self.create()?;
        let owner = Uuid::new_v4().to_string();
        policy.acquire(&self.table, || Ok(self.try_acquire(&owner)?))?;
        log::debug!("Acquired lock on {} as {owner}", self.table);

        let result = self.with_heartbeat(&owner, body);

        match self.release(&owner) {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e.into()),
            Err(e) => {
                log::warn!("Failed to release lock on {}: {e}", self.table);
                result
            }
        }
    }
}

fn decode_row(row: RawRow) -> DbResult<AppliedMigration> {
    let (rank, version, description, ty, script, checksum, installed_by, millis, time, success) =
        row;
    let version = version
        .map(|v| MigrationVersion::parse_concrete(&v))
        .transpose()
        .map_err(|e| DbError::InvalidRow(format!("rank {rank}: {e}")))?;
    let migration_type = MigrationType::from_str(&ty)
        .map_err(|e| DbError::InvalidRow(format!("rank {rank}: {e}")))?;
    let installed_on = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::InvalidRow(format!("rank {rank}: bad timestamp {millis}")))?;
    Ok(AppliedMigration {
        installed_rank: rank,
        version,
        description,
        migration_type,
        script,
        checksum,
        installed_by,
        installed_on,
        execution_time_ms: time,
        success,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time at the precision stored in the ledger.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
