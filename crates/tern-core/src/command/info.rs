//! Classification dump for reporting layers.

use super::Engine;
use crate::error::CoreResult;
use crate::history::SchemaHistory;
use crate::info::MigrationInfo;
use crate::migration_type::MigrationType;
use crate::state::MigrationState;
use crate::version::MigrationVersion;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the info report.
#[derive(Debug, Clone, Serialize)]
pub struct InfoOutput {
    pub category: &'static str,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: Option<MigrationType>,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_rank: Option<i32>,
    pub installed_on: Option<DateTime<Utc>>,
    pub installed_by: Option<String>,
    pub execution_time_ms: Option<i32>,
    pub state: MigrationState,
}

impl From<&MigrationInfo> for InfoOutput {
    fn from(info: &MigrationInfo) -> Self {
        Self {
            category: info.category(),
            version: info.version().cloned(),
            description: info.description().to_string(),
            migration_type: info.migration_type(),
            script: info.script().to_string(),
            checksum: info.checksum(),
            installed_rank: info.installed_rank(),
            installed_on: info.installed_on(),
            installed_by: info.applied.as_ref().map(|a| a.installed_by.clone()),
            execution_time_ms: info.applied.as_ref().map(|a| a.execution_time_ms),
            state: info.state,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub schema_history_table: String,
    pub schema_version: Option<MigrationVersion>,
    pub migrations: Vec<InfoOutput>,
    pub pending_count: usize,
    pub failed_count: usize,
}

impl<H: SchemaHistory> Engine<'_, H> {
    /// Classify without taking the lock or touching the ledger.
    pub fn info(&self) -> CoreResult<InfoResult> {
        let service = self.classify()?;
        Ok(InfoResult {
            schema_history_table: self.history.table().to_string(),
            schema_version: service.current().and_then(|i| i.version().cloned()),
            migrations: service.all().iter().map(InfoOutput::from).collect(),
            pending_count: service.pending().len(),
            failed_count: service.failed().len(),
        })
    }
}
