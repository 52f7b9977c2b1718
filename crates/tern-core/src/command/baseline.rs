//! Baseline an existing schema.

use super::Engine;
use crate::error::{CoreError, CoreResult};
use crate::history::SchemaHistory;
use crate::version::MigrationVersion;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BaselineResult {
    pub schema_history_table: String,
    pub baseline_version: MigrationVersion,
    pub baseline_description: String,
    /// False when an identical marker was already present
    pub created: bool,
}

impl<H: SchemaHistory> Engine<'_, H> {
    /// Record `baseline_version` as the schema's starting point.
    ///
    /// Only valid on a ledger without applied migrations. Repeating the same
    /// baseline is a no-op.
    pub fn baseline(&self) -> CoreResult<BaselineResult> {
        let policy = self.config.lock.retry_policy();
        self.history.lock(&policy, || self.run_baseline())
    }

    fn run_baseline(&self) -> CoreResult<BaselineResult> {
        let version = &self.config.baseline_version;
        let description = &self.config.baseline_description;
        let table = self.history.table();

        if !self.history.exists()? {
            self.history.create()?;
        }

        let mut result = BaselineResult {
            schema_history_table: table.to_string(),
            baseline_version: version.clone(),
            baseline_description: description.clone(),
            created: false,
        };

        if let Some(marker) = self.history.baseline_marker()? {
            if marker.version.as_ref() == Some(version) && &marker.description == description {
                self.observer.on_info(&format!(
                    "Schema history {table} already baselined with version {version}"
                ));
                return Ok(result);
            }
            let existing = marker
                .version
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string);
            return Err(CoreError::Baseline {
                message: format!(
                    "{table} already contains a baseline with version {existing} ({}), \
                     which differs from the requested {version} ({description})",
                    marker.description
                ),
            });
        }

        if self.history.has_non_synthetic_applied_migrations()? {
            return Err(CoreError::Baseline {
                message: format!("{table} already contains applied migrations"),
            });
        }

        self.history
            .add_baseline_marker(version, description, &self.config.effective_installed_by())?;
        self.observer.on_info(&format!(
            "Successfully baselined schema history {table} with version {version}"
        ));
        result.created = true;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "baseline_test.rs"]
mod tests;
