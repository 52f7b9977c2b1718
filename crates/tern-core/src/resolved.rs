//! Migration candidates supplied by discovery.

use crate::checksum::compute_checksum;
use crate::error::CoreResult;
use crate::executor::{
    Connection, MigrationExecutor, ProgramMigrationExecutor, SqlMigrationExecutor,
};
use crate::migration_type::MigrationType;
use crate::version::MigrationVersion;
use std::fmt;
use std::sync::Arc;

/// A migration ready to execute, prior to being recorded as applied.
///
/// `version == None` marks a repeatable migration, identified by its
/// description instead.
#[derive(Clone)]
pub struct ResolvedMigration {
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i32>,
    pub executor: Arc<dyn MigrationExecutor>,
}

impl ResolvedMigration {
    pub fn new(
        version: Option<MigrationVersion>,
        description: impl Into<String>,
        migration_type: MigrationType,
        script: impl Into<String>,
        checksum: Option<i32>,
        executor: Arc<dyn MigrationExecutor>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            migration_type,
            script: script.into(),
            checksum,
            executor,
        }
    }

    /// Versioned (`Some(version)`) or repeatable (`None`) SQL migration with
    /// its checksum computed from `sql`.
    pub fn sql(
        version: Option<&str>,
        description: &str,
        script: &str,
        sql: &str,
    ) -> CoreResult<Self> {
        let version = version.map(MigrationVersion::parse_concrete).transpose()?;
        Ok(Self::new(
            version,
            description,
            MigrationType::Sql,
            script,
            Some(compute_checksum(sql)),
            Arc::new(SqlMigrationExecutor::new(sql)),
        ))
    }

    /// Versioned SQL script that creates the full schema at `version`.
    pub fn sql_baseline(
        version: &str,
        description: &str,
        script: &str,
        sql: &str,
    ) -> CoreResult<Self> {
        let mut migration = Self::sql(Some(version), description, script, sql)?;
        migration.migration_type = MigrationType::SqlBaseline;
        Ok(migration)
    }

    /// Migration implemented as a closure. Programs carry no checksum unless
    /// one is supplied.
    pub fn program<F>(
        version: Option<&str>,
        description: &str,
        script: &str,
        checksum: Option<i32>,
        body: F,
    ) -> CoreResult<Self>
    where
        F: Fn(&dyn Connection) -> CoreResult<()> + Send + Sync + 'static,
    {
        let version = version.map(MigrationVersion::parse_concrete).transpose()?;
        Ok(Self::new(
            version,
            description,
            MigrationType::Program,
            script,
            checksum,
            Arc::new(ProgramMigrationExecutor::new(body)),
        ))
    }

    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    pub fn checksum_matches(&self, checksum: Option<i32>) -> bool {
        self.checksum == checksum
    }

    /// Short label for messages: the version and description, or the
    /// description for repeatables.
    pub fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{} ({})", version, self.description),
            None => self.description.clone(),
        }
    }
}

impl fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("migration_type", &self.migration_type)
            .field("script", &self.script)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}
