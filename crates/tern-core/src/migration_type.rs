//! The closed set of migration kinds tracked in the ledger.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a resolved or applied migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// Synthetic marker recording that the engine created the schema
    Schema,
    /// Synthetic marker for a pre-existing, unmanaged schema state
    Baseline,
    /// SQL script
    Sql,
    /// Versioned SQL script that brings an empty database to its version in one step
    SqlBaseline,
    /// Migration implemented in code
    Program,
}

impl MigrationType {
    /// Ledger representation of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationType::Schema => "SCHEMA",
            MigrationType::Baseline => "BASELINE",
            MigrationType::Sql => "SQL",
            MigrationType::SqlBaseline => "SQL_BASELINE",
            MigrationType::Program => "PROGRAM",
        }
    }

    /// Synthetic rows are written by the engine itself and never executed.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, MigrationType::Schema | MigrationType::Baseline)
    }

    /// Baseline marker or baseline migration.
    pub fn is_baseline(&self) -> bool {
        matches!(self, MigrationType::Baseline | MigrationType::SqlBaseline)
    }

    /// A baseline migration is executable, unlike the baseline marker.
    pub fn is_baseline_migration(&self) -> bool {
        matches!(self, MigrationType::SqlBaseline)
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEMA" => Ok(MigrationType::Schema),
            "BASELINE" => Ok(MigrationType::Baseline),
            "SQL" => Ok(MigrationType::Sql),
            "SQL_BASELINE" => Ok(MigrationType::SqlBaseline),
            "PROGRAM" => Ok(MigrationType::Program),
            other => Err(CoreError::Persistence(format!(
                "Unknown migration type '{other}' in schema history"
            ))),
        }
    }
}
