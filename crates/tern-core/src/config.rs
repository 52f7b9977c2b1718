//! Configuration types and parsing for tern.yml

use crate::error::{CoreError, CoreResult};
use crate::pattern::{IgnorePattern, MigrationPattern};
use crate::retry::{Backoff, RetryPolicy};
use crate::serde_helpers::default_true;
use crate::version::MigrationVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration from tern.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Schema history table, optionally schema-qualified (`schema.table`)
    #[serde(default = "default_table")]
    pub table: String,

    /// Highest version to migrate to: a dotted version, `latest`, `current` or `next`
    #[serde(default = "default_target")]
    pub target: MigrationVersion,

    /// Allow applying migrations with a version lower than the highest applied one
    #[serde(default)]
    pub out_of_order: bool,

    /// Restrict operations to these versions / repeatable descriptions
    #[serde(default)]
    pub cherry_pick: Option<Vec<MigrationPattern>>,

    /// `type:state` patterns tolerated by validate (and by migrate for failed future rows)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_migration_patterns: Vec<IgnorePattern>,

    /// Version recorded by the baseline marker
    #[serde(default = "default_baseline_version")]
    pub baseline_version: MigrationVersion,

    /// Description recorded by the baseline marker
    #[serde(default = "default_baseline_description")]
    pub baseline_description: String,

    /// Record a baseline marker when migrating against an empty history
    #[serde(default)]
    pub baseline_on_migrate: bool,

    /// Fail when a concrete target matches no migration
    #[serde(default = "default_true")]
    pub fail_on_missing_target: bool,

    /// Abort migrate when applied migrations can no longer be resolved
    #[serde(default)]
    pub abort_on_missing: bool,

    /// Run validate (with pending migrations allowed) before migrating
    #[serde(default)]
    pub validate_on_migrate: bool,

    /// Maximum migrations applied per migrate call
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// User recorded in the ledger; defaults to `$USER`
    #[serde(default)]
    pub installed_by: Option<String>,

    /// Ledger lock acquisition
    #[serde(default)]
    pub lock: LockConfig,
}

/// Ledger lock retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_lock_retry_count")]
    pub retry_count: u32,

    #[serde(default)]
    pub backoff: Backoff,

    /// Delay before the first retry
    #[serde(default = "default_lock_interval_ms")]
    pub interval_ms: u64,

    /// Growth factor for exponential backoff
    #[serde(default = "default_lock_multiplier")]
    pub multiplier: f64,

    /// Ceiling for exponential backoff
    #[serde(default = "default_lock_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Lock rows older than this are treated as abandoned
    #[serde(default = "default_stale_timeout_mins")]
    pub stale_timeout_mins: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_count: default_lock_retry_count(),
            backoff: Backoff::default(),
            interval_ms: default_lock_interval_ms(),
            multiplier: default_lock_multiplier(),
            max_interval_ms: default_lock_max_interval_ms(),
            stale_timeout_mins: default_stale_timeout_mins(),
        }
    }
}

impl LockConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let interval = Duration::from_millis(self.interval_ms);
        match self.backoff {
            Backoff::Fixed => RetryPolicy::fixed(self.retry_count, interval),
            Backoff::Exponential => RetryPolicy::exponential(
                self.retry_count,
                interval,
                self.multiplier,
                Duration::from_millis(self.max_interval_ms),
            ),
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_mins * 60)
    }
}

const DEFAULT_TABLE: &str = "tern_schema_history";

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_target() -> MigrationVersion {
    MigrationVersion::Latest
}

fn default_ignore_patterns() -> Vec<IgnorePattern> {
    match "*:future".parse() {
        Ok(pattern) => vec![pattern],
        Err(_) => Vec::new(),
    }
}

fn default_baseline_version() -> MigrationVersion {
    MigrationVersion::from_parts(&[1])
}

fn default_baseline_description() -> String {
    "<< Tern Baseline >>".to_string()
}

fn default_lock_retry_count() -> u32 {
    50
}

fn default_lock_interval_ms() -> u64 {
    1000
}

fn default_lock_multiplier() -> f64 {
    2.0
}

fn default_lock_max_interval_ms() -> u64 {
    30_000
}

fn default_stale_timeout_mins() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table: default_table(),
            target: default_target(),
            out_of_order: false,
            cherry_pick: None,
            ignore_migration_patterns: default_ignore_patterns(),
            baseline_version: default_baseline_version(),
            baseline_description: default_baseline_description(),
            baseline_on_migrate: false,
            fail_on_missing_target: true,
            abort_on_missing: false,
            validate_on_migrate: false,
            batch_size: None,
            installed_by: None,
            lock: LockConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from `tern.yml` or `tern.yaml` in a directory
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("tern.yml");
        let yaml_path = dir.join("tern.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Parse and validate YAML configuration text
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// User recorded in new ledger rows
    pub fn effective_installed_by(&self) -> String {
        self.installed_by
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|user| !user.is_empty())
            .unwrap_or_else(|| "tern".to_string())
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if !is_valid_table_name(&self.table) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "Schema history table '{}' must be an identifier, optionally schema-qualified",
                    self.table
                ),
            });
        }

        if matches!(self.target, MigrationVersion::Empty) {
            return Err(CoreError::ConfigInvalid {
                message: "target cannot be the empty schema version".to_string(),
            });
        }

        if !self.baseline_version.is_concrete() {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "baseline_version must be a concrete version, found '{}'",
                    self.baseline_version
                ),
            });
        }

        if self.baseline_description.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "baseline_description cannot be empty".to_string(),
            });
        }

        if self.batch_size == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "batch_size must be at least 1".to_string(),
            });
        }

        if let Some(cherry_pick) = &self.cherry_pick {
            if cherry_pick.iter().any(|p| p.as_str().trim().is_empty()) {
                return Err(CoreError::ConfigInvalid {
                    message: "cherry_pick entries cannot be empty".to_string(),
                });
            }
        }

        if self.lock.backoff == Backoff::Exponential {
            if self.lock.multiplier < 1.0 {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "lock.multiplier must be at least 1.0, found {}",
                        self.lock.multiplier
                    ),
                });
            }
            if self.lock.max_interval_ms < self.lock.interval_ms {
                return Err(CoreError::ConfigInvalid {
                    message: "lock.max_interval_ms cannot be below lock.interval_ms".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !part.starts_with(|c: char| c.is_ascii_digit())
        })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
