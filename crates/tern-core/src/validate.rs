//! Validation of classified migrations.
//!
//! Turns classifier states into actionable errors: failed rows, applied
//! migrations that can no longer be resolved, resolved migrations that were
//! skipped, and metadata drift between the ledger and the resolved set.

use crate::config::Config;
use crate::history::abbreviate_description;
use crate::info::MigrationInfo;
use crate::pattern::is_future_ignored;
use crate::state::MigrationState;
use crate::version::MigrationVersion;
use serde::Serialize;

/// Kind of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidateErrorCode {
    FailedVersionedMigration,
    FailedRepeatableMigration,
    AppliedVersionedMigrationNotResolved,
    AppliedRepeatableMigrationNotResolved,
    ResolvedVersionedMigrationNotApplied,
    ResolvedRepeatableMigrationNotApplied,
    OutdatedRepeatableMigration,
    TypeMismatch,
    ChecksumMismatch,
    DescriptionMismatch,
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub code: ValidateErrorCode,
    pub migration: String,
    pub message: String,
}

/// Outcome of validating the full classification.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub valid: bool,
    pub validated_count: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidateResult {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// Validate every info. With `allow_pending`, pending and outdated
/// migrations are not errors (as when validating before a migrate).
pub fn validate_infos(
    infos: &[MigrationInfo],
    config: &Config,
    allow_pending: bool,
) -> ValidateResult {
    let future_ignored = is_future_ignored(&config.ignore_migration_patterns);
    let baseline = infos
        .iter()
        .find(|i| i.state == MigrationState::Baseline)
        .and_then(|i| i.version().cloned());

    let mut errors = Vec::new();
    let mut validated_count = 0;

    for info in infos {
        if info.state.is_applied() && info.resolved.is_some() {
            validated_count += 1;
        }
        if let Some(error) =
            validate_one(info, config, allow_pending, future_ignored, baseline.as_ref())
        {
            errors.push(error);
        }
    }

    ValidateResult {
        valid: errors.is_empty(),
        validated_count,
        errors,
        warnings: Vec::new(),
    }
}

fn validate_one(
    info: &MigrationInfo,
    config: &Config,
    allow_pending: bool,
    future_ignored: bool,
    baseline: Option<&MigrationVersion>,
) -> Option<ValidationError> {
    let state = info.state;
    let label = info.label();
    let error = |code, message: String| {
        Some(ValidationError {
            code,
            migration: label.clone(),
            message,
        })
    };

    if state == MigrationState::AboveTarget {
        return None;
    }

    if config
        .ignore_migration_patterns
        .iter()
        .any(|p| p.matches(info.is_versioned(), state))
    {
        return None;
    }

    if state.is_failed() && !(future_ignored && state == MigrationState::FutureFailed) {
        return match info.version() {
            Some(version) => error(
                ValidateErrorCode::FailedVersionedMigration,
                format!(
                    "Detected failed migration to version {version} ({}). Remove any \
                     half-completed changes then run repair to fix the schema history.",
                    info.description()
                ),
            ),
            None => error(
                ValidateErrorCode::FailedRepeatableMigration,
                format!(
                    "Detected failed repeatable migration: {}. Remove any half-completed \
                     changes then run repair to fix the schema history.",
                    info.description()
                ),
            ),
        };
    }

    if let Some(applied) = &info.applied {
        if info.resolved.is_none()
            && !applied.is_synthetic()
            && state != MigrationState::Superseded
            && !(future_ignored && state.is_future())
        {
            return match &applied.version {
                Some(version) => error(
                    ValidateErrorCode::AppliedVersionedMigrationNotResolved,
                    format!(
                        "Detected applied migration not resolved locally: {version}. If you \
                         removed this migration intentionally, run repair to delete it from \
                         the schema history."
                    ),
                ),
                None => error(
                    ValidateErrorCode::AppliedRepeatableMigrationNotResolved,
                    format!(
                        "Detected applied migration not resolved locally: {}. If you removed \
                         this migration intentionally, run repair to delete it from the \
                         schema history.",
                        applied.description
                    ),
                ),
            };
        }
    }

    if state == MigrationState::Ignored {
        if is_excluded_by_cherry_pick(info, config) {
            return None;
        }
        return match info.version() {
            Some(version) => error(
                ValidateErrorCode::ResolvedVersionedMigrationNotApplied,
                format!(
                    "Detected resolved migration not applied to database: {version}. To allow \
                     executing this migration, set out_of_order: true."
                ),
            ),
            None => error(
                ValidateErrorCode::ResolvedRepeatableMigrationNotApplied,
                format!(
                    "Detected resolved repeatable migration not applied to database: {}.",
                    info.description()
                ),
            ),
        };
    }

    if !allow_pending && state == MigrationState::Pending {
        return match info.version() {
            Some(version) => error(
                ValidateErrorCode::ResolvedVersionedMigrationNotApplied,
                format!(
                    "Detected resolved migration not applied to database: {version}. To fix \
                     this error, run migrate."
                ),
            ),
            None => error(
                ValidateErrorCode::ResolvedRepeatableMigrationNotApplied,
                format!(
                    "Detected resolved repeatable migration not applied to database: {}. To \
                     fix this error, run migrate.",
                    info.description()
                ),
            ),
        };
    }

    if !allow_pending && state == MigrationState::Outdated {
        return error(
            ValidateErrorCode::OutdatedRepeatableMigration,
            format!(
                "Detected outdated resolved repeatable migration that should be re-applied to \
                 database: {}. Run migrate to execute this migration.",
                info.description()
            ),
        );
    }

    let (Some(resolved), Some(applied)) = (&info.resolved, &info.applied) else {
        return None;
    };
    if let (Some(version), Some(baseline)) = (&applied.version, baseline) {
        if version <= baseline {
            return None;
        }
    }

    let identifier = match &applied.version {
        Some(version) => format!("version {version}"),
        None => applied.script.clone(),
    };

    if resolved.migration_type != applied.migration_type {
        return error(
            ValidateErrorCode::TypeMismatch,
            mismatch_message(
                "type",
                &identifier,
                applied.migration_type.as_str(),
                resolved.migration_type.as_str(),
            ),
        );
    }

    let checksum_applies = applied.version.is_some()
        || !matches!(state, MigrationState::Outdated | MigrationState::Superseded);
    if checksum_applies && !resolved.checksum_matches(applied.checksum) {
        return error(
            ValidateErrorCode::ChecksumMismatch,
            mismatch_message(
                "checksum",
                &identifier,
                &format_checksum(applied.checksum),
                &format_checksum(resolved.checksum),
            ),
        );
    }

    if applied.version.is_some()
        && abbreviate_description(&resolved.description) != applied.description
    {
        return error(
            ValidateErrorCode::DescriptionMismatch,
            mismatch_message(
                "description",
                &identifier,
                &applied.description,
                &resolved.description,
            ),
        );
    }

    None
}

fn is_excluded_by_cherry_pick(info: &MigrationInfo, config: &Config) -> bool {
    match (&config.cherry_pick, &info.resolved) {
        (Some(patterns), Some(resolved)) => !patterns
            .iter()
            .any(|p| p.matches(resolved.version.as_ref(), &resolved.description)),
        _ => false,
    }
}

fn format_checksum(checksum: Option<i32>) -> String {
    checksum.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn mismatch_message(what: &str, identifier: &str, applied: &str, resolved: &str) -> String {
    format!(
        "Migration {what} mismatch for migration {identifier}\n-> Applied to database : {applied}\n-> Resolved locally    : {resolved}\nEither revert the changes to the migration, or run repair to update the schema history."
    )
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
