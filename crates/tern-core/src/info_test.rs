use super::*;
use crate::applied::AppliedMigration;
use crate::test_utils::{applied_row, baseline_row, repeatable, test_config, versioned};

// ── Helpers ────────────────────────────────────────────────────────────

fn v(s: &str) -> MigrationVersion {
    MigrationVersion::parse(s).unwrap()
}

fn migrations(versions: &[&str]) -> Vec<ResolvedMigration> {
    versions
        .iter()
        .map(|ver| versioned(ver, &format!("step {ver}"), &format!("SELECT {ver};")))
        .collect()
}

/// Rows for `versions`, applied in the given order.
fn applied_in_order(resolved: &[ResolvedMigration], versions: &[&str]) -> Vec<AppliedMigration> {
    versions
        .iter()
        .enumerate()
        .map(|(i, ver)| {
            let migration = resolved
                .iter()
                .find(|m| m.version.as_ref() == Some(&v(ver)))
                .unwrap();
            applied_row(i as i32 + 1, migration, true)
        })
        .collect()
}

fn state_of(infos: &[MigrationInfo], version: &str) -> MigrationState {
    let target = v(version);
    infos
        .iter()
        .find(|i| i.version() == Some(&target) && i.applied.is_none())
        .or_else(|| infos.iter().find(|i| i.version() == Some(&target)))
        .unwrap_or_else(|| panic!("no info for version {version}"))
        .state
}

fn states(infos: &[MigrationInfo]) -> Vec<(String, MigrationState)> {
    infos.iter().map(|i| (i.label(), i.state)).collect()
}

// ── Basic states ───────────────────────────────────────────────────────

#[test]
fn empty_ledger_everything_pending_in_version_order() {
    let mut resolved = migrations(&["2", "1", "1.1"]);
    resolved.push(repeatable("views", "CREATE VIEW v AS SELECT 1;"));
    let infos = classify(&resolved, &[], &test_config()).unwrap();

    let labels: Vec<String> = infos.iter().map(|i| i.label()).collect();
    assert_eq!(labels, vec!["1 (step 1)", "1.1 (step 1.1)", "2 (step 2)", "views"]);
    assert!(infos.iter().all(|i| i.state == MigrationState::Pending));
}

#[test]
fn applied_migrations_are_success() {
    let resolved = migrations(&["1", "2"]);
    let applied = applied_in_order(&resolved, &["1"]);
    let service = MigrationInfoService::classify(&resolved, &applied, &test_config()).unwrap();

    assert_eq!(state_of(service.all(), "1"), MigrationState::Success);
    assert_eq!(state_of(service.all(), "2"), MigrationState::Pending);
    assert_eq!(service.current().unwrap().version(), Some(&v("1")));
    assert_eq!(service.pending().len(), 1);
    assert_eq!(service.applied().len(), 1);
}

#[test]
fn classification_is_deterministic() {
    let mut resolved = migrations(&["1", "2", "3"]);
    resolved.push(repeatable("grants", "GRANT 1;"));
    let applied = applied_in_order(&resolved, &["1", "3"]);
    let config = test_config();

    let first = classify(&resolved, &applied, &config).unwrap();
    let second = classify(&resolved, &applied, &config).unwrap();
    assert_eq!(states(&first), states(&second));
}

#[test]
fn every_identity_classified_once() {
    let mut resolved = migrations(&["1", "2", "3"]);
    resolved.push(repeatable("grants", "GRANT 1;"));
    let applied = applied_in_order(&resolved, &["1", "2"]);
    let infos = classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(infos.len(), 4);
}

#[test]
fn schema_marker_is_success() {
    let marker = AppliedMigration {
        installed_rank: 1,
        version: None,
        description: "<< Tern Schema Creation >>".to_string(),
        migration_type: MigrationType::Schema,
        script: "analytics".to_string(),
        checksum: None,
        installed_by: "tester".to_string(),
        installed_on: Utc::now(),
        execution_time_ms: 0,
        success: true,
    };
    let infos = classify(&[], &[marker], &test_config()).unwrap();
    assert_eq!(infos[0].state, MigrationState::Success);
    assert_eq!(infos[0].category(), "Schema");
    assert!(!infos[0].is_repeatable());
}

// ── Out of order ───────────────────────────────────────────────────────

#[test]
fn lower_unapplied_version_ignored_without_out_of_order() {
    let resolved = migrations(&["1.0", "2.0", "3.0"]);
    let applied = applied_in_order(&resolved, &["1.0", "3.0"]);
    let infos = classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(state_of(&infos, "2.0"), MigrationState::Ignored);
}

#[test]
fn lower_unapplied_version_pending_with_out_of_order() {
    let resolved = migrations(&["1.0", "2.0", "3.0"]);
    let applied = applied_in_order(&resolved, &["1.0", "3.0"]);
    let mut config = test_config();
    config.out_of_order = true;
    let infos = classify(&resolved, &applied, &config).unwrap();
    assert_eq!(state_of(&infos, "2.0"), MigrationState::Pending);
}

#[test]
fn row_applied_after_higher_version_is_out_of_order() {
    let resolved = migrations(&["1.0", "2.0", "3.0"]);
    let applied = applied_in_order(&resolved, &["1.0", "3.0", "2.0"]);
    let service = MigrationInfoService::classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(state_of(service.all(), "2.0"), MigrationState::OutOfOrder);
    assert_eq!(service.out_of_order().len(), 1);
    assert_eq!(state_of(service.all(), "3.0"), MigrationState::Success);
}

// ── Missing / future / failed ──────────────────────────────────────────

#[test]
fn removed_versioned_migration_is_missing() {
    let resolved = migrations(&["1", "2"]);
    let applied = applied_in_order(&resolved, &["1", "2"]);
    let service =
        MigrationInfoService::classify(&resolved[1..], &applied, &test_config()).unwrap();
    assert_eq!(state_of(service.all(), "1"), MigrationState::MissingSuccess);
    assert_eq!(service.missing().len(), 1);
}

#[test]
fn removed_failed_migration_is_missing_failed() {
    let resolved = migrations(&["1", "2"]);
    let mut applied = applied_in_order(&resolved, &["1"]);
    applied[0].success = false;
    let infos = classify(&resolved[1..], &applied, &test_config()).unwrap();
    assert_eq!(state_of(&infos, "1"), MigrationState::MissingFailed);
}

#[test]
fn applied_version_above_resolved_is_future() {
    let resolved = migrations(&["1", "2", "3"]);
    let mut applied = applied_in_order(&resolved, &["1", "2", "3"]);
    let service =
        MigrationInfoService::classify(&resolved[..2], &applied, &test_config()).unwrap();
    assert_eq!(state_of(service.all(), "3"), MigrationState::FutureSuccess);
    assert_eq!(service.future().len(), 1);

    applied[2].success = false;
    let infos = classify(&resolved[..2], &applied, &test_config()).unwrap();
    assert_eq!(state_of(&infos, "3"), MigrationState::FutureFailed);
}

#[test]
fn failed_row_is_failed() {
    let resolved = migrations(&["1", "2"]);
    let mut applied = applied_in_order(&resolved, &["1", "2"]);
    applied[1].success = false;
    let service = MigrationInfoService::classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(state_of(service.all(), "2"), MigrationState::Failed);
    assert_eq!(service.failed().len(), 1);
}

#[test]
fn versioned_checksum_drift_stays_success() {
    let resolved = migrations(&["1"]);
    let mut applied = applied_in_order(&resolved, &["1"]);
    applied[0].checksum = Some(42);
    let infos = classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(state_of(&infos, "1"), MigrationState::Success);
}

// ── Repeatables ────────────────────────────────────────────────────────

#[test]
fn repeatable_with_same_checksum_is_success() {
    let resolved = vec![repeatable("views", "CREATE VIEW a AS SELECT 1;")];
    let applied = vec![applied_row(1, &resolved[0], true)];
    let infos = classify(&resolved, &applied, &test_config()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].state, MigrationState::Success);
}

#[test]
fn changed_repeatable_is_outdated_and_pending() {
    let old = repeatable("views", "CREATE VIEW a AS SELECT 1;");
    let new = repeatable("views", "CREATE VIEW a AS SELECT 2;");
    let applied = vec![applied_row(1, &old, true)];
    let service =
        MigrationInfoService::classify(&[new.clone()], &applied, &test_config()).unwrap();

    let infos = service.all();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].state, MigrationState::Outdated);
    assert_eq!(infos[0].checksum(), old.checksum);
    assert_eq!(infos[1].state, MigrationState::Pending);
    assert_eq!(infos[1].checksum(), new.checksum);
    assert_eq!(service.outdated().len(), 1);
}

#[test]
fn older_repeatable_runs_are_superseded() {
    let old = repeatable("views", "CREATE VIEW a AS SELECT 1;");
    let new = repeatable("views", "CREATE VIEW a AS SELECT 2;");
    let applied = vec![applied_row(1, &old, true), applied_row(2, &new, true)];
    let infos = classify(&[new], &applied, &test_config()).unwrap();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].state, MigrationState::Superseded);
    assert_eq!(infos[1].state, MigrationState::Success);
}

#[test]
fn failed_latest_repeatable_is_failed() {
    let migration = repeatable("views", "CREATE VIEW a AS SELECT 1;");
    let applied = vec![applied_row(1, &migration, false)];
    let infos = classify(&[migration], &applied, &test_config()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].state, MigrationState::Failed);
}

#[test]
fn removed_repeatable_is_missing() {
    let migration = repeatable("views", "CREATE VIEW a AS SELECT 1;");
    let applied = vec![applied_row(1, &migration, true)];
    let infos = classify(&[], &applied, &test_config()).unwrap();
    assert_eq!(infos[0].state, MigrationState::MissingSuccess);
}

// ── Target ─────────────────────────────────────────────────────────────

#[test]
fn versions_above_target_are_above_target() {
    let resolved = migrations(&["1", "2", "3"]);
    let mut config = test_config();
    config.target = v("2");
    let infos = classify(&resolved, &[], &config).unwrap();
    assert_eq!(state_of(&infos, "2"), MigrationState::Pending);
    assert_eq!(state_of(&infos, "3"), MigrationState::AboveTarget);
}

#[test]
fn missing_target_fails_when_configured() {
    let resolved = migrations(&["1", "2"]);
    let mut config = test_config();
    config.target = v("5");
    let err = classify(&resolved, &[], &config).unwrap_err();
    assert!(err.is_configuration_error());

    config.fail_on_missing_target = false;
    assert!(classify(&resolved, &[], &config).is_ok());
}

#[test]
fn current_target_is_last_applied() {
    let resolved = migrations(&["1", "2"]);
    let applied = applied_in_order(&resolved, &["1"]);
    let mut config = test_config();
    config.target = MigrationVersion::Current;
    let service = MigrationInfoService::classify(&resolved, &applied, &config).unwrap();
    assert_eq!(state_of(service.all(), "2"), MigrationState::AboveTarget);
    assert_eq!(service.target(), Some(&v("1")));
}

#[test]
fn next_target_is_lowest_pending() {
    let resolved = migrations(&["1", "2", "3"]);
    let applied = applied_in_order(&resolved, &["1"]);
    let mut config = test_config();
    config.target = MigrationVersion::Next;
    let service = MigrationInfoService::classify(&resolved, &applied, &config).unwrap();
    assert_eq!(service.target(), Some(&v("2")));
    assert_eq!(state_of(service.all(), "2"), MigrationState::Pending);
    assert_eq!(state_of(service.all(), "3"), MigrationState::AboveTarget);
}

#[test]
fn next_target_without_pending_is_unbounded() {
    let resolved = migrations(&["1"]);
    let applied = applied_in_order(&resolved, &["1"]);
    let mut config = test_config();
    config.target = MigrationVersion::Next;
    let service = MigrationInfoService::classify(&resolved, &applied, &config).unwrap();
    assert!(service.target().is_none());
}

// ── Baseline ───────────────────────────────────────────────────────────

#[test]
fn baseline_marker_hides_older_versions() {
    let resolved = migrations(&["1", "2", "3"]);
    let applied = vec![baseline_row(1, "2")];
    let infos = classify(&resolved, &applied, &test_config()).unwrap();

    assert_eq!(infos[0].label(), "1 (step 1)");
    assert_eq!(infos[0].state, MigrationState::BelowBaseline);
    assert_eq!(infos[1].label(), "2 (step 2)");
    assert_eq!(infos[1].state, MigrationState::BaselineIgnored);
    assert_eq!(infos[2].state, MigrationState::Baseline);
    assert_eq!(infos[2].category(), "Baseline");
    assert_eq!(infos[3].label(), "3 (step 3)");
    assert_eq!(infos[3].state, MigrationState::Pending);
}

#[test]
fn target_below_baseline_is_config_error() {
    let resolved = migrations(&["1", "2", "3"]);
    let applied = vec![baseline_row(1, "2")];
    let mut config = test_config();
    config.target = v("1");
    let err = classify(&resolved, &applied, &config).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn baseline_migration_bootstraps_empty_ledger() {
    let mut resolved = migrations(&["1", "2", "3", "4"]);
    resolved.push(
        ResolvedMigration::sql_baseline("3", "full schema", "B3__full_schema.sql", "SELECT 3;")
            .unwrap(),
    );
    let infos = classify(&resolved, &[], &test_config()).unwrap();

    let baseline = infos
        .iter()
        .find(|i| i.migration_type() == Some(MigrationType::SqlBaseline))
        .unwrap();
    assert_eq!(baseline.state, MigrationState::Pending);
    let regular_three = infos
        .iter()
        .find(|i| i.version() == Some(&v("3")) && i.migration_type() == Some(MigrationType::Sql))
        .unwrap();
    assert_eq!(regular_three.state, MigrationState::BelowBaseline);
    assert_eq!(state_of(&infos, "1"), MigrationState::BelowBaseline);
    assert_eq!(state_of(&infos, "4"), MigrationState::Pending);
}

#[test]
fn baseline_migration_ignored_once_history_exists() {
    let mut resolved = migrations(&["1", "2"]);
    resolved.push(
        ResolvedMigration::sql_baseline("2", "full schema", "B2__full_schema.sql", "SELECT 2;")
            .unwrap(),
    );
    let applied = applied_in_order(&resolved, &["1"]);
    let infos = classify(&resolved, &applied, &test_config()).unwrap();
    let baseline = infos
        .iter()
        .find(|i| i.migration_type() == Some(MigrationType::SqlBaseline))
        .unwrap();
    assert_eq!(baseline.state, MigrationState::BaselineIgnored);
    let regular_two = infos
        .iter()
        .find(|i| i.version() == Some(&v("2")) && i.migration_type() == Some(MigrationType::Sql))
        .unwrap();
    assert_eq!(regular_two.state, MigrationState::Pending);
}

// ── Cherry-pick ────────────────────────────────────────────────────────

#[test]
fn cherry_pick_ignores_unlisted_migrations() {
    let mut resolved = migrations(&["1", "2", "3"]);
    resolved.push(repeatable("views", "SELECT 1;"));
    resolved.push(repeatable("grants", "SELECT 2;"));
    let mut config = test_config();
    config.cherry_pick = Some(vec![
        MigrationPattern::new("1"),
        MigrationPattern::new("3"),
        MigrationPattern::new("views"),
    ]);
    let infos = classify(&resolved, &[], &config).unwrap();
    assert_eq!(state_of(&infos, "1"), MigrationState::Pending);
    assert_eq!(state_of(&infos, "2"), MigrationState::Ignored);
    assert_eq!(state_of(&infos, "3"), MigrationState::Pending);
    let grants = infos.iter().find(|i| i.description() == "grants").unwrap();
    assert_eq!(grants.state, MigrationState::Ignored);
    let views = infos.iter().find(|i| i.description() == "views").unwrap();
    assert_eq!(views.state, MigrationState::Pending);
}

#[test]
fn cherry_pick_does_not_bypass_out_of_order_gate() {
    let resolved = migrations(&["1", "2", "3"]);
    let applied = applied_in_order(&resolved, &["1", "3"]);
    let mut config = test_config();
    config.cherry_pick = Some(vec![MigrationPattern::new("2")]);

    let infos = classify(&resolved, &applied, &config).unwrap();
    assert_eq!(state_of(&infos, "2"), MigrationState::Ignored);

    config.out_of_order = true;
    let infos = classify(&resolved, &applied, &config).unwrap();
    assert_eq!(state_of(&infos, "2"), MigrationState::Pending);
}

// ── Input validation ───────────────────────────────────────────────────

#[test]
fn duplicate_versions_rejected() {
    let resolved = vec![
        versioned("1", "first", "SELECT 1;"),
        versioned("1.0", "second", "SELECT 2;"),
    ];
    let err = classify(&resolved, &[], &test_config()).unwrap_err();
    assert!(err.to_string().contains("more than one migration with version"));
}

#[test]
fn duplicate_repeatable_descriptions_rejected() {
    let resolved = vec![repeatable("views", "SELECT 1;"), repeatable("views", "SELECT 2;")];
    assert!(classify(&resolved, &[], &test_config()).is_err());
}

#[test]
fn sentinel_resolved_version_rejected() {
    let mut migration = versioned("1", "first", "SELECT 1;");
    migration.version = Some(MigrationVersion::Latest);
    let err = classify(&[migration], &[], &test_config()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidVersion { .. }));
}
