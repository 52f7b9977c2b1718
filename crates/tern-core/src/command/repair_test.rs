use super::*;
use crate::error::CoreError;
use crate::history::InMemorySchemaHistory;
use crate::state::MigrationState;
use crate::test_utils::{
    applied_row, baseline_row, failing, repeatable, test_config, versioned, FakeConnection,
};

fn ranks(history: &InMemorySchemaHistory) -> Vec<i32> {
    history
        .all_applied_migrations()
        .unwrap()
        .iter()
        .map(|r| r.installed_rank)
        .collect()
}

#[test]
fn removes_failed_rows_and_unblocks_migrate() {
    let history = InMemorySchemaHistory::new("hist");
    let conn = FakeConnection::non_transactional();
    let config = test_config();
    let broken = vec![versioned("1", "init", "SELECT 1"), failing("2", "broken")];
    assert!(Engine::new(&history, &conn, &broken, &config).migrate().is_err());

    let fixed = vec![versioned("1", "init", "SELECT 1"), versioned("2", "broken", "SELECT 2")];
    let engine = Engine::new(&history, &conn, &fixed, &config);
    let result = engine.repair(RepairOptions::default()).unwrap();

    assert_eq!(result.removed_failed.len(), 1);
    assert_eq!(result.removed_failed[0].installed_rank, 2);
    assert!(result.warnings[0].contains("manual cleanup"));
    assert_eq!(ranks(&history), vec![1]);

    let migrated = engine.migrate().unwrap();
    assert_eq!(migrated.migrations_executed, 1);
    assert_eq!(migrated.migrations[0].installed_rank, 3);
}

#[test]
fn deletes_missing_and_future_rows() {
    let migrations = vec![versioned("1", "one", "SELECT 1"), versioned("3", "three", "SELECT 3")];
    let removed = versioned("2", "removed", "SELECT 2");
    let future = versioned("4", "future", "SELECT 4");
    let history = InMemorySchemaHistory::with_rows(
        "hist",
        vec![
            applied_row(1, &migrations[0], true),
            applied_row(2, &removed, true),
            applied_row(3, &migrations[1], true),
            applied_row(4, &future, true),
        ],
    );
    let conn = FakeConnection::transactional();

    let result = Engine::new(&history, &conn, &migrations, &test_config())
        .repair(RepairOptions::default())
        .unwrap();

    let deleted: Vec<i32> = result.deleted_missing.iter().map(|r| r.installed_rank).collect();
    assert_eq!(deleted, vec![2, 4]);
    assert_eq!(ranks(&history), vec![1, 3]);
}

#[test]
fn deletes_every_run_of_a_removed_repeatable() {
    let old = repeatable("views", "SELECT 1");
    let new = repeatable("views", "SELECT 2");
    let history = InMemorySchemaHistory::with_rows(
        "hist",
        vec![applied_row(1, &old, true), applied_row(2, &new, true)],
    );
    let conn = FakeConnection::transactional();
    let config = test_config();
    let engine = Engine::new(&history, &conn, &[], &config);

    let result = engine.repair(RepairOptions::default()).unwrap();
    assert_eq!(result.deleted_missing.len(), 2);
    assert!(history.all_applied_migrations().unwrap().is_empty());
}

#[test]
fn aligns_checksum_description_and_type() {
    let migrations = vec![versioned("1", "create users", "CREATE TABLE users (id INT)")];
    let mut row = applied_row(1, &migrations[0], true);
    row.checksum = Some(1);
    row.description = "create user".to_string();
    let history = InMemorySchemaHistory::with_rows("hist", vec![row]);
    let conn = FakeConnection::transactional();
    let config = test_config();
    let engine = Engine::new(&history, &conn, &migrations, &config);

    let result = engine.repair(RepairOptions::default()).unwrap();

    assert_eq!(result.aligned.len(), 1);
    assert_eq!(result.aligned[0].description, "create user");
    let aligned = &history.all_applied_migrations().unwrap()[0];
    assert_eq!(aligned.installed_rank, 1);
    assert_eq!(aligned.checksum, migrations[0].checksum);
    assert_eq!(aligned.description, "create users");
    assert!(engine.validate().unwrap().valid);
    assert!(conn.log().is_empty());
}

#[test]
fn repair_is_idempotent() {
    let migrations = vec![versioned("1", "one", "SELECT 1"), versioned("3", "three", "SELECT 3")];
    let removed = versioned("2", "removed", "SELECT 2");
    let mut drifted = applied_row(3, &migrations[1], true);
    drifted.checksum = Some(7);
    let history = InMemorySchemaHistory::with_rows(
        "hist",
        vec![
            baseline_row(1, "0.5"),
            applied_row(2, &migrations[0], true),
            applied_row(3, &removed, false),
            applied_row(4, &removed, true),
            drifted,
        ],
    );
    let conn = FakeConnection::transactional();
    let config = test_config();
    let engine = Engine::new(&history, &conn, &migrations, &config);

    let first = engine.repair(RepairOptions::default()).unwrap();
    assert!(first.actions_taken() > 0);

    let second = engine.repair(RepairOptions::default()).unwrap();
    assert_eq!(second.actions_taken(), 0);
    assert!(history.has_baseline_marker().unwrap());
}

#[test]
fn options_select_actions() {
    let migrations = vec![versioned("1", "one", "SELECT 1")];
    let mut drifted = applied_row(1, &migrations[0], true);
    drifted.checksum = Some(7);
    let missing = versioned("0.5", "gone", "SELECT 0");
    let history = InMemorySchemaHistory::with_rows(
        "hist",
        vec![applied_row(1, &missing, true), {
            drifted.installed_rank = 2;
            drifted
        }],
    );
    let conn = FakeConnection::transactional();
    let config = test_config();
    let engine = Engine::new(&history, &conn, &migrations, &config);

    let result = engine
        .repair(RepairOptions {
            remove_failed: false,
            delete_missing: false,
            align: true,
        })
        .unwrap();

    assert_eq!(result.aligned.len(), 1);
    assert!(result.deleted_missing.is_empty());
    assert_eq!(ranks(&history), vec![1, 2]);

    let infos = engine.info().unwrap();
    assert_eq!(infos.migrations[0].state, MigrationState::MissingSuccess);
}

#[test]
fn absent_history_is_left_alone() {
    let history = InMemorySchemaHistory::new("hist");
    let conn = FakeConnection::transactional();
    let result = Engine::new(&history, &conn, &[], &test_config())
        .repair(RepairOptions::default())
        .unwrap();

    assert_eq!(result.actions_taken(), 0);
    assert_eq!(result.warnings.len(), 1);
    assert!(!history.exists().unwrap());
}

#[test]
fn repair_fails_when_lock_is_held() {
    let migration = versioned("1", "one", "SELECT 1");
    let history = InMemorySchemaHistory::with_rows("hist", vec![applied_row(1, &migration, false)]);
    history.hold_lock();
    let conn = FakeConnection::transactional();

    let err = Engine::new(&history, &conn, &[migration], &test_config())
        .repair(RepairOptions::default())
        .unwrap_err();

    assert!(matches!(err, CoreError::LockTimeout { .. }));
    assert_eq!(ranks(&history), vec![1]);
}
