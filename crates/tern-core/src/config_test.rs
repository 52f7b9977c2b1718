use super::*;
use std::io::Write;

#[test]
fn defaults_from_empty_mapping() {
    let config = Config::from_yaml_str("{}").unwrap();
    assert_eq!(config.table, "tern_schema_history");
    assert_eq!(config.target, MigrationVersion::Latest);
    assert!(!config.out_of_order);
    assert!(config.cherry_pick.is_none());
    assert_eq!(config.ignore_migration_patterns.len(), 1);
    assert_eq!(config.ignore_migration_patterns[0].to_string(), "*:future");
    assert_eq!(config.baseline_version, MigrationVersion::parse("1").unwrap());
    assert_eq!(config.baseline_description, "<< Tern Baseline >>");
    assert!(config.fail_on_missing_target);
    assert!(!config.validate_on_migrate);
    assert_eq!(config.lock.retry_count, 50);
    assert_eq!(config.lock.interval_ms, 1000);
    assert_eq!(config.lock.stale_timeout_mins, 10);
}

#[test]
fn default_impl_matches_yaml_defaults() {
    let from_yaml = Config::from_yaml_str("{}").unwrap();
    let default = Config::default();
    assert_eq!(from_yaml.table, default.table);
    assert_eq!(from_yaml.target, default.target);
    assert_eq!(from_yaml.baseline_version, default.baseline_version);
    assert_eq!(
        from_yaml.ignore_migration_patterns,
        default.ignore_migration_patterns
    );
}

#[test]
fn parse_full_config() {
    let yaml = r#"
table: meta.history
target: "2.1"
out_of_order: true
cherry_pick: [1, "2.1", refresh views]
ignore_migration_patterns: ["*:missing", "repeatable:pending"]
baseline_version: "5"
baseline_description: existing schema
baseline_on_migrate: true
fail_on_missing_target: false
abort_on_missing: true
validate_on_migrate: true
batch_size: 3
installed_by: deployer
lock:
  retry_count: 5
  backoff: exponential
  interval_ms: 10
  multiplier: 3.0
  max_interval_ms: 100
  stale_timeout_mins: 2
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.table, "meta.history");
    assert_eq!(config.target, MigrationVersion::parse("2.1").unwrap());
    assert!(config.out_of_order);
    let cherry: Vec<&str> = config
        .cherry_pick
        .as_ref()
        .unwrap()
        .iter()
        .map(|p| p.as_str())
        .collect();
    assert_eq!(cherry, vec!["1", "2.1", "refresh views"]);
    assert_eq!(config.ignore_migration_patterns.len(), 2);
    assert_eq!(config.baseline_version, MigrationVersion::parse("5").unwrap());
    assert_eq!(config.batch_size, Some(3));
    assert_eq!(config.effective_installed_by(), "deployer");

    let policy = config.lock.retry_policy();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.backoff, Backoff::Exponential);
    assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(30)));
    assert_eq!(config.lock.stale_timeout(), Duration::from_secs(120));
}

#[test]
fn target_keywords() {
    let config = Config::from_yaml_str("target: next").unwrap();
    assert_eq!(config.target, MigrationVersion::Next);
    let config = Config::from_yaml_str("target: CURRENT").unwrap();
    assert_eq!(config.target, MigrationVersion::Current);
}

#[test]
fn unknown_fields_rejected() {
    let err = Config::from_yaml_str("tabel: typo").unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));
}

#[test]
fn invalid_target_is_config_error() {
    let err = Config::from_yaml_str("target: \"1.x\"").unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn invalid_ignore_pattern_rejected() {
    let err = Config::from_yaml_str("ignore_migration_patterns: [\"future\"]").unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn sentinel_baseline_rejected() {
    let err = Config::from_yaml_str("baseline_version: latest").unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn bad_table_names_rejected() {
    for table in ["", "a.b.c", "drop table;", "1history"] {
        let mut config = Config::default();
        config.table = table.to_string();
        assert!(config.validate().is_err(), "{table:?} should be rejected");
    }
}

#[test]
fn zero_batch_size_rejected() {
    let err = Config::from_yaml_str("batch_size: 0").unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn exponential_multiplier_below_one_rejected() {
    let yaml = "lock:\n  backoff: exponential\n  multiplier: 0.5\n";
    assert!(Config::from_yaml_str(yaml).is_err());
}

#[test]
fn load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("tern.yml")).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn load_from_dir_prefers_yml() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("tern.yml")).unwrap();
    writeln!(file, "table: custom_history").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.table, "custom_history");
}

#[test]
fn installed_by_falls_back_to_non_empty_value() {
    let config = Config::default();
    assert!(!config.effective_installed_by().is_empty());
}

#[test]
fn unquoted_dotted_target_is_rejected() {
    let err = Config::from_yaml_str("target: 1.10\n").unwrap_err();
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("must be quoted"), "{err}");

    let config = Config::from_yaml_str("target: \"1.10\"\n").unwrap();
    assert_eq!(config.target, MigrationVersion::parse("1.10").unwrap());
    assert_ne!(config.target, MigrationVersion::parse("1.1").unwrap());
}

#[test]
fn unquoted_dotted_cherry_pick_is_rejected() {
    let err = Config::from_yaml_str("cherry_pick: [2.10]\n").unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));

    let config = Config::from_yaml_str("cherry_pick: [2, \"2.10\"]\n").unwrap();
    let picked: Vec<&str> = config
        .cherry_pick
        .as_ref()
        .unwrap()
        .iter()
        .map(|p| p.as_str())
        .collect();
    assert_eq!(picked, vec!["2", "2.10"]);
}
