use super::*;

fn p(s: &str) -> IgnorePattern {
    s.parse().unwrap()
}

#[test]
fn wildcard_future_matches_both_future_states() {
    let pattern = p("*:future");
    assert!(pattern.matches(true, MigrationState::FutureSuccess));
    assert!(pattern.matches(true, MigrationState::FutureFailed));
    assert!(!pattern.matches(true, MigrationState::MissingSuccess));
}

#[test]
fn type_restricts_match() {
    let pattern = p("repeatable:missing");
    assert!(pattern.matches(false, MigrationState::MissingSuccess));
    assert!(pattern.matches(false, MigrationState::MissingFailed));
    assert!(!pattern.matches(true, MigrationState::MissingSuccess));
}

#[test]
fn full_wildcard_matches_everything() {
    let pattern = p("*:*");
    assert!(pattern.matches(true, MigrationState::Failed));
    assert!(pattern.matches(false, MigrationState::Pending));
}

#[test]
fn parsing_is_case_insensitive_and_displays_canonically() {
    assert_eq!(p("Versioned:Pending").to_string(), "versioned:pending");
}

#[test]
fn malformed_patterns_are_config_errors() {
    for bad in ["future", "*:done", "baseline:*", ""] {
        let err = bad.parse::<IgnorePattern>().unwrap_err();
        assert!(err.is_configuration_error(), "{bad} should be rejected");
    }
}

#[test]
fn future_tolerance_detection() {
    assert!(is_future_ignored(&[p("*:future")]));
    assert!(is_future_ignored(&[p("versioned:*")]));
    assert!(!is_future_ignored(&[p("repeatable:future")]));
    assert!(!is_future_ignored(&[]));
}

#[test]
fn cherry_pick_matches_versions_by_value() {
    let pattern = MigrationPattern::new("2.0");
    let two = MigrationVersion::parse("2").unwrap();
    let three = MigrationVersion::parse("3").unwrap();
    assert!(pattern.matches(Some(&two), "anything"));
    assert!(!pattern.matches(Some(&three), "2.0"));
}

#[test]
fn cherry_pick_matches_repeatables_by_description() {
    let pattern = MigrationPattern::new("refresh views");
    assert!(pattern.matches(None, "refresh_views"));
    assert!(!pattern.matches(None, "refresh grants"));
}

#[test]
fn cherry_pick_deserializes_numbers() {
    let patterns: Vec<MigrationPattern> = serde_yaml::from_str("[2, \"1.1\", seed data]").unwrap();
    assert_eq!(patterns[0].as_str(), "2");
    assert_eq!(patterns[1].as_str(), "1.1");
    assert_eq!(patterns[2].as_str(), "seed data");
}

#[test]
fn cherry_pick_rejects_bare_decimals() {
    assert!(serde_yaml::from_str::<Vec<MigrationPattern>>("[2.10]").is_err());
}
