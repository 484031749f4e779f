use std::fs;
use std::path::PathBuf;

use iprtrack_config::{ConfigError, RegistrySettings, RetryConfig, Settings};
use tempfile::tempdir;

#[test]
fn explicit_file_is_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("iprtrack.toml");
    fs::write(
        &path,
        r#"
[registry]
path = "registry.xlsx"
lock = false

[reconcile]
exclusions = ["111", " 222.0 "]

[publish]
spreadsheet_id = "abc123"
"#,
    )
    .unwrap();

    let (settings, source) = Settings::load(Some(&path)).unwrap();
    assert_eq!(source, Some(path));
    assert_eq!(settings.registry.path, PathBuf::from("registry.xlsx"));
    assert!(!settings.registry.lock);
    assert_eq!(settings.publish.spreadsheet_id, "abc123");

    let exclusions = settings.exclusion_set().unwrap();
    let mut ids: Vec<String> = exclusions.iter().map(|t| t.to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["111", "222"]);
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn invalid_file_reports_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[freshness]\nconcurrency = 0\n").unwrap();
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn section_types_are_exported() {
    let settings = Settings::default();
    let registry: &RegistrySettings = &settings.registry;
    assert!(registry.lock);
    assert_eq!(settings.retry.batch, RetryConfig::batch_default());
}
