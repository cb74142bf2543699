//! Configuration resolution and graceful degradation
//!
//! Tests that manipulate CODA_CONFIG are marked with #[serial] so they never
//! observe each other's environment.

use coda_common::config::{resolve_config_path, CodaConfig, CONFIG_ENV_VAR};
use coda_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_explicit_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/coda-from-env.toml");

    let explicit = PathBuf::from("/tmp/coda-explicit.toml");
    assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_when_no_explicit_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/coda-from-env.toml");

    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/coda-from-env.toml"))
    );

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let config = CodaConfig::load(Some(&missing)).expect("missing file is not an error");
    assert_eq!(config, CodaConfig::default());
}

#[test]
#[serial]
fn test_load_through_env_var() {
    let file = write_config(
        r#"
        database_path = "/var/tmp/coda-test.db"

        [logging]
        level = "debug"

        [calibration]
        worker_threads = 3
        worker_queue_depth = 5
        measurement_timeout_secs = 60
        max_path_evaluations = 5000
        spectra_truncation = false
        phase_speed_kms = 3.9
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let config = CodaConfig::load(None).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/var/tmp/coda-test.db"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.calibration.worker_threads, 3);
    assert_eq!(config.calibration.worker_queue_depth, 5);
    assert_eq!(config.calibration.measurement_timeout_secs, 60);
    assert_eq!(config.calibration.max_path_evaluations, 5000);
    assert!(!config.calibration.spectra_truncation);
    assert!(config.calibration.aggressive_path_optimization);
    assert_eq!(config.calibration.phase_speed_kms, 3.9);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = write_config("database_path = [not toml");
    let result = CodaConfig::load(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_phase_speed_rejected() {
    let file = write_config("[calibration]\nphase_speed_kms = -1.0\n");
    let result = CodaConfig::from_file(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_round_trip_through_toml() {
    let mut config = CodaConfig::default();
    config.logging.file = Some(PathBuf::from("/tmp/coda.log"));
    config.calibration.worker_threads = 8;

    let text = toml::to_string(&config).unwrap();
    let parsed: CodaConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
