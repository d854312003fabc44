//! Unit tests for configuration loading and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate EMPIRE_TEST_CONFIG are marked with #[serial].

use empire_common::config::{resolve_config_path, TomlConfig};
use empire_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const ENV_VAR: &str = "EMPIRE_TEST_CONFIG";

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        port = 6100
        upstream_url = "http://127.0.0.1:9000/ingest"
        probe_interval_ms = 2000

        [logging]
        level = "debug"

        [queue]
        capacity = 500
        max_attempts = 8
        processing_timeout_ms = 1500
        retry_interval_ms = 60000
        "#,
    );

    let config = TomlConfig::load(file.path()).expect("valid config");
    assert_eq!(config.port, 6100);
    assert_eq!(config.upstream_url.as_deref(), Some("http://127.0.0.1:9000/ingest"));
    assert_eq!(config.probe_interval_ms, Some(2000));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.queue.capacity, Some(500));
    assert_eq!(config.queue.max_attempts, 8);
    assert_eq!(config.queue.processing_timeout_ms, 1500);
    assert_eq!(config.queue.retry_interval_ms, Some(60000));
}

#[test]
fn test_cli_path_has_priority() {
    let file = write_config("port = 6200\n");
    let resolved = TomlConfig::resolve(Some(file.path()), ENV_VAR, "test.toml").unwrap();
    assert_eq!(resolved.port, 6200);
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let file = write_config("port = 6300\n");
    env::set_var(ENV_VAR, file.path());

    let path = resolve_config_path(None, ENV_VAR, "test.toml");
    let config = TomlConfig::resolve(None, ENV_VAR, "test.toml");

    env::remove_var(ENV_VAR);

    assert_eq!(path.as_deref(), Some(file.path()));
    assert_eq!(config.unwrap().port, 6300);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::set_var(ENV_VAR, "/nonexistent/empire/sync.toml");
    let config = TomlConfig::resolve(None, ENV_VAR, "test.toml");
    env::remove_var(ENV_VAR);

    let config = config.expect("missing file is not fatal");
    assert_eq!(config.port, TomlConfig::default().port);
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("[queue\nmax_attempts = ");
    let result = TomlConfig::resolve(Some(file.path()), ENV_VAR, "test.toml");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_values_are_an_error() {
    let file = write_config("[queue]\nprocessing_timeout_ms = 0\n");
    let result = TomlConfig::load(file.path());
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("processing_timeout_ms")));
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(ENV_VAR, "/from/env.toml");
    let cli = PathBuf::from("/from/cli.toml");
    let path = resolve_config_path(Some(&cli), ENV_VAR, "test.toml");
    env::remove_var(ENV_VAR);

    assert_eq!(path, Some(cli));
}
