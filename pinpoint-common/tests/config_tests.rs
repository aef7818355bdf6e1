//! Configuration resolution and graceful degradation
//!
//! Tests that touch PINPOINT_CONFIG are marked #[serial] so environment
//! changes never race between tests.

use pinpoint_common::config::{resolve_config_path, PinpointConfig, CONFIG_ENV_VAR};
use pinpoint_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_explicit_path_takes_priority_over_env() {
    let explicit = write_config("[consensus]\nmin_sources = 4\n");
    let from_env = write_config("[consensus]\nmin_sources = 5\n");
    env::set_var(CONFIG_ENV_VAR, from_env.path());

    let config = PinpointConfig::load(Some(explicit.path())).unwrap();
    assert_eq!(config.consensus.min_sources, 4);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_explicit_path() {
    let from_env = write_config("[monitor]\nhistory_cap = 25\n");
    env::set_var(CONFIG_ENV_VAR, from_env.path());

    let resolved = resolve_config_path(None).unwrap();
    assert_eq!(resolved, from_env.path());

    let config = PinpointConfig::load(None).unwrap();
    assert_eq!(config.monitor.history_cap, 25);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = PinpointConfig::load(Some(&missing)).unwrap();
    assert_eq!(config, PinpointConfig::default());
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let broken = write_config("[consensus\n");
    let result = PinpointConfig::load(Some(broken.path()));
    assert!(matches!(result, Err(Error::TomlParse(_))));
}

#[test]
fn test_full_file_round_trips_every_section() {
    let file = write_config(
        r#"
        [logging]
        level = "debug"

        [consensus]
        cluster_radius_m = 50.0
        cache_ttl_hours = 12
        min_sources = 3
        approval_threshold = 0.7
        gateway_timeout_ms = 2500
        breaker_failure_threshold = 5
        breaker_cooldown_secs = 30

        [monitor]
        default_region = "US"
        history_cap = 10
        alert_cooldown_secs = 600

        [integration]
        slow_package_ms = 1500
        default_country = "US"
        "#,
    );

    let config = PinpointConfig::from_file(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.consensus.cluster_radius_m, 50.0);
    assert_eq!(config.consensus.gateway_timeout_ms, 2500);
    assert_eq!(config.monitor.default_region, "US");
    assert_eq!(config.monitor.alert_cooldown_secs, 600);
    assert_eq!(config.integration.default_country, "US");
}
