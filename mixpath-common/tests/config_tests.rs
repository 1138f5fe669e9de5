//! Unit tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Priority order for config file resolution (CLI → env → platform → defaults)
//! - Missing config files fall back to compiled defaults with a warning
//! - Malformed config files are reported as configuration errors
//! - Profile tables are preserved for the engine to decode
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate MIXPATH_CONFIG are marked with #[serial].

use mixpath_common::config::{load_config, ConfigResolver, CONFIG_ENV_VAR};
use mixpath_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

#[test]
#[serial]
fn test_resolver_cli_arg_takes_priority() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/mixpath-env.toml");

    let resolver = ConfigResolver::new(Some(PathBuf::from("/tmp/mixpath-cli.toml")));
    assert_eq!(resolver.resolve(), Some(PathBuf::from("/tmp/mixpath-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolver_env_var_used_without_cli_arg() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/mixpath-env.toml");

    let resolver = ConfigResolver::new(None);
    assert_eq!(resolver.resolve(), Some(PathBuf::from("/tmp/mixpath-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolver_empty_env_var_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let resolver = ConfigResolver::new(None);
    let resolved = resolver.resolve();
    // Either nothing, or an existing platform config file
    if let Some(path) = resolved {
        assert!(path.exists());
    }

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_load_none_uses_defaults() {
    let config = load_config(None).expect("defaults should load");
    assert_eq!(config.logging.level, "info");
    assert!(config.profiles.is_empty());
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = load_config(Some(&missing)).expect("missing file must not be fatal");
    assert_eq!(config.search.fast_deadline_ms, 250);
}

#[test]
fn test_load_full_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "mixpath_engine=debug"

[search]
thorough_deadline_ms = 30000
genetic_waypoint_threshold = 3

[search.genetic]
seed = 7

[profiles.late_night]
mismatch_penalty = 3.0

[profiles.late_night.tempo]
enabled = true
max_change = 4.0
"#
    )
    .unwrap();

    let config = load_config(Some(file.path())).expect("valid config should load");
    assert_eq!(config.logging.level, "mixpath_engine=debug");
    assert_eq!(config.search.thorough_deadline_ms, 30_000);
    assert_eq!(config.search.genetic_waypoint_threshold, 3);
    assert_eq!(config.search.genetic.seed, 7);

    let profile = config.profiles.get("late_night").expect("profile table kept");
    let tempo = profile.get("tempo").and_then(|t| t.get("max_change"));
    assert_eq!(tempo.and_then(|v| v.as_float()), Some(4.0));
}

#[test]
fn test_load_malformed_file_is_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[search\nfast_deadline_ms = ").unwrap();

    let err = load_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
