// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Coffer configuration system.

use coffer_config::diagnostic::ConfigError;
use coffer_config::model::CofferConfig;
use coffer_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_coffer_config() {
    let toml = r#"
[general]
log_level = "debug"

[storage]
database_path = "/tmp/coffer-test.db"
wal_mode = false
max_retries = 5
retry_backoff_ms = 10

[keys]
master_key_env = "MY_APP_MEK"
master_key_file = "/run/secrets/mek"
umk_iterations = 200000
dek_iterations = 20000

[store]
grace_period_secs = 60
default_ttl_secs = 86400
max_name_len = 64
max_value_bytes = 1024
purge_interval_secs = 30
idle_slot_secs = 10
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/coffer-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.max_retries, 5);
    assert_eq!(config.storage.retry_backoff_ms, 10);
    assert_eq!(config.keys.master_key_env, "MY_APP_MEK");
    assert_eq!(config.keys.master_key_file.as_deref(), Some("/run/secrets/mek"));
    assert_eq!(config.keys.umk_iterations, 200_000);
    assert_eq!(config.keys.dek_iterations, 20_000);
    assert_eq!(config.store.grace_period_secs, 60);
    assert_eq!(config.store.default_ttl_secs, Some(86400));
    assert_eq!(config.store.max_name_len, 64);
    assert_eq!(config.store.max_value_bytes, 1024);
    assert_eq!(config.store.purge_interval_secs, 30);
    assert_eq!(config.store.idle_slot_secs, 10);
}

/// An empty document yields the compiled defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.general.log_level, "info");
    assert!(config.storage.wal_mode);
    assert_eq!(config.keys.master_key_env, "COFFER_MASTER_KEY");
    assert_eq!(config.store.grace_period_secs, 7 * 24 * 60 * 60);
    assert!(config.store.default_ttl_secs.is_none());
}

/// Unknown field in [store] section is rejected.
#[test]
fn unknown_field_in_store_produces_error() {
    let toml = r#"
[store]
grace_perod_secs = 10
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("grace_perod_secs"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown keys turn into UnknownKey diagnostics with a suggestion.
#[test]
fn unknown_key_diagnostic_carries_suggestion() {
    let toml = r#"
[keys]
umk_iteratons = 5
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("umk_iterations"));
}

/// Wrong value types are reported as InvalidType.
#[test]
fn wrong_type_produces_invalid_type_error() {
    let toml = r#"
[storage]
wal_mode = "yes please"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { .. })));
}

/// Semantic validation runs after successful deserialization.
#[test]
fn semantic_validation_errors_are_returned() {
    let toml = r#"
[keys]
dek_iterations = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero iterations are invalid");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("dek_iterations"))
    ));
}

/// Env vars override file values, and master key variables are never mapped
/// into the config tree.
#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "coffer.toml",
            r#"
[store]
grace_period_secs = 100
"#,
        )?;
        jail.set_env("COFFER_STORE_GRACE_PERIOD_SECS", "5");
        jail.set_env("COFFER_STORAGE_MAX_RETRIES", "1");
        jail.set_env(
            "COFFER_MASTER_KEY",
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff",
        );

        let config = load_config_from_path(std::path::Path::new("coffer.toml"))
            .expect("config should load");
        assert_eq!(config.store.grace_period_secs, 5);
        assert_eq!(config.storage.max_retries, 1);
        Ok(())
    });
}

/// Serialized config never contains key material, only key sources.
#[test]
fn serialized_config_round_trips() {
    let config = CofferConfig::default();
    let rendered = toml::to_string(&config).expect("config serializes");
    let parsed: CofferConfig = toml::from_str(&rendered).expect("rendered config parses");
    assert_eq!(parsed.keys.master_key_env, config.keys.master_key_env);
    assert_eq!(parsed.store.max_value_bytes, config.store.max_value_bytes);
}
