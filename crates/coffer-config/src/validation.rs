// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, KDF cost floors, and well-formed hex salts.

use crate::diagnostic::ConfigError;
use crate::model::CofferConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CofferConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.general.log_level.as_str()) {
        fail(format!(
            "general.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.general.log_level
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.storage.max_retries > 10 {
        fail(format!(
            "storage.max_retries must be at most 10, got {}",
            config.storage.max_retries
        ));
    }

    // Key source
    if config.keys.master_key_env.trim().is_empty() {
        fail("keys.master_key_env must not be empty".to_string());
    }

    if let Some(ref path) = config.keys.master_key_file
        && path.trim().is_empty()
    {
        fail("keys.master_key_file must not be empty when set".to_string());
    }

    if let Some(ref salt) = config.keys.passphrase_salt {
        match hex::decode(salt.trim()) {
            Ok(bytes) if bytes.len() == 16 => {}
            Ok(bytes) => fail(format!(
                "keys.passphrase_salt must decode to 16 bytes, got {}",
                bytes.len()
            )),
            Err(e) => fail(format!("keys.passphrase_salt is not valid hex: {e}")),
        }
    }

    // Argon2id floors only matter for the passphrase source, but bad values
    // are rejected regardless so a later switch does not surprise.
    if config.keys.argon2_memory_cost < 32768 {
        fail(format!(
            "keys.argon2_memory_cost must be at least 32768 (32 MiB), got {}",
            config.keys.argon2_memory_cost
        ));
    }

    if config.keys.argon2_iterations < 2 {
        fail(format!(
            "keys.argon2_iterations must be at least 2, got {}",
            config.keys.argon2_iterations
        ));
    }

    if config.keys.argon2_parallelism < 1 {
        fail(format!(
            "keys.argon2_parallelism must be at least 1, got {}",
            config.keys.argon2_parallelism
        ));
    }

    if config.keys.umk_iterations < 1 {
        fail("keys.umk_iterations must be at least 1".to_string());
    }

    if config.keys.dek_iterations < 1 {
        fail("keys.dek_iterations must be at least 1".to_string());
    }

    // Store policy
    if config.store.default_ttl_secs == Some(0) {
        fail("store.default_ttl_secs must be positive when set".to_string());
    }

    if config.store.max_name_len == 0 {
        fail("store.max_name_len must be positive".to_string());
    }

    if config.store.max_value_bytes == 0 {
        fail("store.max_value_bytes must be positive".to_string());
    }

    if config.store.purge_interval_secs == 0 {
        fail("store.purge_interval_secs must be positive".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = CofferConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = CofferConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = CofferConfig::default();
        config.general.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "general.log_level"));
    }

    #[test]
    fn short_passphrase_salt_fails_validation() {
        let mut config = CofferConfig::default();
        config.keys.passphrase_salt = Some("00ff".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "16 bytes"));
    }

    #[test]
    fn non_hex_passphrase_salt_fails_validation() {
        let mut config = CofferConfig::default();
        config.keys.passphrase_salt = Some("not-hex".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "not valid hex"));
    }

    #[test]
    fn zero_iterations_fail_validation() {
        let mut config = CofferConfig::default();
        config.keys.umk_iterations = 0;
        config.keys.dek_iterations = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "umk_iterations"));
        assert!(has_error(&errors, "dek_iterations"));
    }

    #[test]
    fn zero_default_ttl_fails_validation() {
        let mut config = CofferConfig::default();
        config.store.default_ttl_secs = Some(0);
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "default_ttl_secs"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = CofferConfig::default();
        config.storage.database_path = " ".to_string();
        config.store.max_name_len = 0;
        config.keys.argon2_iterations = 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = CofferConfig::default();
        config.storage.database_path = "/tmp/coffer.db".to_string();
        config.keys.passphrase_salt = Some("00112233445566778899aabbccddeeff".to_string());
        config.store.default_ttl_secs = Some(3600);
        assert!(validate_config(&config).is_ok());
    }
}
