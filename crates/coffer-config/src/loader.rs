// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./coffer.toml` > `~/.config/coffer/coffer.toml` > `/etc/coffer/coffer.toml`
//! with environment variable overrides via `COFFER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CofferConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/coffer/coffer.toml` (system-wide)
/// 3. `~/.config/coffer/coffer.toml` (user XDG config)
/// 4. `./coffer.toml` (local directory)
/// 5. `COFFER_*` environment variables
pub fn load_config() -> Result<CofferConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CofferConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CofferConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::file("/etc/coffer/coffer.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("coffer/coffer.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("coffer.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `COFFER_STORE_GRACE_PERIOD_SECS` must map to
/// `store.grace_period_secs`, not `store.grace.period.secs`.
///
/// The master key variables (`COFFER_MASTER_KEY`, `COFFER_MASTER_PASSPHRASE`)
/// are ignored here so key material never enters the config tree.
fn env_provider() -> Env {
    Env::prefixed("COFFER_")
        .ignore(&["master_key", "master_passphrase"])
        .map(|key| {
            // `key` is the lowercased env var name with prefix stripped.
            // Example: COFFER_STORAGE_DATABASE_PATH -> "storage_database_path"
            let key_str = key.as_str();
            let mapped = key_str
                .replacen("general_", "general.", 1)
                .replacen("storage_", "storage.", 1)
                .replacen("keys_", "keys.", 1)
                .replacen("store_", "store.", 1);
            mapped.into()
        })
}
