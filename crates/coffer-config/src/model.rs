// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Coffer secret store.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Coffer configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CofferConfig {
    /// Process-level settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Master key source and key-derivation parameters.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Secret lifecycle policy (grace window, TTL, limits).
    #[serde(default)]
    pub store: StoreConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Extra attempts for a storage call that failed transiently (busy, locked).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds; attempt `n` waits `n * base`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("coffer").join("coffer.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("coffer.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

/// Master key source and key hierarchy parameters.
///
/// The master key itself never appears in this struct; only where to find it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeysConfig {
    /// Environment variable holding the hex-encoded 32-byte master key.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,

    /// Optional path to a file containing the hex-encoded master key.
    #[serde(default)]
    pub master_key_file: Option<String>,

    /// Hex-encoded 16-byte salt. When set, the master key may be derived from
    /// a passphrase via Argon2id.
    #[serde(default)]
    pub passphrase_salt: Option<String>,

    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_argon2_memory_cost")]
    pub argon2_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// PBKDF2 iterations for deriving a user master key from the master key.
    #[serde(default = "default_umk_iterations")]
    pub umk_iterations: u32,

    /// PBKDF2 iterations for deriving a data encryption key from a user master key.
    #[serde(default = "default_dek_iterations")]
    pub dek_iterations: u32,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            master_key_env: default_master_key_env(),
            master_key_file: None,
            passphrase_salt: None,
            argon2_memory_cost: default_argon2_memory_cost(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            umk_iterations: default_umk_iterations(),
            dek_iterations: default_dek_iterations(),
        }
    }
}

fn default_master_key_env() -> String {
    "COFFER_MASTER_KEY".to_string()
}

fn default_argon2_memory_cost() -> u32 {
    65536
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_umk_iterations() -> u32 {
    100_000
}

fn default_dek_iterations() -> u32 {
    10_000
}

/// Secret lifecycle policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// How long a soft-deleted secret is retained before it is purged (default: 7 days).
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// TTL applied to new secrets created without one. `None` means no expiry.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// Maximum secret name length in characters.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    /// Maximum plaintext size in bytes.
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,

    /// Interval between background purge passes.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Idle time after which a user's execution slot (and cached key) is evicted.
    #[serde(default = "default_idle_slot_secs")]
    pub idle_slot_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            default_ttl_secs: None,
            max_name_len: default_max_name_len(),
            max_value_bytes: default_max_value_bytes(),
            purge_interval_secs: default_purge_interval_secs(),
            idle_slot_secs: default_idle_slot_secs(),
        }
    }
}

fn default_grace_period_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_name_len() -> usize {
    128
}

fn default_max_value_bytes() -> usize {
    64 * 1024
}

fn default_purge_interval_secs() -> u64 {
    3600
}

fn default_idle_slot_secs() -> u64 {
    300
}
