// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared between the storage layer and the vault.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Fixed-width timestamp format; lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant in the canonical storage format.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The current time in the canonical storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Offsets are clamped to this many seconds (~200 years) so every stored
/// timestamp keeps a four-digit year.
const MAX_OFFSET_SECS: u64 = 200 * 365 * 24 * 60 * 60;

/// `now + secs` in the canonical storage format.
pub fn timestamp_after(secs: u64) -> String {
    let offset = Duration::seconds(secs.min(MAX_OFFSET_SECS) as i64);
    format_timestamp(Utc::now() + offset)
}

/// `now - secs` in the canonical storage format.
pub fn timestamp_before(secs: u64) -> String {
    let offset = Duration::seconds(secs.min(MAX_OFFSET_SECS) as i64);
    format_timestamp(Utc::now() - offset)
}

/// Lifecycle state of a key version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The single version used for all new encryption.
    Active,
    /// Never used for new encryption; kept so leftover ciphertext stays readable.
    Retired,
}

/// A generation marker for a user's data encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
    pub id: String,
    pub user_id: String,
    pub status: KeyStatus,
    pub created_at: String,
    pub retired_at: Option<String>,
}

/// A persisted, encrypted secret row.
///
/// Debug output omits the ciphertext and nonce.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_accessed_at: Option<String>,
    pub access_count: i64,
    pub expires_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl SecretRecord {
    /// Metadata view of this record (never carries ciphertext or plaintext).
    pub fn metadata(&self) -> SecretMetadata {
        SecretMetadata {
            name: self.name.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            last_accessed_at: self.last_accessed_at.clone(),
            access_count: self.access_count,
            expires_at: self.expires_at.clone(),
            deleted_at: self.deleted_at.clone(),
        }
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("key_version_id", &self.key_version_id)
            .field("ciphertext", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}

/// Listing entry for a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_accessed_at: Option<String>,
    pub access_count: i64,
    pub expires_at: Option<String>,
    pub deleted_at: Option<String>,
}

/// Result of a read attempt, as recorded in the audit log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    DecryptionFailed,
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: i64,
    pub record_id: String,
    pub user_id: String,
    pub timestamp: String,
    pub outcome: AccessOutcome,
}
