// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Coffer secret store.

use thiserror::Error;

/// The internal error type shared by every Coffer crate.
///
/// Nothing in this enum crosses the public store boundary directly: the
/// facade in `coffer-vault` collapses it into sentinel values, surfacing only
/// `Validation`, `DuplicateName` and `VersionStillInUse` to callers.
#[derive(Debug, Error)]
pub enum CofferError {
    /// Malformed caller input (empty name, oversized value, bad TTL).
    #[error("validation error: {0}")]
    Validation(String),

    /// A live secret with this name already exists for the user.
    #[error("a secret named `{name}` already exists")]
    DuplicateName { name: String },

    /// The addressed record or key version does not exist for this user.
    #[error("not found: {0}")]
    NotFound(String),

    /// AEAD tag verification failed: wrong key, corrupted ciphertext, or
    /// associated-data mismatch.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Transient storage fault (busy, locked, connection closed). Retried
    /// internally a bounded number of times.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Permanent storage backend errors (query failure, constraint, schema).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key derivation or key material handling failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// A key version cannot be retired while records still reference it.
    #[error("key version {version_id} is still referenced by {in_use} record(s)")]
    VersionStillInUse { version_id: String, in_use: u64 },

    /// Configuration errors (invalid TOML, missing master key, bad parameters).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CofferError {
    /// Whether a retry of the same storage call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CofferError::StorageUnavailable { .. })
    }

    /// Short, stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CofferError::Validation(_) => "validation",
            CofferError::DuplicateName { .. } => "duplicate_name",
            CofferError::NotFound(_) => "not_found",
            CofferError::DecryptionFailed => "decryption_failed",
            CofferError::StorageUnavailable { .. } => "storage_unavailable",
            CofferError::Storage { .. } => "storage",
            CofferError::KeyDerivation(_) => "key_derivation",
            CofferError::VersionStillInUse { .. } => "version_in_use",
            CofferError::Config(_) => "config",
            CofferError::Internal(_) => "internal",
        }
    }
}
