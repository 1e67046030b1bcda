// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key hierarchy: master key -> user master key -> data encryption keys.
//!
//! UMK = PBKDF2(MEK, "coffer/umk/v1:" || user_id, umk_iterations)
//! DEK = PBKDF2(UMK, "coffer/dek/v1:" || key_version_id, dek_iterations)
//!
//! Neither the MEK nor any derived key is ever written to storage; only the
//! key version rows (identifiers and status) are persisted.

use std::sync::Arc;

use coffer_config::model::KeysConfig;
use coffer_core::types::now_timestamp;
use coffer_core::{CofferError, KeyStatus, KeyVersion};
use coffer_storage::queries::key_versions;
use coffer_storage::Database;
use tracing::info;
use zeroize::Zeroizing;

use crate::kdf;
use crate::master::MasterKey;

pub type KeyBytes = Zeroizing<[u8; 32]>;

/// Per-user key cache, owned by that user's execution slot.
#[derive(Default)]
pub struct UserKeys {
    umk: Option<KeyBytes>,
}

impl UserKeys {
    /// Drop (and zeroize) the cached user master key.
    pub fn forget(&mut self) {
        self.umk = None;
    }

    pub fn is_cached(&self) -> bool {
        self.umk.is_some()
    }
}

impl std::fmt::Debug for UserKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKeys")
            .field("umk_cached", &self.umk.is_some())
            .finish()
    }
}

/// Derives user and data keys from the master key.
#[derive(Clone)]
pub struct KeyHierarchy {
    master: Arc<MasterKey>,
    umk_iterations: u32,
    dek_iterations: u32,
}

impl std::fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("master", &"[REDACTED]")
            .field("umk_iterations", &self.umk_iterations)
            .field("dek_iterations", &self.dek_iterations)
            .finish()
    }
}

impl KeyHierarchy {
    pub fn new(master: MasterKey, config: &KeysConfig) -> Self {
        Self {
            master: Arc::new(master),
            umk_iterations: config.umk_iterations,
            dek_iterations: config.dek_iterations,
        }
    }

    /// Derive a user's master key. Deterministic; not cached here.
    pub fn derive_umk(&self, user_id: &str) -> Result<KeyBytes, CofferError> {
        kdf::pbkdf2_sha256(
            self.master.expose(),
            &kdf::umk_salt(user_id),
            self.umk_iterations,
        )
    }

    /// Derive the data encryption key for a key version from a user master key.
    pub fn derive_dek(&self, umk: &[u8; 32], version_id: &str) -> Result<KeyBytes, CofferError> {
        kdf::pbkdf2_sha256(umk, &kdf::dek_salt(version_id), self.dek_iterations)
    }

    /// The user's master key, derived on first use and cached in `keys`.
    fn umk<'a>(&self, keys: &'a mut UserKeys, user_id: &str) -> Result<&'a [u8; 32], CofferError> {
        if keys.umk.is_none() {
            keys.umk = Some(self.derive_umk(user_id)?);
        }
        match keys.umk.as_deref() {
            Some(umk) => Ok(umk),
            None => Err(CofferError::Internal("user key cache empty".to_string())),
        }
    }

    /// DEK for a specific version, using the cached UMK.
    pub fn dek_with_cache(
        &self,
        keys: &mut UserKeys,
        user_id: &str,
        version_id: &str,
    ) -> Result<KeyBytes, CofferError> {
        let umk = self.umk(keys, user_id)?;
        self.derive_dek(umk, version_id)
    }

    /// The user's active key version and its DEK, creating the first version
    /// when the user has none.
    pub async fn active_dek(
        &self,
        db: &Database,
        keys: &mut UserKeys,
        user_id: &str,
    ) -> Result<(KeyVersion, KeyBytes), CofferError> {
        let existing = db
            .retrying("key_versions.get_active", || {
                key_versions::get_active(db, user_id)
            })
            .await?;

        let version = match existing {
            Some(version) => version,
            None => {
                let candidate = new_key_version(user_id);
                let version = db
                    .retrying("key_versions.ensure_active", || {
                        key_versions::ensure_active(db, &candidate)
                    })
                    .await?;
                info!(user_id = %user_id, version_id = %version.id, "created first key version");
                version
            }
        };

        let dek = self.dek_with_cache(keys, user_id, &version.id)?;
        Ok((version, dek))
    }

    /// DEK for a version the user owns, active or retired.
    pub async fn dek_for_version(
        &self,
        db: &Database,
        keys: &mut UserKeys,
        user_id: &str,
        version_id: &str,
    ) -> Result<KeyBytes, CofferError> {
        let version = db
            .retrying("key_versions.get", || key_versions::get(db, user_id, version_id))
            .await?
            .ok_or_else(|| CofferError::NotFound(format!("key version {version_id}")))?;
        self.dek_with_cache(keys, user_id, &version.id)
    }
}

/// A fresh active key version for `user_id`, not yet persisted.
pub fn new_key_version(user_id: &str) -> KeyVersion {
    KeyVersion {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        status: KeyStatus::Active,
        created_at: now_timestamp(),
        retired_at: None,
    }
}
