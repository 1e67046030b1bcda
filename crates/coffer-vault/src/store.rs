// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted secret record operations.
//!
//! Every method here assumes the caller holds the user's execution slot and
//! passes that slot's [`UserKeys`]. Results are internal: "nothing to act on"
//! is reported as [`CofferError::NotFound`] and collapsed by the facade.

use coffer_config::model::StoreConfig;
use coffer_core::types::{now_timestamp, timestamp_after, timestamp_before};
use coffer_core::{AccessEvent, CofferError, SecretMetadata, SecretRecord};
use coffer_storage::queries::{access, secrets};
use coffer_storage::{Database, InsertOutcome, RestoreOutcome};
use secrecy::SecretString;
use tracing::{debug, error, info};
use zeroize::Zeroize;

use crate::access::AccessTracker;
use crate::crypto;
use crate::keys::{KeyHierarchy, UserKeys};
use crate::metrics;
use crate::validation::{validate_name, validate_ttl, validate_user_id, validate_value};

/// Secret record store: encryption, persistence, and lifecycle rules.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
    keys: KeyHierarchy,
    policy: StoreConfig,
    tracker: AccessTracker,
}

impl RecordStore {
    pub fn new(db: Database, keys: KeyHierarchy, policy: StoreConfig) -> Self {
        let tracker = AccessTracker::new(db.clone());
        Self {
            db,
            keys,
            policy,
            tracker,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn keys(&self) -> &KeyHierarchy {
        &self.keys
    }

    pub fn policy(&self) -> &StoreConfig {
        &self.policy
    }

    /// Encrypt and store a new secret. Returns the record id.
    pub async fn create(
        &self,
        keys: &mut UserKeys,
        user_id: &str,
        name: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<String, CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;
        validate_value(value, &self.policy)?;
        validate_ttl(ttl_secs)?;
        let ttl_secs = ttl_secs.or(self.policy.default_ttl_secs);

        let (version, dek) = self.keys.active_dek(&self.db, keys, user_id).await?;
        let record_id = uuid::Uuid::new_v4().to_string();
        let (ciphertext, nonce) = crypto::encrypt(
            &dek,
            value.as_bytes(),
            &crypto::record_aad(user_id, &record_id),
        )?;

        let now = now_timestamp();
        let record = SecretRecord {
            id: record_id.clone(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            ciphertext,
            nonce: nonce.to_vec(),
            key_version_id: version.id,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_accessed_at: None,
            access_count: 0,
            expires_at: ttl_secs.map(timestamp_after),
            deleted_at: None,
        };

        let outcome = self
            .db
            .retrying("secrets.insert", || secrets::insert(&self.db, &record, &now))
            .await?;
        match outcome {
            InsertOutcome::Inserted => {
                debug!(user_id = %user_id, op = "create", record_id = %record_id, "secret created");
                Ok(record_id)
            }
            InsertOutcome::Duplicate => Err(CofferError::DuplicateName {
                name: name.to_string(),
            }),
        }
    }

    /// Decrypt the user's live secret. Successful reads are tracked.
    pub async fn get(
        &self,
        keys: &mut UserKeys,
        user_id: &str,
        name: &str,
    ) -> Result<SecretString, CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;

        let record = self.find_live(user_id, name).await?;
        let dek = self
            .keys
            .dek_for_version(&self.db, keys, user_id, &record.key_version_id)
            .await?;

        let plaintext = match crypto::decrypt(
            &dek,
            &record.ciphertext,
            &record.nonce,
            &crypto::record_aad(user_id, &record.id),
        ) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                metrics::record_decrypt_failure();
                error!(
                    user_id = %user_id,
                    op = "get",
                    record_id = %record.id,
                    key_version_id = %record.key_version_id,
                    "secret failed authenticated decryption"
                );
                self.tracker.record_failure(&record).await;
                return Err(e);
            }
        };

        let value = String::from_utf8(plaintext.to_vec()).map_err(|e| {
            e.into_bytes().zeroize();
            CofferError::Internal(format!("secret {} is not valid UTF-8", record.id))
        })?;

        self.tracker.record_granted(&record).await;
        debug!(user_id = %user_id, op = "get", record_id = %record.id, "secret read");
        Ok(SecretString::from(value))
    }

    /// Re-encrypt the secret with a new value under the active key version.
    pub async fn update(
        &self,
        keys: &mut UserKeys,
        user_id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;
        validate_value(value, &self.policy)?;

        let record = self.find_live(user_id, name).await?;
        let (version, dek) = self.keys.active_dek(&self.db, keys, user_id).await?;
        let (ciphertext, nonce) = crypto::encrypt(
            &dek,
            value.as_bytes(),
            &crypto::record_aad(user_id, &record.id),
        )?;

        let now = now_timestamp();
        let updated = self
            .db
            .retrying("secrets.update_ciphertext", || {
                secrets::update_ciphertext(
                    &self.db,
                    &record.id,
                    &version.id,
                    ciphertext.clone(),
                    nonce.to_vec(),
                    &now,
                )
            })
            .await?;
        if !updated {
            return Err(CofferError::NotFound(format!("secret {name}")));
        }
        debug!(
            user_id = %user_id,
            op = "update",
            record_id = %record.id,
            key_version_id = %version.id,
            "secret updated"
        );
        Ok(())
    }

    /// Soft-delete the secret. The row stays for the grace window.
    pub async fn delete(&self, user_id: &str, name: &str) -> Result<(), CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;

        let now = now_timestamp();
        let deleted = self
            .db
            .retrying("secrets.soft_delete", || {
                secrets::soft_delete(&self.db, user_id, name, &now)
            })
            .await?;
        if !deleted {
            return Err(CofferError::NotFound(format!("secret {name}")));
        }
        debug!(user_id = %user_id, op = "delete", name = %name, "secret soft-deleted");
        Ok(())
    }

    /// Bring back the most recently deleted secret with this name.
    pub async fn restore(&self, user_id: &str, name: &str) -> Result<(), CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;

        let cutoff = timestamp_before(self.policy.grace_period_secs);
        let now = now_timestamp();
        let outcome = self
            .db
            .retrying("secrets.restore", || {
                secrets::restore(&self.db, user_id, name, &cutoff, &now)
            })
            .await?;
        match outcome {
            RestoreOutcome::Restored => {
                debug!(user_id = %user_id, op = "restore", name = %name, "secret restored");
                Ok(())
            }
            RestoreOutcome::NameTaken => Err(CofferError::NotFound(format!(
                "secret {name} cannot be restored while a live secret holds the name"
            ))),
            RestoreOutcome::NotFound => Err(CofferError::NotFound(format!(
                "no deleted secret {name} inside the grace window"
            ))),
        }
    }

    /// Metadata for the user's unexpired secrets, ordered by name.
    pub async fn list(
        &self,
        user_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<SecretMetadata>, CofferError> {
        validate_user_id(user_id)?;
        let now = now_timestamp();
        let records = self
            .db
            .retrying("secrets.list", || {
                secrets::list(&self.db, user_id, include_deleted, &now)
            })
            .await?;
        Ok(records.iter().map(SecretRecord::metadata).collect())
    }

    /// Read audit trail for the user's live secret, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<AccessEvent>, CofferError> {
        validate_user_id(user_id)?;
        validate_name(name, &self.policy)?;
        let record = self.find_live(user_id, name).await?;
        self.db
            .retrying("access.history", || {
                access::history(&self.db, user_id, &record.id, limit)
            })
            .await
    }

    /// Remove rows past their grace window or expiry, across all users.
    pub async fn purge(&self) -> Result<usize, CofferError> {
        let now = now_timestamp();
        let cutoff = timestamp_before(self.policy.grace_period_secs);
        let removed = self
            .db
            .retrying("secrets.purge", || secrets::purge(&self.db, &now, &cutoff))
            .await?;
        if removed > 0 {
            info!(removed, "purged expired and deleted secrets");
        }
        metrics::record_purged(removed);
        Ok(removed)
    }

    async fn find_live(&self, user_id: &str, name: &str) -> Result<SecretRecord, CofferError> {
        let now = now_timestamp();
        self.db
            .retrying("secrets.find_live", || {
                secrets::find_live(&self.db, user_id, name, &now)
            })
            .await?
            .ok_or_else(|| CofferError::NotFound(format!("secret {name}")))
    }
}
