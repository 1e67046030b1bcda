// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key rotation and key version retirement.
//!
//! Rotation is eager: every row a read or restore can still reach, soft-deleted
//! ones inside the grace window included, is re-encrypted under the new version
//! before anything is written, and the version switch plus all record updates
//! commit in one transaction. A single undecryptable record aborts the whole
//! rotation. Expired rows and rows past the grace window are left to purge.

use std::collections::HashMap;

use coffer_core::types::{now_timestamp, timestamp_before};
use coffer_core::{CofferError, KeyVersion};
use coffer_storage::queries::{key_versions, secrets};
use coffer_storage::{Reencrypted, RetireOutcome};
use tracing::{debug, error, info};

use crate::crypto;
use crate::keys::{new_key_version, KeyBytes, UserKeys};
use crate::metrics;
use crate::store::RecordStore;
use crate::validation::validate_user_id;

/// Create a new active key version and move all of the user's records to it.
pub async fn rotate_key(
    store: &RecordStore,
    keys: &mut UserKeys,
    user_id: &str,
) -> Result<KeyVersion, CofferError> {
    validate_user_id(user_id)?;
    let db = store.database();
    let hierarchy = store.keys();

    let previous = db
        .retrying("key_versions.get_active", || {
            key_versions::get_active(db, user_id)
        })
        .await?;
    let read_at = now_timestamp();
    let grace_cutoff = timestamp_before(store.policy().grace_period_secs);
    let records = db
        .retrying("secrets.list_reachable", || {
            secrets::list_reachable(db, user_id, &read_at, &grace_cutoff)
        })
        .await?;

    let next = new_key_version(user_id);
    let next_dek = hierarchy.dek_with_cache(keys, user_id, &next.id)?;

    let mut old_deks: HashMap<String, KeyBytes> = HashMap::new();
    let mut reencrypted = Vec::with_capacity(records.len());
    for record in &records {
        if !old_deks.contains_key(&record.key_version_id) {
            let dek = hierarchy.dek_with_cache(keys, user_id, &record.key_version_id)?;
            old_deks.insert(record.key_version_id.clone(), dek);
        }
        let Some(old_dek) = old_deks.get(&record.key_version_id) else {
            return Err(CofferError::Internal("key cache miss during rotation".to_string()));
        };

        let aad = crypto::record_aad(user_id, &record.id);
        let plaintext = crypto::decrypt(old_dek, &record.ciphertext, &record.nonce, &aad)
            .inspect_err(|_| {
                metrics::record_decrypt_failure();
                error!(
                    user_id = %user_id,
                    op = "rotate",
                    record_id = %record.id,
                    key_version_id = %record.key_version_id,
                    "record failed to decrypt, rotation aborted"
                );
            })?;
        let (ciphertext, nonce) = crypto::encrypt(&next_dek, &plaintext, &aad)?;
        reencrypted.push(Reencrypted {
            record_id: record.id.clone(),
            previous_version_id: record.key_version_id.clone(),
            ciphertext,
            nonce: nonce.to_vec(),
        });
    }

    let now = now_timestamp();
    let moved = db
        .retrying("key_versions.commit_rotation", || {
            key_versions::commit_rotation(db, previous.as_ref(), &next, reencrypted.clone(), &now)
        })
        .await?;

    metrics::record_rotation();
    info!(
        user_id = %user_id,
        op = "rotate",
        version_id = %next.id,
        previous_version_id = previous.as_ref().map(|v| v.id.as_str()).unwrap_or("none"),
        records = moved,
        "key rotated"
    );
    Ok(next)
}

/// Retire a non-active key version that no record references any more.
pub async fn retire_key_version(
    store: &RecordStore,
    user_id: &str,
    version_id: &str,
) -> Result<(), CofferError> {
    validate_user_id(user_id)?;
    let db = store.database();
    let now = now_timestamp();
    let outcome = db
        .retrying("key_versions.retire", || {
            key_versions::retire(db, user_id, version_id, &now)
        })
        .await?;
    match outcome {
        RetireOutcome::Retired => {
            debug!(user_id = %user_id, op = "retire", version_id = %version_id, "key version retired");
            Ok(())
        }
        RetireOutcome::NotFound => Err(CofferError::NotFound(format!("key version {version_id}"))),
        RetireOutcome::Active => Err(CofferError::Validation(
            "the active key version cannot be retired; rotate first".to_string(),
        )),
        RetireOutcome::InUse(in_use) => Err(CofferError::VersionStillInUse {
            version_id: version_id.to_string(),
            in_use,
        }),
    }
}

/// The user's key versions, oldest first.
pub async fn list_key_versions(
    store: &RecordStore,
    user_id: &str,
) -> Result<Vec<KeyVersion>, CofferError> {
    validate_user_id(user_id)?;
    let db = store.database();
    db.retrying("key_versions.list", || key_versions::list(db, user_id))
        .await
}
