// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key version operations, including the single-transaction rotation commit.

use coffer_core::CofferError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{
    row_to_key_version, KeyStatus, KeyVersion, Reencrypted, RetireOutcome, KEY_VERSION_COLUMNS,
};

/// Get the user's active key version, if any.
pub async fn get_active(db: &Database, user_id: &str) -> Result<Option<KeyVersion>, CofferError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<KeyVersion>, rusqlite::Error> {
            let sql = format!(
                "SELECT {KEY_VERSION_COLUMNS} FROM key_versions WHERE user_id = ?1 AND status = 'active'"
            );
            conn.query_row(&sql, params![user_id], row_to_key_version)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Get one of the user's key versions by ID.
pub async fn get(
    db: &Database,
    user_id: &str,
    version_id: &str,
) -> Result<Option<KeyVersion>, CofferError> {
    let user_id = user_id.to_string();
    let version_id = version_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<KeyVersion>, rusqlite::Error> {
            let sql = format!(
                "SELECT {KEY_VERSION_COLUMNS} FROM key_versions WHERE id = ?1 AND user_id = ?2"
            );
            conn.query_row(&sql, params![version_id, user_id], row_to_key_version)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List all of the user's key versions, oldest first.
pub async fn list(db: &Database, user_id: &str) -> Result<Vec<KeyVersion>, CofferError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<KeyVersion>, rusqlite::Error> {
            let sql = format!(
                "SELECT {KEY_VERSION_COLUMNS} FROM key_versions WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let versions = stmt
                .query_map(params![user_id], row_to_key_version)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(versions)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert `version` as the user's active version unless one already exists.
///
/// Returns whichever version is active after the call.
pub async fn ensure_active(db: &Database, version: &KeyVersion) -> Result<KeyVersion, CofferError> {
    let version = version.clone();
    db.connection()
        .call(move |conn| -> Result<KeyVersion, rusqlite::Error> {
            let tx = conn.transaction()?;
            let sql = format!(
                "SELECT {KEY_VERSION_COLUMNS} FROM key_versions WHERE user_id = ?1 AND status = 'active'"
            );
            let existing = tx
                .query_row(&sql, params![version.user_id], row_to_key_version)
                .optional()?;
            let active = match existing {
                Some(existing) => existing,
                None => {
                    tx.execute(
                        "INSERT INTO key_versions (id, user_id, status, created_at, retired_at)
                         VALUES (?1, ?2, 'active', ?3, NULL)",
                        params![version.id, version.user_id, version.created_at],
                    )?;
                    KeyVersion {
                        status: KeyStatus::Active,
                        retired_at: None,
                        ..version
                    }
                }
            };
            tx.commit()?;
            Ok(active)
        })
        .await
        .map_err(map_tr_err)
}

/// Retire a non-active, unreferenced version. Idempotent for retired versions.
///
/// The reference check and the status change run in one transaction.
pub async fn retire(
    db: &Database,
    user_id: &str,
    version_id: &str,
    now: &str,
) -> Result<RetireOutcome, CofferError> {
    let user_id = user_id.to_string();
    let version_id = version_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<RetireOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let sql = format!(
                "SELECT {KEY_VERSION_COLUMNS} FROM key_versions WHERE id = ?1 AND user_id = ?2"
            );
            let Some(version) = tx
                .query_row(&sql, params![version_id, user_id], row_to_key_version)
                .optional()?
            else {
                return Ok(RetireOutcome::NotFound);
            };

            if version.status == KeyStatus::Active {
                return Ok(RetireOutcome::Active);
            }

            let in_use: i64 = tx.query_row(
                "SELECT COUNT(*) FROM secret_records WHERE key_version_id = ?1",
                params![version_id],
                |row| row.get(0),
            )?;
            if in_use > 0 {
                return Ok(RetireOutcome::InUse(in_use as u64));
            }

            tx.execute(
                "UPDATE key_versions SET retired_at = COALESCE(retired_at, ?1) WHERE id = ?2",
                params![now, version_id],
            )?;
            tx.commit()?;
            Ok(RetireOutcome::Retired)
        })
        .await
        .map_err(map_tr_err)
}

/// Commit a key rotation atomically.
///
/// Retires `previous` (if any), inserts `next` as the active version, and
/// rewrites every re-encrypted record to reference `next`. Each record update
/// is guarded on the version it was read under. A record that no longer
/// exists (purged meanwhile) is skipped; a record that still exists under a
/// different version rolls the whole transaction back and returns an error.
///
/// Returns the number of records moved to `next`.
pub async fn commit_rotation(
    db: &Database,
    previous: Option<&KeyVersion>,
    next: &KeyVersion,
    records: Vec<Reencrypted>,
    now: &str,
) -> Result<usize, CofferError> {
    let previous_id = previous.map(|v| v.id.clone());
    let next = next.clone();
    let now = now.to_string();
    let (updated, stale) = db
        .connection()
        .call(move |conn| -> Result<(usize, usize), rusqlite::Error> {
            let tx = conn.transaction()?;

            if let Some(ref previous_id) = previous_id {
                tx.execute(
                    "UPDATE key_versions SET status = 'retired', retired_at = ?1
                     WHERE id = ?2 AND user_id = ?3 AND status = 'active'",
                    params![now, previous_id, next.user_id],
                )?;
            }

            tx.execute(
                "INSERT INTO key_versions (id, user_id, status, created_at, retired_at)
                 VALUES (?1, ?2, 'active', ?3, NULL)",
                params![next.id, next.user_id, next.created_at],
            )?;

            let (mut updated, mut stale) = (0usize, 0usize);
            {
                let mut update = tx.prepare(
                    "UPDATE secret_records SET ciphertext = ?1, nonce = ?2, key_version_id = ?3
                     WHERE id = ?4 AND user_id = ?5 AND key_version_id = ?6",
                )?;
                let mut exists = tx.prepare(
                    "SELECT EXISTS(SELECT 1 FROM secret_records WHERE id = ?1 AND user_id = ?2)",
                )?;
                for record in &records {
                    let changed = update.execute(params![
                        record.ciphertext,
                        record.nonce,
                        next.id,
                        record.record_id,
                        next.user_id,
                        record.previous_version_id,
                    ])?;
                    if changed == 1 {
                        updated += 1;
                    } else if exists.query_row(params![record.record_id, next.user_id], |row| {
                        row.get::<_, bool>(0)
                    })? {
                        stale += 1;
                    }
                }
            }

            // Dropping the transaction without commit rolls it back.
            if stale > 0 {
                return Ok((updated, stale));
            }
            tx.commit()?;
            Ok((updated, 0))
        })
        .await
        .map_err(map_tr_err)?;

    if stale > 0 {
        return Err(CofferError::Internal(format!(
            "rotation aborted: {stale} records changed version since they were read"
        )));
    }
    Ok(updated)
}
