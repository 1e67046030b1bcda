// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret record CRUD, soft delete, restore, and purge.
//!
//! "Live" means `deleted_at IS NULL`; a live record is visible to reads only
//! while `expires_at` is unset or later than `now`.

use coffer_core::CofferError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{row_to_record, InsertOutcome, RestoreOutcome, SecretRecord, RECORD_COLUMNS};

/// Find the user's live, unexpired record with `name`.
pub async fn find_live(
    db: &Database,
    user_id: &str,
    name: &str,
    now: &str,
) -> Result<Option<SecretRecord>, CofferError> {
    let user_id = user_id.to_string();
    let name = name.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<SecretRecord>, rusqlite::Error> {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM secret_records
                 WHERE user_id = ?1 AND name = ?2 AND deleted_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?3)"
            );
            conn.query_row(&sql, params![user_id, name, now], row_to_record)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new record.
///
/// A live row with the same name that has already expired is hard-deleted in
/// the same transaction; a live unexpired one yields [`InsertOutcome::Duplicate`].
pub async fn insert(
    db: &Database,
    record: &SecretRecord,
    now: &str,
) -> Result<InsertOutcome, CofferError> {
    let record = record.clone();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM secret_records
                 WHERE user_id = ?1 AND name = ?2 AND deleted_at IS NULL
                   AND expires_at IS NOT NULL AND expires_at <= ?3",
                params![record.user_id, record.name, now],
            )?;

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM secret_records
                 WHERE user_id = ?1 AND name = ?2 AND deleted_at IS NULL)",
                params![record.user_id, record.name],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(InsertOutcome::Duplicate);
            }

            tx.execute(
                "INSERT INTO secret_records (id, user_id, name, ciphertext, nonce, key_version_id,
                     created_at, updated_at, last_accessed_at, access_count, expires_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.user_id,
                    record.name,
                    record.ciphertext,
                    record.nonce,
                    record.key_version_id,
                    record.created_at,
                    record.updated_at,
                    record.last_accessed_at,
                    record.access_count,
                    record.expires_at,
                    record.deleted_at,
                ],
            )?;
            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a live, unexpired record's ciphertext and key version.
///
/// Returns `false` when the record is gone, deleted, or expired.
pub async fn update_ciphertext(
    db: &Database,
    record_id: &str,
    key_version_id: &str,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    now: &str,
) -> Result<bool, CofferError> {
    let record_id = record_id.to_string();
    let key_version_id = key_version_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE secret_records
                 SET ciphertext = ?1, nonce = ?2, key_version_id = ?3, updated_at = ?4
                 WHERE id = ?5 AND deleted_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?4)",
                params![ciphertext, nonce, key_version_id, now, record_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Soft-delete the user's live, unexpired record with `name`.
pub async fn soft_delete(
    db: &Database,
    user_id: &str,
    name: &str,
    now: &str,
) -> Result<bool, CofferError> {
    let user_id = user_id.to_string();
    let name = name.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE secret_records SET deleted_at = ?1
                 WHERE user_id = ?2 AND name = ?3 AND deleted_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?1)",
                params![now, user_id, name],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Undo the most recent soft delete of `name` if it happened after `cutoff`.
///
/// An expired live holder of the name is cleared first, as on insert.
pub async fn restore(
    db: &Database,
    user_id: &str,
    name: &str,
    cutoff: &str,
    now: &str,
) -> Result<RestoreOutcome, CofferError> {
    let user_id = user_id.to_string();
    let name = name.to_string();
    let cutoff = cutoff.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<RestoreOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let candidate: Option<String> = tx
                .query_row(
                    "SELECT id FROM secret_records
                     WHERE user_id = ?1 AND name = ?2
                       AND deleted_at IS NOT NULL AND deleted_at > ?3
                       AND (expires_at IS NULL OR expires_at > ?4)
                     ORDER BY deleted_at DESC, created_at DESC
                     LIMIT 1",
                    params![user_id, name, cutoff, now],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(record_id) = candidate else {
                return Ok(RestoreOutcome::NotFound);
            };

            tx.execute(
                "DELETE FROM secret_records
                 WHERE user_id = ?1 AND name = ?2 AND deleted_at IS NULL
                   AND expires_at IS NOT NULL AND expires_at <= ?3",
                params![user_id, name, now],
            )?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM secret_records
                 WHERE user_id = ?1 AND name = ?2 AND deleted_at IS NULL)",
                params![user_id, name],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(RestoreOutcome::NameTaken);
            }

            tx.execute(
                "UPDATE secret_records SET deleted_at = NULL WHERE id = ?1",
                params![record_id],
            )?;
            tx.commit()?;
            Ok(RestoreOutcome::Restored)
        })
        .await
        .map_err(map_tr_err)
}

/// List the user's unexpired records ordered by name, then creation time.
pub async fn list(
    db: &Database,
    user_id: &str,
    include_deleted: bool,
    now: &str,
) -> Result<Vec<SecretRecord>, CofferError> {
    let user_id = user_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<SecretRecord>, rusqlite::Error> {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM secret_records
                 WHERE user_id = ?1
                   AND (expires_at IS NULL OR expires_at > ?2)
                   AND (?3 OR deleted_at IS NULL)
                 ORDER BY name ASC, created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![user_id, now, include_deleted], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Rows a read or restore can still reach: unexpired at `now`, and either
/// live or soft-deleted after `grace_cutoff`. Purge owns everything else.
pub async fn list_reachable(
    db: &Database,
    user_id: &str,
    now: &str,
    grace_cutoff: &str,
) -> Result<Vec<SecretRecord>, CofferError> {
    let user_id = user_id.to_string();
    let now = now.to_string();
    let grace_cutoff = grace_cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<SecretRecord>, rusqlite::Error> {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM secret_records
                 WHERE user_id = ?1
                   AND (expires_at IS NULL OR expires_at > ?2)
                   AND (deleted_at IS NULL OR deleted_at > ?3)
                 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![user_id, now, grace_cutoff], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Permanently remove rows soft-deleted at or before `grace_cutoff` and rows
/// expired at `now`. Their access events cascade.
pub async fn purge(db: &Database, now: &str, grace_cutoff: &str) -> Result<usize, CofferError> {
    let now = now.to_string();
    let grace_cutoff = grace_cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let removed = conn.execute(
                "DELETE FROM secret_records
                 WHERE (deleted_at IS NOT NULL AND deleted_at <= ?1)
                    OR (expires_at IS NOT NULL AND expires_at <= ?2)",
                params![grace_cutoff, now],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}
