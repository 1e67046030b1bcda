// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read bookkeeping: access counters and the audit event log.

use coffer_core::CofferError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{row_to_access_event, AccessEvent, AccessOutcome};

/// Record a successful read: bump `access_count`, set `last_accessed_at`, and
/// append a `granted` event, all in one transaction.
pub async fn record_access(
    db: &Database,
    record_id: &str,
    user_id: &str,
    now: &str,
) -> Result<(), CofferError> {
    let record_id = record_id.to_string();
    let user_id = user_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE secret_records
                 SET last_accessed_at = ?1, access_count = access_count + 1
                 WHERE id = ?2 AND user_id = ?3",
                params![now, record_id, user_id],
            )?;
            if changed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            tx.execute(
                "INSERT INTO access_events (record_id, user_id, timestamp, outcome)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record_id, user_id, now, AccessOutcome::Granted.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Append an event without touching the record's counters.
pub async fn record_event(
    db: &Database,
    record_id: &str,
    user_id: &str,
    now: &str,
    outcome: AccessOutcome,
) -> Result<(), CofferError> {
    let record_id = record_id.to_string();
    let user_id = user_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO access_events (record_id, user_id, timestamp, outcome)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record_id, user_id, now, outcome.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent events for a record first, at most `limit`.
pub async fn history(
    db: &Database,
    user_id: &str,
    record_id: &str,
    limit: usize,
) -> Result<Vec<AccessEvent>, CofferError> {
    let user_id = user_id.to_string();
    let record_id = record_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<AccessEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, record_id, user_id, timestamp, outcome FROM access_events
                 WHERE record_id = ?1 AND user_id = ?2
                 ORDER BY id DESC
                 LIMIT ?3",
            )?;
            let events = stmt
                .query_map(params![record_id, user_id, limit], row_to_access_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InsertOutcome, KeyStatus, KeyVersion, SecretRecord};
    use crate::queries::{key_versions, secrets};

    const T0: &str = "2026-04-01T00:00:00.000Z";

    async fn setup_with_record() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        key_versions::ensure_active(
            &db,
            &KeyVersion {
                id: "kv-1".to_string(),
                user_id: "alice".to_string(),
                status: KeyStatus::Active,
                created_at: T0.to_string(),
                retired_at: None,
            },
        )
        .await
        .unwrap();
        let outcome = secrets::insert(
            &db,
            &SecretRecord {
                id: "r1".to_string(),
                user_id: "alice".to_string(),
                name: "api".to_string(),
                ciphertext: vec![1],
                nonce: vec![0; 12],
                key_version_id: "kv-1".to_string(),
                created_at: T0.to_string(),
                updated_at: T0.to_string(),
                last_accessed_at: None,
                access_count: 0,
                expires_at: None,
                deleted_at: None,
            },
            T0,
        )
        .await
        .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        db
    }

    #[tokio::test]
    async fn record_access_updates_counters_and_log() {
        let db = setup_with_record().await;
        record_access(&db, "r1", "alice", "2026-04-01T00:00:01.000Z")
            .await
            .unwrap();
        record_access(&db, "r1", "alice", "2026-04-01T00:00:02.000Z")
            .await
            .unwrap();

        let record = secrets::find_live(&db, "alice", "api", T0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.access_count, 2);
        assert_eq!(
            record.last_accessed_at.as_deref(),
            Some("2026-04-01T00:00:02.000Z")
        );

        let events = history(&db, "alice", "r1", 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, "2026-04-01T00:00:02.000Z");
        assert!(events.iter().all(|e| e.outcome == AccessOutcome::Granted));
    }

    #[tokio::test]
    async fn record_access_on_missing_record_fails() {
        let db = setup_with_record().await;
        assert!(record_access(&db, "nope", "alice", T0).await.is_err());
        assert!(record_access(&db, "r1", "bob", T0).await.is_err());
    }

    #[tokio::test]
    async fn failed_reads_are_logged_without_counting() {
        let db = setup_with_record().await;
        record_event(&db, "r1", "alice", T0, AccessOutcome::DecryptionFailed)
            .await
            .unwrap();
        let record = secrets::find_live(&db, "alice", "api", T0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.access_count, 0);
        let events = history(&db, "alice", "r1", 10).await.unwrap();
        assert_eq!(events[0].outcome, AccessOutcome::DecryptionFailed);
    }

    #[tokio::test]
    async fn history_is_limited_and_cascades_on_purge() {
        let db = setup_with_record().await;
        for _ in 0..5 {
            record_access(&db, "r1", "alice", T0).await.unwrap();
        }
        assert_eq!(history(&db, "alice", "r1", 3).await.unwrap().len(), 3);
        assert!(history(&db, "bob", "r1", 10).await.unwrap().is_empty());

        secrets::soft_delete(&db, "alice", "api", T0).await.unwrap();
        assert_eq!(secrets::purge(&db, T0, T0).await.unwrap(), 1);
        assert!(history(&db, "alice", "r1", 10).await.unwrap().is_empty());
    }
}
