// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read tracking. Failures here are logged and swallowed; they never fail
//! the read that triggered them.

use coffer_core::types::now_timestamp;
use coffer_core::{AccessOutcome, SecretRecord};
use coffer_storage::queries::access;
use coffer_storage::Database;
use tracing::warn;

/// Records reads of secret records.
#[derive(Debug, Clone)]
pub struct AccessTracker {
    db: Database,
}

impl AccessTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Bump the record's counters and append a `granted` event.
    pub async fn record_granted(&self, record: &SecretRecord) {
        let now = now_timestamp();
        let result = self
            .db
            .retrying("access.record_access", || {
                access::record_access(&self.db, &record.id, &record.user_id, &now)
            })
            .await;
        if let Err(e) = result {
            warn!(
                user_id = %record.user_id,
                record_id = %record.id,
                error = %e,
                "failed to record secret access"
            );
        }
    }

    /// Append a `decryption_failed` event.
    pub async fn record_failure(&self, record: &SecretRecord) {
        let now = now_timestamp();
        let result = self
            .db
            .retrying("access.record_event", || {
                access::record_event(
                    &self.db,
                    &record.id,
                    &record.user_id,
                    &now,
                    AccessOutcome::DecryptionFailed,
                )
            })
            .await;
        if let Err(e) = result {
            warn!(
                user_id = %record.user_id,
                record_id = %record.id,
                error = %e,
                "failed to record decryption failure"
            );
        }
    }
}
