// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-side models: row mapping and the outcomes of multi-step
//! transactional queries.
//!
//! The canonical entity types live in `coffer-core::types`; they are
//! re-exported here for convenience within the storage crate.

use std::str::FromStr;

pub use coffer_core::types::{AccessEvent, AccessOutcome, KeyStatus, KeyVersion, SecretRecord};

/// Result of inserting a new secret record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A live, unexpired record already holds the name.
    Duplicate,
}

/// Result of restoring a soft-deleted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// A live record already holds the name.
    NameTaken,
    /// No soft-deleted record with that name inside the grace window.
    NotFound,
}

/// Result of retiring a key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireOutcome {
    Retired,
    NotFound,
    /// The version is the user's active version.
    Active,
    /// Records still reference the version.
    InUse(u64),
}

/// A record re-sealed under a new key version during rotation.
///
/// Debug output omits the ciphertext.
#[derive(Clone)]
pub struct Reencrypted {
    pub record_id: String,
    /// The version the record referenced when it was read; the write is
    /// rejected if the row moved in the meantime.
    pub previous_version_id: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl std::fmt::Debug for Reencrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reencrypted")
            .field("record_id", &self.record_id)
            .field("previous_version_id", &self.previous_version_id)
            .field("ciphertext", &"[REDACTED]")
            .finish()
    }
}

/// Column list matching [`row_to_record`].
pub(crate) const RECORD_COLUMNS: &str = "id, user_id, name, ciphertext, nonce, key_version_id, \
     created_at, updated_at, last_accessed_at, access_count, expires_at, deleted_at";

/// Column list matching [`row_to_key_version`].
pub(crate) const KEY_VERSION_COLUMNS: &str = "id, user_id, status, created_at, retired_at";

/// Convert a rusqlite Row to a SecretRecord.
pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> Result<SecretRecord, rusqlite::Error> {
    Ok(SecretRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        ciphertext: row.get(3)?,
        nonce: row.get(4)?,
        key_version_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_accessed_at: row.get(8)?,
        access_count: row.get(9)?,
        expires_at: row.get(10)?,
        deleted_at: row.get(11)?,
    })
}

/// Convert a rusqlite Row to a KeyVersion.
pub(crate) fn row_to_key_version(row: &rusqlite::Row<'_>) -> Result<KeyVersion, rusqlite::Error> {
    let status: String = row.get(2)?;
    Ok(KeyVersion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: parse_column(2, &status)?,
        created_at: row.get(3)?,
        retired_at: row.get(4)?,
    })
}

/// Convert a rusqlite Row to an AccessEvent.
pub(crate) fn row_to_access_event(row: &rusqlite::Row<'_>) -> Result<AccessEvent, rusqlite::Error> {
    let outcome: String = row.get(4)?;
    Ok(AccessEvent {
        id: row.get(0)?,
        record_id: row.get(1)?,
        user_id: row.get(2)?,
        timestamp: row.get(3)?,
        outcome: parse_column(4, &outcome)?,
    })
}

/// Parse a TEXT column into a strum enum, reporting a conversion failure.
fn parse_column<T>(idx: usize, value: &str) -> Result<T, rusqlite::Error>
where
    T: FromStr<Err = strum::ParseError>,
{
    T::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
