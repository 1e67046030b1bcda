// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All SQL is serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::future::Future;

use coffer_config::model::StorageConfig;
use coffer_core::CofferError;
use rusqlite::ErrorCode;
use tracing::{debug, info};

use crate::migrations::run_migrations;
use crate::retry::{with_retry, RetryPolicy};

/// Handle to the Coffer SQLite database.
///
/// Wraps the single `tokio_rusqlite::Connection` that owns every read and
/// write, plus the retry policy applied to transient failures.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode and the default
    /// retry policy, running pending migrations.
    pub async fn open(path: &str) -> Result<Self, CofferError> {
        Self::open_with_config(&StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        })
        .await
    }

    /// Open the database described by `config`.
    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, CofferError> {
        if let Some(parent) = std::path::Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CofferError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&config.database_path)
            .await
            .map_err(classify_sqlite_error)?;
        let db = Self {
            conn,
            retry: RetryPolicy::from_config(config),
        };
        db.prepare(config.wal_mode).await?;
        info!(path = %config.database_path, wal = config.wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and ephemeral stores.
    pub async fn open_in_memory() -> Result<Self, CofferError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(classify_sqlite_error)?;
        let db = Self {
            conn,
            retry: RetryPolicy::default(),
        };
        db.prepare(false).await?;
        debug!("in-memory database opened");
        Ok(db)
    }

    /// Apply connection PRAGMAs and run migrations.
    async fn prepare(&self, wal_mode: bool) -> Result<(), CofferError> {
        self.conn
            .call(move |conn| -> Result<(), CofferError> {
                if wal_mode {
                    let mode: String = conn
                        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                        .map_err(classify_sqlite_error)?;
                    debug!(mode = %mode, "journal mode set");
                }
                conn.execute_batch(
                    "PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )
                .map_err(classify_sqlite_error)?;
                run_migrations(conn)
            })
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                tokio_rusqlite::Error::ConnectionClosed => connection_closed(),
                _ => CofferError::Storage {
                    source: "database setup failed".into(),
                },
            })
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run a storage call, retrying it while it fails transiently.
    pub async fn retrying<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, CofferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CofferError>>,
    {
        with_retry(&self.retry, op, f).await
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CofferError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

fn connection_closed() -> CofferError {
    CofferError::StorageUnavailable {
        source: "database connection closed".into(),
    }
}

/// Classify a rusqlite error: busy/locked databases are transient, the rest
/// are permanent.
pub(crate) fn classify_sqlite_error(e: rusqlite::Error) -> CofferError {
    let transient = matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if transient {
        CofferError::StorageUnavailable {
            source: Box::new(e),
        }
    } else {
        CofferError::Storage {
            source: Box::new(e),
        }
    }
}

/// Convert tokio-rusqlite errors to CofferError.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CofferError {
    match e {
        tokio_rusqlite::Error::Error(inner) => classify_sqlite_error(inner),
        tokio_rusqlite::Error::ConnectionClosed => connection_closed(),
        other => CofferError::Storage {
            source: Box::new(other),
        },
    }
}
