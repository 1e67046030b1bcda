// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry for transient storage failures.
//!
//! Only [`CofferError::StorageUnavailable`] is retried. Every storage call
//! the vault issues is either a read or a single transaction, so repeating
//! it after a busy/locked failure cannot apply a write twice.

use std::future::Future;
use std::time::Duration;

use coffer_config::model::StorageConfig;
use coffer_core::CofferError;
use tracing::warn;

/// How often and how patiently a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Attempt `n` sleeps `n * backoff` before running.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// Run `f`, retrying while it fails with a transient error and attempts remain.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &'static str,
    mut f: F,
) -> Result<T, CofferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CofferError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(op, attempt, error = %e, "transient storage error, will retry");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn unavailable() -> CofferError {
        CofferError::StorageUnavailable {
            source: "database is locked".into(),
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(3), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err(unavailable()) } else { Ok(n) }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CofferError::Storage {
                source: "no such table".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_policy_follows_storage_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff, Duration::from_millis(50));
    }
}
