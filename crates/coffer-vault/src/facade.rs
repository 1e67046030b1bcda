// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public secret store: one serialized execution slot per user.
//!
//! Operations for the same user run one at a time in arrival order behind a
//! FIFO mutex; different users proceed in parallel. Once a caller has
//! acquired its slot the operation body runs on a spawned task that owns the
//! slot guard, so dropping the caller's future cannot interrupt a write.
//!
//! Every public method is total. Internal failures are logged and collapse
//! to a sentinel (`None`, `false`, empty, `0`); only caller-contract
//! violations come back as [`StoreError`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use coffer_config::model::CofferConfig;
use coffer_core::{AccessEvent, CofferError, KeyVersion, SecretMetadata};
use coffer_storage::Database;
use dashmap::DashMap;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};
use zeroize::Zeroizing;

use crate::keys::{KeyHierarchy, UserKeys};
use crate::master::MasterKey;
use crate::metrics;
use crate::rotation;
use crate::store::RecordStore;
use crate::validation::validate_user_id;

/// Caller-contract violations. Everything else collapses to a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("a secret named `{name}` already exists")]
    DuplicateName { name: String },

    #[error("key version {version_id} is still referenced by {in_use} record(s)")]
    VersionStillInUse { version_id: String, in_use: u64 },
}

/// One user's execution slot: the FIFO lock and the key cache it guards.
struct UserSlot {
    keys: Arc<Mutex<UserKeys>>,
    /// Milliseconds since the registry epoch when the last operation finished.
    last_used_ms: AtomicU64,
}

struct Inner {
    records: RecordStore,
    slots: DashMap<String, Arc<UserSlot>>,
    epoch: Instant,
    idle_after: Duration,
}

impl Inner {
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn slot(&self, user_id: &str) -> Arc<UserSlot> {
        let now = self.elapsed_ms();
        self.slots
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(UserSlot {
                    keys: Arc::new(Mutex::new(UserKeys::default())),
                    last_used_ms: AtomicU64::new(now),
                })
            })
            .clone()
    }
}

/// Per-user encrypted secret store.
#[derive(Clone)]
pub struct SecretStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("users", &self.inner.slots.len())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl SecretStore {
    /// Build a store over an open database with an injected master key.
    pub fn new(db: Database, master: MasterKey, config: &CofferConfig) -> Self {
        let keys = KeyHierarchy::new(master, &config.keys);
        let records = RecordStore::new(db, keys, config.store.clone());
        Self {
            inner: Arc::new(Inner {
                records,
                slots: DashMap::new(),
                epoch: Instant::now(),
                idle_after: Duration::from_secs(config.store.idle_slot_secs),
            }),
        }
    }

    /// Open the configured database and build a store over it.
    pub async fn open(config: &CofferConfig, master: MasterKey) -> Result<Self, CofferError> {
        let db = Database::open_with_config(&config.storage).await?;
        Ok(Self::new(db, master, config))
    }

    pub fn database(&self) -> &Database {
        self.inner.records.database()
    }

    /// Run `body` inside the user's slot on a detached task.
    async fn run<T, F, Fut>(&self, user_id: &str, body: F) -> Result<T, CofferError>
    where
        T: Send + 'static,
        F: FnOnce(RecordStore, OwnedMutexGuard<UserKeys>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CofferError>> + Send + 'static,
    {
        validate_user_id(user_id)?;
        let slot = self.inner.slot(user_id);
        let guard = Arc::clone(&slot.keys).lock_owned().await;

        let records = self.inner.records.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let result = body(records, guard).await;
                slot.last_used_ms.store(inner.elapsed_ms(), Ordering::Relaxed);
                result
            }
            .in_current_span(),
        );
        task.await
            .map_err(|e| CofferError::Internal(format!("operation task failed: {e}")))?
    }

    /// Map an internal result onto the public contract.
    fn collapse<T>(
        op: &'static str,
        user_id: &str,
        result: Result<T, CofferError>,
        sentinel: T,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                metrics::record_operation(op, "ok");
                Ok(value)
            }
            Err(CofferError::NotFound(what)) => {
                metrics::record_operation(op, "not_found");
                debug!(user_id = %user_id, op, what = %what, "nothing to act on");
                Ok(sentinel)
            }
            Err(CofferError::Validation(reason)) => {
                metrics::record_operation(op, "rejected");
                debug!(user_id = %user_id, op, reason = %reason, "rejected invalid input");
                Err(StoreError::Validation(reason))
            }
            Err(CofferError::DuplicateName { name }) => {
                metrics::record_operation(op, "rejected");
                Err(StoreError::DuplicateName { name })
            }
            Err(CofferError::VersionStillInUse { version_id, in_use }) => {
                metrics::record_operation(op, "rejected");
                Err(StoreError::VersionStillInUse { version_id, in_use })
            }
            Err(e) => {
                metrics::record_operation(op, "error");
                error!(user_id = %user_id, op, kind = e.kind(), error = %e, "operation failed");
                Ok(sentinel)
            }
        }
    }

    /// Store a new secret. Returns its id, or `None` on internal failure.
    pub async fn create_secret(
        &self,
        user_id: &str,
        name: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<Option<String>, StoreError> {
        let (user, name, value) = (
            user_id.to_string(),
            name.to_string(),
            Zeroizing::new(value.to_string()),
        );
        let result = self
            .run(user_id, move |store, mut keys| async move {
                store.create(&mut keys, &user, &name, &value, ttl_secs).await
            })
            .await;
        Self::collapse("create", user_id, result.map(Some), None)
    }

    /// Decrypt a secret. `None` when absent, deleted, expired, or unreadable.
    pub async fn get_secret(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<SecretString>, StoreError> {
        let (user, name) = (user_id.to_string(), name.to_string());
        let result = self
            .run(user_id, move |store, mut keys| async move {
                store.get(&mut keys, &user, &name).await
            })
            .await;
        Self::collapse("get", user_id, result.map(Some), None)
    }

    /// Replace a secret's value, re-encrypting under the active key version.
    pub async fn update_secret(
        &self,
        user_id: &str,
        name: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let (user, name, value) = (
            user_id.to_string(),
            name.to_string(),
            Zeroizing::new(value.to_string()),
        );
        let result = self
            .run(user_id, move |store, mut keys| async move {
                store.update(&mut keys, &user, &name, &value).await
            })
            .await;
        Self::collapse("update", user_id, result.map(|()| true), false)
    }

    /// Soft-delete a secret. `false` if there was no live secret to delete.
    pub async fn delete_secret(&self, user_id: &str, name: &str) -> Result<bool, StoreError> {
        let (user, name) = (user_id.to_string(), name.to_string());
        let result = self
            .run(user_id, move |store, _keys| async move {
                store.delete(&user, &name).await
            })
            .await;
        Self::collapse("delete", user_id, result.map(|()| true), false)
    }

    /// Undo a soft delete inside the grace window.
    pub async fn restore_secret(&self, user_id: &str, name: &str) -> Result<bool, StoreError> {
        let (user, name) = (user_id.to_string(), name.to_string());
        let result = self
            .run(user_id, move |store, _keys| async move {
                store.restore(&user, &name).await
            })
            .await;
        Self::collapse("restore", user_id, result.map(|()| true), false)
    }

    /// Metadata of live, unexpired secrets ordered by name.
    pub async fn list_secrets(&self, user_id: &str) -> Result<Vec<SecretMetadata>, StoreError> {
        self.list(user_id, false).await
    }

    /// Like [`list_secrets`](Self::list_secrets), plus soft-deleted secrets
    /// still inside the grace window.
    pub async fn list_secrets_with_deleted(
        &self,
        user_id: &str,
    ) -> Result<Vec<SecretMetadata>, StoreError> {
        self.list(user_id, true).await
    }

    async fn list(
        &self,
        user_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<SecretMetadata>, StoreError> {
        let user = user_id.to_string();
        let result = self
            .run(user_id, move |store, _keys| async move {
                store.list(&user, include_deleted).await
            })
            .await;
        Self::collapse("list", user_id, result, Vec::new())
    }

    /// Rotate the user's data key and re-encrypt all of their records.
    pub async fn rotate_key(&self, user_id: &str) -> Result<bool, StoreError> {
        let user = user_id.to_string();
        let result = self
            .run(user_id, move |store, mut keys| async move {
                rotation::rotate_key(&store, &mut keys, &user).await
            })
            .await;
        Self::collapse("rotate", user_id, result.map(|_| true), false)
    }

    /// Retire an unreferenced, non-active key version.
    pub async fn retire_key_version(
        &self,
        user_id: &str,
        version_id: &str,
    ) -> Result<bool, StoreError> {
        let (user, version) = (user_id.to_string(), version_id.to_string());
        let result = self
            .run(user_id, move |store, _keys| async move {
                rotation::retire_key_version(&store, &user, &version).await
            })
            .await;
        Self::collapse("retire", user_id, result.map(|()| true), false)
    }

    /// The user's key versions, oldest first.
    pub async fn list_key_versions(&self, user_id: &str) -> Result<Vec<KeyVersion>, StoreError> {
        let user = user_id.to_string();
        let result = self
            .run(user_id, move |store, _keys| async move {
                rotation::list_key_versions(&store, &user).await
            })
            .await;
        Self::collapse("versions", user_id, result, Vec::new())
    }

    /// Most recent reads of the user's live secret, newest first.
    pub async fn access_history(
        &self,
        user_id: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<AccessEvent>, StoreError> {
        let (user, name) = (user_id.to_string(), name.to_string());
        let result = self
            .run(user_id, move |store, _keys| async move {
                store.history(&user, &name, limit).await
            })
            .await;
        Self::collapse("history", user_id, result, Vec::new())
    }

    /// Permanently remove expired rows and rows past the grace window.
    /// Returns the number removed, `0` on failure.
    pub async fn purge_expired(&self) -> usize {
        let records = self.inner.records.clone();
        let task = tokio::spawn(async move { records.purge().await }.in_current_span());
        let result = task
            .await
            .unwrap_or_else(|e| Err(CofferError::Internal(format!("purge task failed: {e}"))));
        match Self::collapse("purge", "*", result, 0) {
            Ok(removed) => removed,
            Err(_) => 0,
        }
    }

    /// Drop the user's cached key material, waiting for any queued operations.
    pub async fn forget_user(&self, user_id: &str) {
        let slot = self.inner.slots.get(user_id).map(|s| Arc::clone(s.value()));
        if let Some(slot) = slot {
            slot.keys.lock().await.forget();
            debug!(user_id = %user_id, "user key cache cleared");
        }
    }

    /// Evict slots nobody holds or waits on that have been idle past
    /// `store.idle_slot_secs`. Returns the number evicted.
    pub fn evict_idle(&self) -> usize {
        let now = self.inner.elapsed_ms();
        let idle_ms = u64::try_from(self.inner.idle_after.as_millis()).unwrap_or(u64::MAX);
        let before = self.inner.slots.len();
        self.inner.slots.retain(|_, slot| {
            let in_use = Arc::strong_count(slot) > 1;
            let idle = now.saturating_sub(slot.last_used_ms.load(Ordering::Relaxed)) >= idle_ms;
            in_use || !idle
        });
        let evicted = before.saturating_sub(self.inner.slots.len());
        if evicted > 0 {
            debug!(evicted, "evicted idle user slots");
        }
        evicted
    }

    /// Number of users with a live execution slot.
    pub fn active_users(&self) -> usize {
        self.inner.slots.len()
    }

    /// Run `purge_expired` and `evict_idle` every `store.purge_interval_secs`
    /// until `cancel` fires.
    pub fn spawn_purge_task(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        let period = Duration::from_secs(
            self.inner
                .records
                .policy()
                .purge_interval_secs
                .max(1),
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = store.purge_expired().await;
                        let evicted = store.evict_idle();
                        debug!(purged, evicted, "purge pass complete");
                    }
                    _ = cancel.cancelled() => {
                        info!("purge task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tracing_test::traced_test;

    async fn store_with(config: CofferConfig) -> SecretStore {
        let db = Database::open_in_memory().await.unwrap();
        SecretStore::new(db, MasterKey::from_bytes([9u8; 32]), &config)
    }

    fn fast_config() -> CofferConfig {
        let mut config = CofferConfig::default();
        config.keys.umk_iterations = 10;
        config.keys.dek_iterations = 5;
        config
    }

    #[tokio::test]
    async fn caller_errors_are_distinguishable() {
        let store = store_with(fast_config()).await;
        assert!(matches!(
            store.create_secret("", "api", "v", None).await,
            Err(StoreError::Validation(_))
        ));
        store.create_secret("u1", "api", "v", None).await.unwrap().unwrap();
        assert_eq!(
            store.create_secret("u1", "api", "v", None).await,
            Err(StoreError::DuplicateName {
                name: "api".to_string()
            })
        );
        assert!(matches!(
            store.get_secret("u1", "bad name").await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn internal_failures_collapse_to_sentinels() {
        let store = store_with(fast_config()).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();

        store
            .database()
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("DROP TABLE access_events; DROP TABLE secret_records;")
            })
            .await
            .unwrap();

        assert!(store.get_secret("u1", "api").await.unwrap().is_none());
        assert!(!store.delete_secret("u1", "api").await.unwrap());
        assert!(store.list_secrets("u1").await.unwrap().is_empty());
        assert_eq!(store.purge_expired().await, 0);
        assert!(store.create_secret("u1", "new", "v", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retire_surfaces_version_in_use() {
        let store = store_with(fast_config()).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();
        let versions = store.list_key_versions("u1").await.unwrap();
        assert!(matches!(
            store.retire_key_version("u1", &versions[0].id).await,
            Err(StoreError::Validation(_))
        ));
        assert!(!store.retire_key_version("u1", "unknown").await.unwrap());
    }

    #[tokio::test]
    async fn idle_slots_are_evicted_and_keys_forgotten() {
        let mut config = fast_config();
        config.store.idle_slot_secs = 0;
        let store = store_with(config).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();
        store.create_secret("u2", "api", "v", None).await.unwrap();
        assert_eq!(store.active_users(), 2);

        assert_eq!(store.evict_idle(), 2);
        assert_eq!(store.active_users(), 0);

        // A fresh slot re-derives keys transparently.
        let value = store.get_secret("u1", "api").await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "v");
    }

    #[tokio::test]
    async fn busy_slots_survive_eviction() {
        let mut config = fast_config();
        config.store.idle_slot_secs = 0;
        let store = store_with(config).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();

        let held = store.inner.slot("u1");
        let _guard = held.keys.lock().await;
        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.active_users(), 1);
    }

    #[tokio::test]
    async fn same_user_operations_run_in_arrival_order() {
        let store = store_with(fast_config()).await;
        store.create_secret("u1", "seq", "start", None).await.unwrap();

        // Hold the slot so every update queues behind it.
        let held = store.inner.slot("u1");
        let guard = Arc::clone(&held.keys).lock_owned().await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update_secret("u1", "seq", &format!("v{i}")).await
            }));
            // Let the task run until it is parked on the slot lock.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }
        drop(guard);

        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        let value = store.get_secret("u1", "seq").await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "v9");
    }

    #[tokio::test]
    async fn recent_slots_survive_eviction() {
        let store = store_with(fast_config()).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();
        assert_eq!(store.evict_idle(), 0);
    }

    #[tokio::test]
    async fn forget_user_clears_cached_key() {
        let store = store_with(fast_config()).await;
        store.create_secret("u1", "api", "v", None).await.unwrap();
        let slot = store.inner.slot("u1");
        assert!(slot.keys.lock().await.is_cached());
        store.forget_user("u1").await;
        assert!(!slot.keys.lock().await.is_cached());
        assert!(store.get_secret("u1", "api").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_task_stops_on_cancel() {
        let store = store_with(fast_config()).await;
        let cancel = CancellationToken::new();
        let handle = store.spawn_purge_task(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("purge task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn purge_task_removes_dead_rows_and_evicts_idle_slots() {
        let mut config = fast_config();
        config.store.purge_interval_secs = 1;
        config.store.grace_period_secs = 0;
        config.store.idle_slot_secs = 0;
        let store = store_with(config).await;

        store.create_secret("u1", "gone", "a", None).await.unwrap();
        store.create_secret("u1", "short", "b", Some(1)).await.unwrap();
        store.create_secret("u1", "keep", "c", None).await.unwrap();
        assert!(store.delete_secret("u1", "gone").await.unwrap());
        assert_eq!(store.active_users(), 1);

        let row_count = |store: SecretStore| async move {
            store
                .database()
                .connection()
                .call(|conn| -> Result<i64, rusqlite::Error> {
                    conn.query_row("SELECT COUNT(*) FROM secret_records", [], |row| row.get(0))
                })
                .await
                .unwrap()
        };

        let cancel = CancellationToken::new();
        let handle = store.spawn_purge_task(cancel.clone());
        let mut remaining = row_count(store.clone()).await;
        for _ in 0..60 {
            if remaining == 1 && store.active_users() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            remaining = row_count(store.clone()).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(remaining, 1);
        assert_eq!(store.active_users(), 0);
        let names: Vec<String> = store
            .list_secrets_with_deleted("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["keep"]);
    }

    #[tokio::test]
    async fn debug_output_is_redacted() {
        let store = store_with(fast_config()).await;
        let rendered = format!("{store:?}");
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_never_contain_plaintext() {
        let store = store_with(fast_config()).await;
        let plaintext = "pl41nt3xt-canary-value";
        store
            .create_secret("u1", "canary", plaintext, None)
            .await
            .unwrap();
        store.get_secret("u1", "canary").await.unwrap();
        store
            .update_secret("u1", "canary", "pl41nt3xt-canary-updated")
            .await
            .unwrap();
        store.rotate_key("u1").await.unwrap();
        store.get_secret("u1", "canary").await.unwrap();
        store.delete_secret("u1", "canary").await.unwrap();

        assert!(logs_contain("secret created"));
        assert!(logs_contain("key rotated"));
        assert!(!logs_contain("pl41nt3xt"));
    }
}
