//! Lock coordination over the secrets store.
//!
//! The store has no native locking primitive, so mutual exclusion is built
//! from a companion scalar entry at `<path>-lock` holding the owner's lock
//! ID: presence means locked, absence means unlocked.
//!
//! The store also has no conditional create, so check-then-write runs
//! under a per-resource in-process mutex.  That closes the race between
//! concurrent LOCK requests for a single server instance; multi-instance
//! deployments sharing one store are not protected.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::LockInfo;
use crate::secrets::{SecretsClient, SecretsError};

/// Suffix appended to a resource path to derive its lock entry name.
pub const LOCK_SUFFIX: &str = "-lock";

/// Result of a lock attempt.
#[derive(Debug)]
pub enum LockOutcome {
    /// The lock was taken; state is now Locked(info.ID).
    Acquired,
    /// Another holder owns the lock; its info is returned untouched.
    Held(LockInfo),
}

/// Result of an unlock attempt.
#[derive(Debug)]
pub enum UnlockOutcome {
    /// The lock was removed (or did not exist; unlock is idempotent).
    Released,
    /// The caller's lock ID does not match the current holder.
    Conflict(LockInfo),
}

/// Per-resource lock coordinator.
pub struct LockStore {
    client: Arc<dyn SecretsClient>,
    /// Advisory per-resource guards serializing check-then-write sequences
    /// within this process.
    guards: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockStore {
    pub fn new(client: Arc<dyn SecretsClient>) -> Self {
        Self {
            client,
            guards: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_path(path: &str) -> String {
        format!("{path}{LOCK_SUFFIX}")
    }

    async fn guard(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards.entry(path.to_string()).or_default().clone()
    }

    /// Drop the map entry for `path` once no task holds a clone of its
    /// guard, so the map does not grow with every resource name ever seen.
    async fn prune_guard(&self, path: &str) {
        let mut guards = self.guards.lock().await;
        if guards.get(path).is_some_and(|g| Arc::strong_count(g) == 1) {
            guards.remove(path);
        }
    }

    /// Report the lock state of `path`.
    ///
    /// A typed NotFound from the store means unlocked; any other failure is
    /// a transient store problem and propagates instead of masquerading as
    /// "unlocked".
    pub async fn is_locked(&self, path: &str) -> Result<Option<LockInfo>, SecretsError> {
        match self.client.get_latest_value(&Self::lock_path(path)).await {
            Ok(id) => Ok(Some(LockInfo::with_id(id))),
            Err(SecretsError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempt to take the lock on `path` for `info`'s holder.
    pub async fn try_lock(&self, path: &str, info: &LockInfo) -> Result<LockOutcome, SecretsError> {
        let guard = self.guard(path).await;
        let result = {
            let _held = guard.lock().await;
            self.try_lock_under_guard(path, info).await
        };
        drop(guard);
        self.prune_guard(path).await;
        result
    }

    async fn try_lock_under_guard(
        &self,
        path: &str,
        info: &LockInfo,
    ) -> Result<LockOutcome, SecretsError> {
        if let Some(current) = self.is_locked(path).await? {
            return Ok(LockOutcome::Held(current));
        }
        self.client
            .set_value(&Self::lock_path(path), &info.id)
            .await?;
        Ok(LockOutcome::Acquired)
    }

    /// Release the lock on `path` if `info` matches the current holder.
    /// Unlocking an unlocked resource succeeds as a no-op.
    pub async fn unlock(&self, path: &str, info: &LockInfo) -> Result<UnlockOutcome, SecretsError> {
        let guard = self.guard(path).await;
        let result = {
            let _held = guard.lock().await;
            self.unlock_under_guard(path, info).await
        };
        drop(guard);
        self.prune_guard(path).await;
        result
    }

    async fn unlock_under_guard(
        &self,
        path: &str,
        info: &LockInfo,
    ) -> Result<UnlockOutcome, SecretsError> {
        if let Some(current) = self.is_locked(path).await? {
            if current.id != info.id {
                return Ok(UnlockOutcome::Conflict(current));
            }
        }
        self.delete_lock(path).await?;
        Ok(UnlockOutcome::Released)
    }

    /// Remove the lock record without ownership verification.  Used when
    /// the owning resource itself is deleted.
    pub async fn delete_lock(&self, path: &str) -> Result<(), SecretsError> {
        match self.client.delete(&Self::lock_path(path)).await {
            Ok(()) | Err(SecretsError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::memory::MemorySecretsClient;

    fn store() -> LockStore {
        LockStore::new(Arc::new(MemorySecretsClient::new()))
    }

    #[tokio::test]
    async fn lock_lifecycle() {
        let locks = store();
        let path = "/base/app";

        assert!(locks.is_locked(path).await.unwrap().is_none());

        // First holder acquires.
        let outcome = locks.try_lock(path, &LockInfo::with_id("A")).await.unwrap();
        assert!(matches!(outcome, LockOutcome::Acquired));
        let current = locks.is_locked(path).await.unwrap().unwrap();
        assert_eq!(current.id, "A");

        // Second holder is refused and told who owns it.
        let outcome = locks.try_lock(path, &LockInfo::with_id("B")).await.unwrap();
        match outcome {
            LockOutcome::Held(info) => assert_eq!(info.id, "A"),
            other => panic!("expected Held, got {other:?}"),
        }
        assert_eq!(locks.is_locked(path).await.unwrap().unwrap().id, "A");

        // Wrong holder cannot unlock.
        let outcome = locks.unlock(path, &LockInfo::with_id("B")).await.unwrap();
        match outcome {
            UnlockOutcome::Conflict(info) => assert_eq!(info.id, "A"),
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(locks.is_locked(path).await.unwrap().unwrap().id, "A");

        // Right holder releases.
        let outcome = locks.unlock(path, &LockInfo::with_id("A")).await.unwrap();
        assert!(matches!(outcome, UnlockOutcome::Released));
        assert!(locks.is_locked(path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unlock_when_unlocked_is_a_no_op() {
        let locks = store();
        let outcome = locks
            .unlock("/base/app", &LockInfo::with_id("A"))
            .await
            .unwrap();
        assert!(matches!(outcome, UnlockOutcome::Released));
    }

    #[tokio::test]
    async fn delete_lock_ignores_ownership_and_absence() {
        let locks = store();
        let path = "/base/app";

        locks.try_lock(path, &LockInfo::with_id("A")).await.unwrap();
        locks.delete_lock(path).await.unwrap();
        assert!(locks.is_locked(path).await.unwrap().is_none());

        // Absent lock record still deletes cleanly.
        locks.delete_lock(path).await.unwrap();
    }

    #[tokio::test]
    async fn guard_map_does_not_accumulate_entries() {
        let locks = store();
        for i in 0..32 {
            let path = format!("/base/app-{i}");
            let info = LockInfo::with_id("A");
            locks.try_lock(&path, &info).await.unwrap();
            locks.unlock(&path, &info).await.unwrap();
        }
        assert!(locks.guards.lock().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_lock_attempts_admit_exactly_one_holder() {
        let locks = Arc::new(store());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let locks = locks.clone();
            tasks.push(tokio::spawn(async move {
                let info = LockInfo::with_id(format!("holder-{i}"));
                locks.try_lock("/base/app", &info).await.unwrap()
            }));
        }

        let mut acquired = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), LockOutcome::Acquired) {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn locks_on_different_resources_are_independent() {
        let locks = store();
        locks
            .try_lock("/base/one", &LockInfo::with_id("A"))
            .await
            .unwrap();

        let outcome = locks
            .try_lock("/base/two", &LockInfo::with_id("B"))
            .await
            .unwrap();
        assert!(matches!(outcome, LockOutcome::Acquired));
    }
}
