//! Lease manager (spec.md §4.2): service and tuner leases with TTL
//! renewal, re-entrant acquisition for the owning session, and a
//! startup-time wipe.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::database::Store;
use crate::domain::Lease;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn Store>,
    default_ttl_secs: u64,
}

/// Proof that `wipe_all` ran. Constructors are private to this module,
/// so the orchestrator can only be built after the wipe has completed —
/// the ordering `main.rs` must honor (spec.md §9).
pub struct LeasesWiped(());

impl LeaseManager {
    pub fn new(store: Arc<dyn Store>, default_ttl_secs: u64) -> Self {
        Self { store, default_ttl_secs }
    }

    /// Delete every lease record. Must run once at process startup,
    /// before any intent is accepted, since leases held by a prior
    /// process are meaningless once that process is gone.
    pub async fn wipe_all(&self) -> Result<LeasesWiped> {
        self.store.delete_all_leases().await?;
        Ok(LeasesWiped(()))
    }

    /// Attempt to acquire `key` for `owner`. Succeeds immediately if the
    /// existing holder is the same owner (re-entrant) or the lease has
    /// expired; otherwise returns `LeaseBusy`. The check and the write
    /// happen atomically in the store so two callers racing on the same
    /// key can never both succeed.
    pub async fn try_acquire(&self, key: &str, owner: &str) -> Result<Lease> {
        self.store.try_acquire_lease(key, owner, self.default_ttl_secs).await
    }

    /// Extend a held lease. Errors if `owner` no longer holds it — the
    /// caller should treat this as "lost the lease" and tear down.
    pub async fn renew(&self, key: &str, owner: &str) -> Result<Lease> {
        let mut lease = self
            .store
            .get_lease(key)
            .await?
            .ok_or_else(|| Error::LeaseBusy(key.to_string()))?;

        if lease.owner != owner {
            return Err(Error::LeaseBusy(key.to_string()));
        }

        lease.acquired_at = Utc::now();
        lease.generation += 1;
        self.store.put_lease(lease.clone()).await?;
        Ok(lease)
    }

    pub async fn release(&self, key: &str, owner: &str) -> Result<()> {
        if let Some(existing) = self.store.get_lease(key).await? {
            if existing.owner != owner {
                warn!(key, owner, held_by = %existing.owner, "release by non-owner ignored");
                return Ok(());
            }
        }
        self.store.delete_lease(key).await
    }

    /// Recommended renewal cadence: at most ttl/3, matching spec.md's
    /// "renewal cadence ≤ ttl/3" rule so a single missed tick cannot
    /// expire the lease before the next one lands.
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs((self.default_ttl_secs / 3).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;

    fn manager() -> LeaseManager {
        LeaseManager::new(Arc::new(InMemoryStore::new()), 30)
    }

    #[tokio::test]
    async fn fresh_acquire_succeeds() {
        let mgr = manager();
        let lease = mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        assert_eq!(lease.owner, "session-a");
    }

    #[tokio::test]
    async fn second_owner_is_rejected_while_held() {
        let mgr = manager();
        mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        let err = mgr.try_acquire("tuner:0", "session-b").await.unwrap_err();
        assert!(matches!(err, Error::LeaseBusy(_)));
    }

    #[tokio::test]
    async fn same_owner_reacquire_is_reentrant() {
        let mgr = manager();
        mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        let lease = mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        assert_eq!(lease.owner, "session-a");
    }

    #[tokio::test]
    async fn renew_by_non_owner_fails() {
        let mgr = manager();
        mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        let err = mgr.renew("tuner:0", "session-b").await.unwrap_err();
        assert!(matches!(err, Error::LeaseBusy(_)));
    }

    #[tokio::test]
    async fn release_then_reacquire_by_other_succeeds() {
        let mgr = manager();
        mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        mgr.release("tuner:0", "session-a").await.unwrap();
        let lease = mgr.try_acquire("tuner:0", "session-b").await.unwrap();
        assert_eq!(lease.owner, "session-b");
    }

    #[tokio::test]
    async fn concurrent_acquire_on_same_key_admits_exactly_one() {
        let mgr = Arc::new(manager());
        let mut handles = Vec::new();
        for i in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move { mgr.try_acquire("service:same-ref", &format!("session-{i}")).await }));
        }

        let mut wins = 0;
        let mut busy = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(Error::LeaseBusy(_)) => busy += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(busy, 7);
    }

    #[tokio::test]
    async fn wipe_all_clears_existing_leases() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = LeaseManager::new(store, 30);
        mgr.try_acquire("tuner:0", "session-a").await.unwrap();
        mgr.wipe_all().await.unwrap();
        let lease = mgr.try_acquire("tuner:0", "session-b").await.unwrap();
        assert_eq!(lease.owner, "session-b");
    }
}
