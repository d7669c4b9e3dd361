//! In-memory `Store` for tests and local dev without sqlite.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::{Lease, Session, SessionId};
use crate::error::Result;

use super::store::{not_found, SessionMutator, Store};

#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    leases: Mutex<HashMap<String, Lease>>,
    idem: Mutex<HashMap<String, SessionId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        self.sessions.lock().insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session> {
        self.sessions.lock().get(&id).cloned().ok_or_else(|| not_found(id))
    }

    async fn update_session(&self, id: SessionId, mutator: SessionMutator) -> Result<Session> {
        let mut guard = self.sessions.lock();
        let session = guard.get_mut(&id).ok_or_else(|| not_found(id))?;
        mutator(session)?;
        Ok(session.clone())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.lock().values().cloned().collect())
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        self.sessions.lock().remove(&id);
        Ok(())
    }

    async fn get_lease(&self, key: &str) -> Result<Option<Lease>> {
        Ok(self.leases.lock().get(key).cloned())
    }

    async fn put_lease(&self, lease: Lease) -> Result<()> {
        self.leases.lock().insert(lease.key.clone(), lease);
        Ok(())
    }

    async fn delete_lease(&self, key: &str) -> Result<()> {
        self.leases.lock().remove(key);
        Ok(())
    }

    async fn delete_all_leases(&self) -> Result<()> {
        self.leases.lock().clear();
        Ok(())
    }

    async fn try_acquire_lease(&self, key: &str, owner: &str, ttl_secs: u64) -> Result<Lease> {
        let mut guard = self.leases.lock();
        let now = chrono::Utc::now();

        if let Some(existing) = guard.get(key) {
            if existing.owner == owner && !existing.is_expired(now) {
                return Ok(existing.clone());
            }
            if !existing.is_expired(now) {
                return Err(crate::error::Error::LeaseBusy(key.to_string()));
            }
        }

        let generation = guard.get(key).map(|l| l.generation + 1).unwrap_or(1);
        let lease = Lease {
            key: key.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            ttl_seconds: ttl_secs,
            generation,
        };
        guard.insert(key.to_string(), lease.clone());
        Ok(lease)
    }

    async fn get_idem(&self, key: &str) -> Result<Option<SessionId>> {
        Ok(self.idem.lock().get(key).copied())
    }

    async fn put_idem(&self, key: &str, session_id: SessionId) -> Result<()> {
        self.idem.lock().insert(key.to_string(), session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceRef;

    fn sample() -> Session {
        Session::new(
            ServiceRef::normalize("1:0:19:132F:3EF:1:C00000:0:0:0:").unwrap(),
            "safari".into(),
            "owner".into(),
            "corr".into(),
            300,
        )
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = InMemoryStore::new();
        let session = sample();
        let id = session.id;
        store.create_session(session).await.unwrap();
        let fetched = store.get_session(id).await.unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn update_session_applies_mutator() {
        let store = InMemoryStore::new();
        let session = sample();
        let id = session.id;
        store.create_session(session).await.unwrap();

        store
            .update_session(id, Box::new(|s| s.cancel()))
            .await
            .unwrap();

        let fetched = store.get_session(id).await.unwrap();
        assert_eq!(fetched.state, crate::domain::SessionState::Cancelled);
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get_session(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_all_leases_clears_everything() {
        let store = InMemoryStore::new();
        store
            .put_lease(Lease {
                key: "tuner:0".into(),
                owner: "sess-1".into(),
                acquired_at: chrono::Utc::now(),
                ttl_seconds: 30,
                generation: 1,
            })
            .await
            .unwrap();
        store.delete_all_leases().await.unwrap();
        assert!(store.get_lease("tuner:0").await.unwrap().is_none());
    }
}
