//! Store contract (spec.md §4.1): key-value semantics over three
//! keyspaces (`session/<id>`, `lease/<key>`, `idem/<key>`), CAS updates,
//! snapshot-consistent-per-key iteration.

use async_trait::async_trait;

use crate::domain::{Lease, Session, SessionId};
use crate::error::{Error, Result};

/// Mutator applied to a session under `UpdateSession`'s read-modify-write.
/// Boxed so the trait stays object-safe (mirrors the teacher's
/// `Arc<dyn Repository>` style in `database::repositories`).
pub type SessionMutator = Box<dyn FnOnce(&mut Session) -> Result<()> + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, id: SessionId) -> Result<Session>;
    /// Invokes `mutator` at most once on success; on contention it may
    /// retry transparently.
    async fn update_session(&self, id: SessionId, mutator: SessionMutator) -> Result<Session>;
    async fn list_sessions(&self) -> Result<Vec<Session>>;
    async fn delete_session(&self, id: SessionId) -> Result<()>;

    async fn get_lease(&self, key: &str) -> Result<Option<Lease>>;
    async fn put_lease(&self, lease: Lease) -> Result<()>;
    async fn delete_lease(&self, key: &str) -> Result<()>;
    async fn delete_all_leases(&self) -> Result<()>;
    /// Atomic check-and-set: read the current holder of `key` and, if it is
    /// absent, expired, or already owned by `owner`, write a fresh lease in
    /// the same critical section. Two concurrent callers racing on the same
    /// key must never both observe "no live lease" — exactly one returns
    /// the new lease and the other `LeaseBusy`.
    async fn try_acquire_lease(&self, key: &str, owner: &str, ttl_secs: u64) -> Result<Lease>;

    async fn get_idem(&self, key: &str) -> Result<Option<SessionId>>;
    async fn put_idem(&self, key: &str, session_id: SessionId) -> Result<()>;
}

/// Helper: not-found mapping shared by both backends.
pub(crate) fn not_found(id: SessionId) -> Error {
    Error::not_found("Session", id.to_string())
}
