//! Orchestrator (spec.md §4.7): accepts intents, owns the map of live
//! session actors, and dispatches stop/feedback/state-query traffic to
//! them. The intent-accept path never touches leases or receiver I/O —
//! it persists to the Store and publishes to the Event Bus, then
//! returns, matching the non-blocking accept path spec.md §5 requires.

pub mod actor;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::database::Store;
use crate::domain::intent::{idempotency_key, IntentType};
use crate::domain::{Session, SessionId, SessionState};
use crate::error::{Error, Result};
use crate::eventbus::{Event, EventBus};
use crate::lease::LeasesWiped;
use crate::metrics::MetricsCollector;
use crate::pipeline::PipelineSupervisor;

use actor::{ActorHandle, SessionActorConfig, SessionMessage};

/// A client's "start service X under profile P" request (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub intent_type: IntentType,
    pub service_ref: crate::domain::ServiceRef,
    pub profile_id: String,
    pub owner: String,
    pub correlation_id: String,
    /// VOD start offset; unused (bucket 0) for live intents.
    pub start_ms: Option<i64>,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    supervisor: Arc<PipelineSupervisor>,
    event_bus: Arc<EventBus>,
    actor_config: Arc<SessionActorConfig>,
    metrics: Arc<MetricsCollector>,
    intent_secret: Vec<u8>,
    session_ttl_secs: i64,
    handles: DashMap<SessionId, ActorHandle<SessionMessage>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        supervisor: Arc<PipelineSupervisor>,
        event_bus: Arc<EventBus>,
        actor_config: Arc<SessionActorConfig>,
        metrics: Arc<MetricsCollector>,
        intent_secret: Vec<u8>,
        session_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            supervisor,
            event_bus,
            actor_config,
            metrics,
            intent_secret,
            session_ttl_secs,
            handles: DashMap::new(),
        }
    }

    /// Accept an intent: idempotency lookup, then either reuse an
    /// in-window live session or create a fresh one (spec.md §4.8, §9
    /// "retries reuse no state: a retry is a new sessionId").
    pub async fn accept_intent(&self, req: IntentRequest) -> Result<SessionId> {
        let key = idempotency_key(
            &self.intent_secret,
            req.intent_type,
            req.service_ref.as_str(),
            &req.profile_id,
            req.start_ms,
        );

        if let Some(existing_id) = self.store.get_idem(&key).await? {
            if let Ok(existing) = self.store.get_session(existing_id).await {
                if !existing.state.is_terminal() {
                    return Ok(existing_id);
                }
            }
            // Mapping points at a terminal or vanished session: the
            // idempotency window has effectively elapsed, fall through
            // and mint a fresh session.
        }

        let session = Session::new(
            req.service_ref,
            req.profile_id,
            req.owner,
            req.correlation_id,
            self.session_ttl_secs,
        );
        let session_id = session.id;

        self.store.create_session(session).await?;
        self.store.put_idem(&key, session_id).await?;

        self.event_bus.publish("session.start", Event::SessionStart { session_id: session_id.to_string() });

        let handle = actor::spawn(
            session_id,
            Arc::clone(&self.store),
            Arc::clone(&self.supervisor),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.actor_config),
            Arc::clone(&self.metrics),
        );
        self.handles.insert(session_id, handle);

        info!(session_id = %session_id, "intent accepted, session created");
        Ok(session_id)
    }

    pub async fn stop(&self, session_id: SessionId) -> Result<()> {
        match self.handles.get(&session_id) {
            Some(handle) => handle
                .send(SessionMessage::Stop)
                .await
                .map_err(|e| Error::Internal(format!("failed to signal stop: {e}"))),
            None => {
                // Actor already exited (session reached a terminal state
                // on its own); stopping it again is a no-op as long as it
                // still exists.
                self.store.get_session(session_id).await.map(|_| ())
            }
        }
    }

    pub async fn feedback(&self, session_id: SessionId, event: String, code: i64) -> Result<()> {
        match self.handles.get(&session_id) {
            Some(handle) => handle
                .send(SessionMessage::Feedback { event, code })
                .await
                .map_err(|e| Error::Internal(format!("failed to signal feedback: {e}"))),
            None => Err(Error::not_found("Session", session_id.to_string())),
        }
    }

    /// Fetch the session record: prefers asking the live actor (which
    /// owns any mid-attempt state not yet flushed) but falls back to a
    /// direct store read if the actor has already exited.
    pub async fn get_state(&self, session_id: SessionId) -> Result<Session> {
        if let Some(handle) = self.handles.get(&session_id) {
            let (tx, rx) = oneshot::channel();
            if handle.send(SessionMessage::GetState(tx)).await.is_ok() {
                if let Ok(session) = rx.await {
                    return Ok(session);
                }
            }
        }
        self.store.get_session(session_id).await
    }

    /// Re-drive every non-terminal session found in the store after a
    /// restart. Takes `LeasesWiped` by value so this can only be called
    /// once the lease keyspace wipe has actually run (spec.md §9).
    pub async fn resume_non_terminal_sessions(&self, _proof: LeasesWiped) -> Result<usize> {
        let sessions = self.store.list_sessions().await?;
        let mut resumed = 0;

        for session in sessions {
            if session.state.is_terminal() {
                continue;
            }
            if matches!(session.state, SessionState::New) {
                continue;
            }

            let handle = actor::spawn(
                session.id,
                Arc::clone(&self.store),
                Arc::clone(&self.supervisor),
                Arc::clone(&self.event_bus),
                Arc::clone(&self.actor_config),
                Arc::clone(&self.metrics),
            );
            self.handles.insert(session.id, handle);
            resumed += 1;
            warn!(session_id = %session.id, state = ?session.state, "resumed non-terminal session after restart");
        }

        Ok(resumed)
    }
}
