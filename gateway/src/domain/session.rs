//! Session entity and its client-visible state machine (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{PipelineId, SessionId};
use super::reason::ReasonCode;
use super::service_ref::ServiceRef;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SessionState {
    New,
    Starting,
    Ready,
    Draining,
    Stopping,
    Failed,
    Cancelled,
    Expired,
}

impl SessionState {
    /// Terminal states are sticky: no further state change occurs.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Failed | SessionState::Cancelled | SessionState::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: SessionId,
    pub service_ref: ServiceRef,
    pub profile_id: String,
    pub owner: String,
    pub correlation_id: String,
    pub state: SessionState,
    pub reason: ReasonCode,
    pub pipeline_id: Option<PipelineId>,
    pub origin_base: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub last_access_unix: i64,
    /// Reset counter per session for hard-reset-storm detection (§4.7, §9
    /// open question: window is configurable, not hard-coded).
    pub reset_count: u32,
    pub reset_window_started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        service_ref: ServiceRef,
        profile_id: String,
        owner: String,
        correlation_id: String,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            service_ref,
            profile_id,
            owner,
            correlation_id,
            state: SessionState::Starting,
            reason: ReasonCode::Ok,
            pipeline_id: None,
            origin_base: None,
            created_at: now,
            ready_at: None,
            failed_at: None,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
            last_access_unix: now.timestamp(),
            reset_count: 0,
            reset_window_started_at: None,
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::SessionTerminal);
        }
        self.state = to;
        Ok(())
    }

    pub fn lease_acquired(&mut self, pipeline_id: PipelineId) -> Result<()> {
        if self.state != SessionState::Starting {
            return Err(Error::validation(format!(
                "lease_acquired invalid from {:?}",
                self.state
            )));
        }
        self.pipeline_id = Some(pipeline_id);
        Ok(())
    }

    pub fn pipeline_ready(&mut self, pipeline_id: PipelineId, origin_base: String) -> Result<()> {
        if self.pipeline_id != Some(pipeline_id) {
            return Err(Error::validation("pipeline_id mismatch on ready"));
        }
        self.ready_at = Some(Utc::now());
        self.origin_base = Some(origin_base);
        self.reason = ReasonCode::Ok;
        self.transition(SessionState::Ready)
    }

    pub fn pipeline_failed(&mut self, pipeline_id: PipelineId, reason: ReasonCode) -> Result<()> {
        if self.pipeline_id != Some(pipeline_id) {
            return Err(Error::validation("pipeline_id mismatch on failure"));
        }
        self.failed_at = Some(Utc::now());
        self.reason = reason;
        self.transition(SessionState::Failed)
    }

    pub fn stop(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Ready | SessionState::Starting) {
            return Err(Error::validation("stop invalid from this state"));
        }
        self.transition(SessionState::Draining)
    }

    pub fn grace_expired(&mut self) -> Result<()> {
        if self.state != SessionState::Draining {
            return Err(Error::validation("grace_expired requires draining"));
        }
        self.transition(SessionState::Stopping)
    }

    pub fn worker_stopped(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Stopping | SessionState::Draining) {
            return Err(Error::validation("worker_stopped invalid from this state"));
        }
        self.pipeline_id = None;
        self.origin_base = None;
        self.transition(SessionState::Expired)
    }

    pub fn cancel(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::New | SessionState::Starting) {
            return Err(Error::validation("cancel invalid from this state"));
        }
        self.reason = ReasonCode::Cancelled;
        self.transition(SessionState::Cancelled)
    }

    pub fn ttl_expired(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::SessionTerminal);
        }
        self.reason = ReasonCode::Expired;
        self.transition(SessionState::Expired)
    }

    /// Record a hard-reset occurrence; returns true if the reset budget
    /// (default 3 within 60s, configurable) is exceeded.
    pub fn record_reset(&mut self, max_resets: u32, window_secs: i64) -> bool {
        let now = Utc::now();
        let in_window = self
            .reset_window_started_at
            .map(|start| (now - start).num_seconds() < window_secs)
            .unwrap_or(false);

        if in_window {
            self.reset_count += 1;
        } else {
            self.reset_count = 1;
            self.reset_window_started_at = Some(now);
        }

        self.reset_count > max_resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Session {
        Session::new(
            ServiceRef::normalize("1:0:19:132F:3EF:1:C00000:0:0:0:").unwrap(),
            "safari".into(),
            "owner".into(),
            "corr-1".into(),
            300,
        )
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut s = fresh();
        s.cancel().unwrap();
        assert_eq!(s.state, SessionState::Cancelled);
        assert!(s.ttl_expired().is_err());
        assert_eq!(s.state, SessionState::Cancelled);
    }

    #[test]
    fn happy_path_to_ready() {
        let mut s = fresh();
        let pid = PipelineId::new();
        s.lease_acquired(pid).unwrap();
        s.pipeline_ready(pid, "http://host/sessions/x".into()).unwrap();
        assert_eq!(s.state, SessionState::Ready);
        assert!(s.ready_at.is_some());
    }

    #[test]
    fn pipeline_ready_rejects_mismatched_pipeline() {
        let mut s = fresh();
        let pid = PipelineId::new();
        s.lease_acquired(pid).unwrap();
        let other = PipelineId::new();
        assert!(s.pipeline_ready(other, "x".into()).is_err());
    }

    #[test]
    fn reset_storm_budget() {
        let mut s = fresh();
        assert!(!s.record_reset(3, 60));
        assert!(!s.record_reset(3, 60));
        assert!(!s.record_reset(3, 60));
        assert!(s.record_reset(3, 60));
    }
}
