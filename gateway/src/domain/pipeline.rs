//! Pipeline entity and worker-internal state machine (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ids::{PipelineId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Init,
    Leased,
    TuneRequested,
    TuneVerifying,
    FfmpegStarting,
    PackagerReady,
    Serving,
    Stopping,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub session_id: SessionId,
    pub state: PipelineState,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub work_dir: PathBuf,
    /// Lease keys this pipeline owns; released in reverse acquisition
    /// order on terminal transition (§4.7).
    pub leases: Vec<String>,
}

impl Pipeline {
    pub fn new(session_id: SessionId, worker_id: String, work_dir: PathBuf) -> Self {
        Self {
            id: PipelineId::new(),
            session_id,
            state: PipelineState::Init,
            worker_id,
            started_at: Utc::now(),
            work_dir,
            leases: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PipelineState::Fail | PipelineState::Stopping)
    }

    pub fn push_lease(&mut self, key: String) {
        self.leases.push(key);
    }

    /// Lease keys in release order: reverse of acquisition order.
    pub fn release_order(&self) -> Vec<String> {
        let mut keys = self.leases.clone();
        keys.reverse();
        keys
    }
}
