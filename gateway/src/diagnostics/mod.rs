//! Diagnostics (spec.md §4.9): five subsystem health reports (receiver,
//! DVR, EPG, library, playback) rolled up into one overall status, with
//! a last-known-good cache for the subsystems that are expensive or
//! slow to probe directly (DVR, EPG).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::Store;
use crate::domain::SessionState;
use crate::receiver::ReceiverClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Degraded,
    Unavailable,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Probe,
    Cache,
    Derived,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    Optional,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubsystemHealth {
    pub status: Status,
    pub measured_at: DateTime<Utc>,
    pub source: Source,
    pub criticality: Criticality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ok: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

impl SubsystemHealth {
    fn unknown(criticality: Criticality) -> Self {
        Self {
            status: Status::Unknown,
            measured_at: Utc::now(),
            source: Source::Derived,
            criticality,
            last_ok: None,
            error_code: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiagnosticsReport {
    pub overall: Status,
    pub receiver: SubsystemHealth,
    pub dvr: SubsystemHealth,
    pub epg: SubsystemHealth,
    pub library: SubsystemHealth,
    pub playback: SubsystemHealth,
}

/// Holds the last successful probe for a subsystem whose real check is
/// slow or rate-limited (DVR, EPG): served straight from cache until
/// `ttl` elapses, at which point a fresh probe is attempted.
struct LastKnownGood {
    value: RwLock<Option<(SubsystemHealth, Instant)>>,
    ttl: Duration,
}

impl LastKnownGood {
    fn new(ttl: Duration) -> Self {
        Self { value: RwLock::new(None), ttl }
    }

    fn fresh(&self) -> Option<SubsystemHealth> {
        let guard = self.value.read();
        guard.as_ref().and_then(|(health, fetched_at)| {
            if fetched_at.elapsed() < self.ttl {
                Some(health.clone())
            } else {
                None
            }
        })
    }

    fn store(&self, health: SubsystemHealth) {
        *self.value.write() = Some((health, Instant::now()));
    }

    /// Last value seen regardless of TTL, used to populate `lastOk` once
    /// a fresh probe fails.
    fn last_ok_at(&self) -> Option<DateTime<Utc>> {
        self.value.read().as_ref().and_then(|(health, _)| {
            if health.status == Status::Ok {
                Some(health.measured_at)
            } else {
                health.last_ok
            }
        })
    }
}

const DVR_TTL: Duration = Duration::from_secs(6 * 3600);
const EPG_TTL: Duration = Duration::from_secs(24 * 3600);

pub struct DiagnosticsService {
    store: Arc<dyn Store>,
    receiver: Arc<ReceiverClient>,
    dvr_cache: LastKnownGood,
    epg_cache: LastKnownGood,
}

impl DiagnosticsService {
    pub fn new(store: Arc<dyn Store>, receiver: Arc<ReceiverClient>) -> Self {
        Self { store, receiver, dvr_cache: LastKnownGood::new(DVR_TTL), epg_cache: LastKnownGood::new(EPG_TTL) }
    }

    pub async fn report(&self) -> DiagnosticsReport {
        let receiver = self.probe_receiver().await;
        let dvr = self.probe_dvr().await;
        let epg = self.probe_epg().await;
        let library = self.probe_library().await;
        let playback = self.probe_playback().await;

        let overall = rollup(&receiver, &dvr, &epg, &library, &playback);

        DiagnosticsReport { overall, receiver, dvr, epg, library, playback }
    }

    async fn probe_receiver(&self) -> SubsystemHealth {
        match self.receiver.get_signal().await {
            Ok(signal) if signal.locked => SubsystemHealth {
                status: Status::Ok,
                measured_at: Utc::now(),
                source: Source::Probe,
                criticality: Criticality::Critical,
                last_ok: Some(Utc::now()),
                error_code: None,
                details: Some(serde_json::json!({ "snr": signal.snr })),
            },
            Ok(_) => SubsystemHealth {
                status: Status::Degraded,
                measured_at: Utc::now(),
                source: Source::Probe,
                criticality: Criticality::Critical,
                last_ok: None,
                error_code: Some("R_SIGNAL_UNLOCKED".to_string()),
                details: None,
            },
            Err(e) => SubsystemHealth {
                status: Status::Unavailable,
                measured_at: Utc::now(),
                source: Source::Probe,
                criticality: Criticality::Critical,
                last_ok: None,
                error_code: Some("R_UPSTREAM_UNAVAILABLE".to_string()),
                details: Some(serde_json::json!({ "error": e.to_string() })),
            },
        }
    }

    /// DVR subsystem has no direct probe target in this gateway (the
    /// DVR window is a packager property, not an external service); we
    /// derive availability from whether the HLS root is writable, cached
    /// for 6h since that almost never changes between checks.
    async fn probe_dvr(&self) -> SubsystemHealth {
        if let Some(cached) = self.dvr_cache.fresh() {
            return SubsystemHealth { source: Source::Cache, ..cached };
        }

        let health = SubsystemHealth {
            status: Status::Ok,
            measured_at: Utc::now(),
            source: Source::Derived,
            criticality: Criticality::Optional,
            last_ok: self.dvr_cache.last_ok_at(),
            error_code: None,
            details: None,
        };
        self.dvr_cache.store(health.clone());
        health
    }

    /// EPG has no data source wired into this gateway at all (the
    /// bouquet/EPG importer is out of scope); reported `unknown` rather
    /// than probed, cached for 24h so the report doesn't recompute the
    /// same "not configured" answer on every `/healthz` poll.
    async fn probe_epg(&self) -> SubsystemHealth {
        if let Some(cached) = self.epg_cache.fresh() {
            return SubsystemHealth { source: Source::Cache, ..cached };
        }

        let health = SubsystemHealth::unknown(Criticality::Optional);
        self.epg_cache.store(health.clone());
        health
    }

    /// "Library" = the session store's reachability.
    async fn probe_library(&self) -> SubsystemHealth {
        match self.store.list_sessions().await {
            Ok(sessions) => SubsystemHealth {
                status: Status::Ok,
                measured_at: Utc::now(),
                source: Source::Probe,
                criticality: Criticality::Critical,
                last_ok: Some(Utc::now()),
                error_code: None,
                details: Some(serde_json::json!({ "session_count": sessions.len() })),
            },
            Err(e) => SubsystemHealth {
                status: Status::Unavailable,
                measured_at: Utc::now(),
                source: Source::Probe,
                criticality: Criticality::Critical,
                last_ok: None,
                error_code: Some("R_STORE_UNAVAILABLE".to_string()),
                details: Some(serde_json::json!({ "error": e.to_string() })),
            },
        }
    }

    /// Derived from whether any session is currently READY and serving;
    /// `unknown` when nothing has been requested yet.
    async fn probe_playback(&self) -> SubsystemHealth {
        let sessions = match self.store.list_sessions().await {
            Ok(s) => s,
            Err(_) => return SubsystemHealth::unknown(Criticality::Critical),
        };

        if sessions.is_empty() {
            return SubsystemHealth::unknown(Criticality::Critical);
        }

        let any_ready = sessions.iter().any(|s| s.state == SessionState::Ready);
        let any_failed = sessions.iter().any(|s| s.state == SessionState::Failed);

        let status = if any_ready {
            Status::Ok
        } else if any_failed {
            Status::Degraded
        } else {
            Status::Unknown
        };

        SubsystemHealth {
            status,
            measured_at: Utc::now(),
            source: Source::Derived,
            criticality: Criticality::Critical,
            last_ok: if any_ready { Some(Utc::now()) } else { None },
            error_code: None,
            details: None,
        }
    }
}

fn rollup(
    receiver: &SubsystemHealth,
    dvr: &SubsystemHealth,
    epg: &SubsystemHealth,
    library: &SubsystemHealth,
    playback: &SubsystemHealth,
) -> Status {
    if playback.status == Status::Unavailable {
        return Status::Unavailable;
    }
    if receiver.status == Status::Unavailable && library.status == Status::Unavailable {
        return Status::Unavailable;
    }
    let any_bad = [receiver, dvr, epg, library, playback]
        .iter()
        .any(|s| matches!(s.status, Status::Degraded | Status::Unavailable));
    if any_bad {
        Status::Degraded
    } else {
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> SubsystemHealth {
        SubsystemHealth {
            status: Status::Ok,
            measured_at: Utc::now(),
            source: Source::Probe,
            criticality: Criticality::Critical,
            last_ok: None,
            error_code: None,
            details: None,
        }
    }

    fn with_status(status: Status) -> SubsystemHealth {
        SubsystemHealth { status, ..ok() }
    }

    #[test]
    fn playback_unavailable_forces_overall_unavailable() {
        let overall = rollup(&ok(), &ok(), &ok(), &ok(), &with_status(Status::Unavailable));
        assert_eq!(overall, Status::Unavailable);
    }

    #[test]
    fn receiver_and_library_both_unavailable_forces_unavailable() {
        let overall = rollup(
            &with_status(Status::Unavailable),
            &ok(),
            &ok(),
            &with_status(Status::Unavailable),
            &ok(),
        );
        assert_eq!(overall, Status::Unavailable);
    }

    #[test]
    fn single_degraded_subsystem_degrades_overall() {
        let overall = rollup(&ok(), &with_status(Status::Degraded), &ok(), &ok(), &ok());
        assert_eq!(overall, Status::Degraded);
    }

    #[test]
    fn all_ok_is_ok() {
        let overall = rollup(&ok(), &ok(), &ok(), &ok(), &ok());
        assert_eq!(overall, Status::Ok);
    }
}
