//! Per-session actor: owns one session's lifecycle end-to-end, wiring
//! the Session FSM (client-visible) to the Pipeline FSM (worker-internal)
//! and running the Hard Reset loop (spec.md §4.7).
//!
//! Each pipeline attempt runs as a single `PipelineSupervisor::run` call
//! that owns the `Pipeline` for its whole lifetime and only returns on a
//! terminal outcome. This actor's job is to race that call against its
//! own mailbox: a `Stop` arms a drain-grace timer rather than cancelling
//! immediately, `GetState`/`Feedback` are serviced without disturbing the
//! attempt, and once the grace timer (or an immediate force-stop) fires
//! the attempt's `CancellationToken` unwinds it cleanly.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::database::Store;
use crate::domain::{Pipeline, PipelineId, Profile, ReasonCode, SessionId};
use crate::eventbus::{Event, EventBus};
use crate::metrics::MetricsCollector;
use crate::pipeline::{PipelineOutcome, PipelineSupervisor};

use super::handle::ActorHandle;
use super::messages::SessionMessage;

static TUNER_ROUND_ROBIN: AtomicU32 = AtomicU32::new(0);

pub struct SessionActorConfig {
    pub hls_root: PathBuf,
    pub max_hard_resets: u32,
    pub hard_reset_window_secs: i64,
    pub drain_grace_secs: u64,
    pub tuner_count: u32,
}

pub fn spawn(
    session_id: SessionId,
    store: Arc<dyn Store>,
    supervisor: Arc<PipelineSupervisor>,
    event_bus: Arc<EventBus>,
    config: Arc<SessionActorConfig>,
    metrics: Arc<MetricsCollector>,
) -> ActorHandle<SessionMessage> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(session_id, store, supervisor, event_bus, config, metrics, rx));
    ActorHandle::new(tx)
}

/// What the inner attempt loop decided once an attempt future resolved.
enum AttemptResolution {
    /// Hard reset; start a fresh pipeline attempt immediately.
    Restart,
    /// Stop was requested and honored; the actor should exit.
    Stopped,
    /// The attempt failed terminally; the actor should exit.
    Failed,
}

async fn run(
    session_id: SessionId,
    store: Arc<dyn Store>,
    supervisor: Arc<PipelineSupervisor>,
    event_bus: Arc<EventBus>,
    config: Arc<SessionActorConfig>,
    metrics: Arc<MetricsCollector>,
    mut inbox: mpsc::Receiver<SessionMessage>,
) {
    let tuner_slot = TUNER_ROUND_ROBIN.fetch_add(1, Ordering::Relaxed) % config.tuner_count.max(1);

    let mut pipeline = match start_pipeline(&session_id, &store, &config, tuner_slot).await {
        Some(p) => p,
        None => return,
    };
    metrics.record_stream_start("new");

    loop {
        let profile = match load_profile(&session_id, &store).await {
            Some(p) => p,
            None => return,
        };
        let service_ref = match load_service_ref(&session_id, &store).await {
            Some(r) => r,
            None => return,
        };

        let cancel = CancellationToken::new();
        let (ready_tx, mut ready_rx) = oneshot::channel();
        let pipeline_id = pipeline.id;

        let outcome_fut = supervisor.run(pipeline, &service_ref, &profile, tuner_slot, &cancel, ready_tx);
        tokio::pin!(outcome_fut);

        let mut ready_fired = false;
        let mut stopping = false;
        let grace = tokio::time::sleep(Duration::from_secs(u64::MAX / 2));
        tokio::pin!(grace);

        let (returned_pipeline, outcome) = loop {
            tokio::select! {
                result = &mut outcome_fut => break result,
                Ok(origin_base) = &mut ready_rx, if !ready_fired => {
                    ready_fired = true;
                    let sid = session_id;
                    let _ = store
                        .update_session(sid, Box::new(move |s| s.pipeline_ready(pipeline_id, origin_base.clone())))
                        .await;
                }
                msg = inbox.recv(), if !stopping => {
                    match msg {
                        Some(SessionMessage::Stop) | None => {
                            let sid = session_id;
                            let _ = store.update_session(sid, Box::new(|s| s.stop())).await;
                            stopping = true;
                            grace.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(config.drain_grace_secs));
                        }
                        Some(SessionMessage::Feedback { event, code }) => {
                            info!(session_id = %session_id, event, code, "feedback received mid-attempt");
                        }
                        Some(SessionMessage::GetState(reply)) => {
                            if let Ok(session) = store.get_session(session_id).await {
                                let _ = reply.send(session);
                            }
                        }
                        Some(SessionMessage::GraceExpired) => {
                            stopping = true;
                            grace.as_mut().reset(tokio::time::Instant::now());
                        }
                    }
                }
                _ = &mut grace, if stopping => {
                    cancel.cancel();
                }
            }
        };
        pipeline = returned_pipeline;

        let resolution = match outcome {
            PipelineOutcome::HardReset { reason } => {
                if stopping {
                    supervisor.release_leases(&pipeline).await;
                    AttemptResolution::Stopped
                } else if record_reset_and_continue(&session_id, &store, &config, &reason).await {
                    event_bus.publish(
                        "session.hard_reset",
                        Event::HardReset { session_id: session_id.to_string(), reason },
                    );
                    AttemptResolution::Restart
                } else {
                    supervisor.release_leases(&pipeline).await;
                    AttemptResolution::Failed
                }
            }
            PipelineOutcome::Stopped => AttemptResolution::Stopped,
            PipelineOutcome::Failed { reason } => {
                supervisor.release_leases(&pipeline).await;
                let pipeline_id = pipeline.id;
                let sid = session_id;
                let _ = store
                    .update_session(sid, Box::new(move |s| s.pipeline_failed(pipeline_id, reason)))
                    .await;
                AttemptResolution::Failed
            }
        };

        match resolution {
            AttemptResolution::Restart => {
                match fresh_pipeline(&session_id, &store, &config, tuner_slot).await {
                    Some(p) => {
                        pipeline = p;
                        metrics.record_stream_start("hard_reset");
                    }
                    None => return,
                }
            }
            AttemptResolution::Stopped => {
                let sid = session_id;
                let _ = store.update_session(sid, Box::new(|s| s.worker_stopped())).await;
                return;
            }
            AttemptResolution::Failed => return,
        }
    }
}

async fn record_reset_and_continue(
    session_id: &SessionId,
    store: &Arc<dyn Store>,
    config: &Arc<SessionActorConfig>,
    reason: &str,
) -> bool {
    let max_resets = config.max_hard_resets;
    let window_secs = config.hard_reset_window_secs;
    let sid = *session_id;
    let reason = reason.to_string();

    let result = store
        .update_session(
            sid,
            Box::new(move |s| {
                let storm = s.record_reset(max_resets, window_secs);
                if storm {
                    s.pipeline_failed(s.pipeline_id.unwrap_or_default(), ReasonCode::ResetStorm)?;
                }
                Ok(())
            }),
        )
        .await;

    match result {
        Ok(s) => {
            if s.state.is_terminal() {
                warn!(session_id = %session_id, "reset storm budget exceeded");
                false
            } else {
                info!(session_id = %session_id, reason, "hard reset, restarting pipeline");
                true
            }
        }
        Err(_) => false,
    }
}

async fn start_pipeline(
    session_id: &SessionId,
    store: &Arc<dyn Store>,
    config: &Arc<SessionActorConfig>,
    _tuner_slot: u32,
) -> Option<Pipeline> {
    store.get_session(*session_id).await.ok()?;
    let work_dir = config.hls_root.join("sessions").join(session_id.to_string());
    Some(Pipeline::new(*session_id, format!("worker-{session_id}"), work_dir))
}

async fn fresh_pipeline(
    session_id: &SessionId,
    store: &Arc<dyn Store>,
    config: &Arc<SessionActorConfig>,
    tuner_slot: u32,
) -> Option<Pipeline> {
    let sid = *session_id;
    let new_pipeline_id = PipelineId::new();
    let _ = store
        .update_session(sid, Box::new(move |s| s.lease_acquired(new_pipeline_id)))
        .await;
    start_pipeline(session_id, store, config, tuner_slot).await.map(|mut p| {
        p.id = new_pipeline_id;
        p
    })
}

async fn load_profile(session_id: &SessionId, store: &Arc<dyn Store>) -> Option<Profile> {
    let session = store.get_session(*session_id).await.ok()?;
    Some(Profile::by_id(&session.profile_id))
}

async fn load_service_ref(session_id: &SessionId, store: &Arc<dyn Store>) -> Option<crate::domain::ServiceRef> {
    let session = store.get_session(*session_id).await.ok()?;
    Some(session.service_ref)
}
