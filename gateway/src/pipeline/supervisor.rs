//! Pipeline Supervisor (spec.md §4.5): drives one pipeline attempt from
//! lease acquisition through a running FFmpeg/HLS packager, reporting
//! Hard Reset triggers and terminal failures to the owning session actor.
//!
//! `run()` owns the whole attempt end to end and only returns on a
//! terminal outcome (Hard Reset, failure, or cancellation) so the caller
//! never has to juggle a borrow of `Pipeline` across its own `select!`.
//! Readiness is a mid-flight event, not a return value: it's reported
//! once through `ready_tx` while the attempt keeps running underneath.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Pipeline, PipelineState, Profile, ReasonCode, ServiceRef};
use crate::error::{Error, Result};
use crate::lease::LeaseManager;
use crate::metrics::MetricsCollector;
use crate::receiver::{ReadyChecker, ReceiverClient};

use super::ffmpeg::{build_args, RunningProcess, SupervisorEvent};

pub enum PipelineOutcome {
    /// A Hard Reset trigger fired; the caller should tear down and start
    /// a fresh pipeline attempt with a new timeline.
    HardReset { reason: String },
    Failed { reason: ReasonCode },
    /// Cancelled via the token; leases already released.
    Stopped,
}

pub struct PipelineSupervisor {
    lease_manager: Arc<LeaseManager>,
    receiver: Arc<ReceiverClient>,
    ready_checker: Arc<ReadyChecker>,
    ffmpeg_bin: String,
    hls_root: PathBuf,
    tune_timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl PipelineSupervisor {
    pub fn new(
        lease_manager: Arc<LeaseManager>,
        receiver: Arc<ReceiverClient>,
        ready_checker: Arc<ReadyChecker>,
        ffmpeg_bin: String,
        hls_root: PathBuf,
        tune_timeout: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { lease_manager, receiver, ready_checker, ffmpeg_bin, hls_root, tune_timeout, metrics }
    }

    /// Every Hard Reset is an ingest reset; additionally attribute it to
    /// the more specific counter its trigger reason names.
    fn record_hard_reset(&self, reason: &str) {
        self.metrics.record_ingest_reset();
        if reason.contains("pmt") {
            self.metrics.record_pmt_change();
        } else if reason.contains("resolution") || reason.contains("codec") {
            self.metrics.record_pts_jump();
        }
    }

    pub fn hls_root(&self) -> &PathBuf {
        &self.hls_root
    }

    /// Run one pipeline attempt to completion, or until `cancel` fires.
    /// Always returns ownership of `pipeline` back to the caller.
    /// `ready_tx` fires exactly once, with the HLS origin base path, the
    /// moment the packager produces its first playlist.
    pub async fn run(
        &self,
        mut pipeline: Pipeline,
        service_ref: &ServiceRef,
        profile: &Profile,
        tuner_slot: u32,
        cancel: &CancellationToken,
        ready_tx: oneshot::Sender<String>,
    ) -> (Pipeline, PipelineOutcome) {
        match self.run_inner(&mut pipeline, service_ref, profile, tuner_slot, cancel, ready_tx).await {
            Ok(outcome) => (pipeline, outcome),
            Err(e) => {
                warn!(error = %e, pipeline_id = %pipeline.id, "pipeline attempt failed");
                pipeline.state = PipelineState::Fail;
                (pipeline, PipelineOutcome::Failed { reason: reason_for_error(&e) })
            }
        }
    }

    async fn run_inner(
        &self,
        pipeline: &mut Pipeline,
        service_ref: &ServiceRef,
        profile: &Profile,
        tuner_slot: u32,
        cancel: &CancellationToken,
        ready_tx: oneshot::Sender<String>,
    ) -> Result<PipelineOutcome> {
        let owner = pipeline.session_id.to_string();

        pipeline.state = PipelineState::Leased;
        let service_lease = self.lease_manager.try_acquire(&service_ref.lease_key(), &owner).await?;
        pipeline.push_lease(service_lease.key.clone());
        let tuner_lease = self
            .lease_manager
            .try_acquire(&crate::domain::lease::tuner_key(tuner_slot), &owner)
            .await?;
        pipeline.push_lease(tuner_lease.key.clone());

        if cancel.is_cancelled() {
            self.release_leases(pipeline).await;
            return Ok(PipelineOutcome::Stopped);
        }

        pipeline.state = PipelineState::TuneRequested;
        self.receiver.zap(service_ref.as_str()).await?;

        pipeline.state = PipelineState::TuneVerifying;
        let contention_key = tuner_lease.key.clone();
        tokio::select! {
            result = self.ready_checker.wait_ready(&contention_key, service_ref, self.tune_timeout) => {
                result.map_err(|_| Error::TuneTimeout(service_ref.as_str().to_string()))?;
            }
            _ = cancel.cancelled() => {
                self.release_leases(pipeline).await;
                return Ok(PipelineOutcome::Stopped);
            }
        }

        pipeline.state = PipelineState::FfmpegStarting;
        let input_url = self.receiver.resolve_stream_url(service_ref.as_str()).await?;

        tokio::fs::create_dir_all(&pipeline.work_dir)
            .await
            .map_err(Error::Io)?;

        let playlist_name = "index.m3u8";
        let args = build_args(profile, &input_url, &pipeline.work_dir, playlist_name);
        info!(pipeline_id = %pipeline.id, %input_url, "starting ffmpeg");

        let (mut process, mut events) = RunningProcess::spawn(&self.ffmpeg_bin, &args, &pipeline.work_dir)?;

        let playlist_path = pipeline.work_dir.join(playlist_name);
        loop {
            if tokio::fs::metadata(&playlist_path).await.is_ok() {
                pipeline.state = PipelineState::PackagerReady;
                break;
            }

            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(SupervisorEvent::HardResetTrigger(reason)) => {
                            self.record_hard_reset(&reason);
                            let _ = process.stop().await;
                            return Ok(PipelineOutcome::HardReset { reason });
                        }
                        Some(SupervisorEvent::SourceStalled) => {
                            self.metrics.record_source_stall();
                            let _ = process.stop().await;
                            return Err(Error::UpstreamUnavailable("source stalled before first segment".into()));
                        }
                        Some(SupervisorEvent::DecodeError) => {
                            self.metrics.record_decode_error();
                            continue;
                        }
                        Some(SupervisorEvent::Exited(code)) => {
                            return Err(Error::Internal(format!("ffmpeg exited early with code {code:?}")));
                        }
                        Some(SupervisorEvent::Progress(_)) => continue,
                        None => {
                            return Err(Error::Internal("ffmpeg stderr watcher ended before first segment".into()));
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = process.stop().await;
                    self.release_leases(pipeline).await;
                    return Ok(PipelineOutcome::Stopped);
                }
                _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
            }
        }

        pipeline.state = PipelineState::Serving;
        let origin_base = format!("/sessions/{}/hls", pipeline.session_id);
        let _ = ready_tx.send(origin_base);

        self.supervise_running(pipeline, &mut process, &mut events, cancel).await
    }

    /// Watches the running attempt for the rest of its life: a Hard
    /// Reset trigger, a source stall, an unexpected exit, or
    /// cancellation from the session actor.
    async fn supervise_running(
        &self,
        pipeline: &mut Pipeline,
        process: &mut RunningProcess,
        events: &mut tokio::sync::mpsc::Receiver<SupervisorEvent>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(SupervisorEvent::HardResetTrigger(reason)) => {
                            self.record_hard_reset(&reason);
                            let _ = process.stop().await;
                            return Ok(PipelineOutcome::HardReset { reason });
                        }
                        Some(SupervisorEvent::SourceStalled) => {
                            self.metrics.record_source_stall();
                            let _ = process.stop().await;
                            return Err(Error::UpstreamUnavailable("source stalled > 5s".into()));
                        }
                        Some(SupervisorEvent::DecodeError) => {
                            self.metrics.record_decode_error();
                            continue;
                        }
                        Some(SupervisorEvent::Exited(code)) => {
                            return Err(Error::Internal(format!("ffmpeg exited with code {code:?}")));
                        }
                        Some(SupervisorEvent::Progress(_)) => continue,
                        None => return Err(Error::Internal("ffmpeg stderr watcher ended unexpectedly".into())),
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = process.stop().await;
                    self.release_leases(pipeline).await;
                    return Ok(PipelineOutcome::Stopped);
                }
            }
        }
    }

    /// Tear down a pipeline's leases in reverse acquisition order.
    pub async fn release_leases(&self, pipeline: &Pipeline) {
        let owner = pipeline.session_id.to_string();
        for key in pipeline.release_order() {
            if let Err(e) = self.lease_manager.release(&key, &owner).await {
                warn!(key, error = %e, "failed to release lease during teardown");
            }
        }
    }
}

fn reason_for_error(e: &Error) -> ReasonCode {
    match e {
        Error::LeaseBusy(_) => ReasonCode::LeaseBusy,
        Error::TuneTimeout(_) => ReasonCode::TuneTimeout,
        Error::UpstreamUnavailable(msg) if msg.contains("stalled") => ReasonCode::SourceStall,
        Error::UpstreamUnavailable(_) => ReasonCode::UpstreamUnavailable,
        Error::UpstreamResultFalse => ReasonCode::UpstreamResultFalse,
        _ => ReasonCode::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;

    fn supervisor() -> PipelineSupervisor {
        let store = Arc::new(InMemoryStore::new());
        let lease_manager = Arc::new(LeaseManager::new(store, 30));
        let receiver = Arc::new(ReceiverClient::new("http://127.0.0.1:1".to_string()));
        let ready_checker = Arc::new(ReadyChecker::new(Arc::clone(&receiver)));
        PipelineSupervisor::new(
            lease_manager,
            receiver,
            ready_checker,
            "ffmpeg".to_string(),
            PathBuf::from("/tmp/xg2g-supervisor-test"),
            Duration::from_secs(5),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[test]
    fn pmt_reset_counts_as_ingest_reset_and_pmt_change() {
        let sup = supervisor();
        sup.record_hard_reset("pmt version 3 changed video pid to 101");
        let snap = sup.metrics.snapshot();
        assert_eq!(snap.enigma_ingest_reset_total, 1);
        assert_eq!(snap.enigma_pmt_change_total, 1);
        assert_eq!(snap.enigma_pts_jump_total, 0);
    }

    #[test]
    fn resolution_reset_counts_as_ingest_reset_and_pts_jump() {
        let sup = supervisor();
        sup.record_hard_reset("resolution changed to 1280x720");
        let snap = sup.metrics.snapshot();
        assert_eq!(snap.enigma_ingest_reset_total, 1);
        assert_eq!(snap.enigma_pts_jump_total, 1);
        assert_eq!(snap.enigma_pmt_change_total, 0);
    }
}
