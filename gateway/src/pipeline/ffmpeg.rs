//! FFmpeg invocation: boundary flag set construction and process
//! lifecycle, grounded on the teacher's `downloader::engine::ffmpeg`
//! (graceful-stop-via-stdin, stderr-reader-task shape).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use process_utils::tokio_command;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::domain::{Container, Profile};
use crate::error::{Error, Result};

use super::stderr_parser::{parse_line, StreamEvent};

const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the FFmpeg argument vector for `profile`, reading from `input_url`
/// and writing an HLS playlist named `playlist_name` under `work_dir`.
///
/// Every flag here is load-bearing for source-timing isolation (spec.md
/// §4.5) and must not be dropped: genpts/igndts/ignidx absorb an
/// upstream that free-runs its own clock; avoid_negative_ts/global_header
/// keep the mux well-formed across a hard reset; the fixed GOP and
/// forced keyframes keep HLS segment boundaries predictable.
pub fn build_args(profile: &Profile, input_url: &str, work_dir: &Path, playlist_name: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    args.extend(
        [
            "-fflags",
            "+genpts+igndts+ignidx",
            "-err_detect",
            "ignore_err",
        ]
        .map(String::from),
    );

    args.extend(["-i".into(), input_url.to_string()]);

    args.extend(
        [
            "-avoid_negative_ts",
            "make_zero",
            "-flags",
            "+global_header",
        ]
        .map(String::from),
    );

    let gop = profile.hls_target_duration_sec.max(1) * 25; // assume 25fps source
    args.extend([
        "-g".to_string(),
        gop.to_string(),
        "-sc_threshold".to_string(),
        "0".to_string(),
        "-force_key_frames".to_string(),
        format!("expr:gte(t,n_forced*{})", profile.hls_target_duration_sec),
    ]);

    match profile.container {
        Container::Ts => {
            args.extend(
                [
                    "-mpegts_flags",
                    "+resend_headers+pat_pmt_at_frames",
                    "-x264-params",
                    "repeat-headers=1",
                ]
                .map(String::from),
            );
        }
        Container::Fmp4 => {
            args.extend(["-hls_segment_type".to_string(), "fmp4".to_string()]);
        }
    }

    if profile.video_codec == "h264" {
        args.extend(["-c:v".to_string(), "copy".to_string()]);
    }
    if profile.audio_codec == "aac" {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-ar".to_string(),
            "48000".to_string(),
            "-ac".to_string(),
            "2".to_string(),
        ]);
    }

    args.extend([
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        profile.hls_target_duration_sec.to_string(),
        "-hls_list_size".to_string(),
        (profile.dvr_window_sec / profile.hls_target_duration_sec.max(1)).to_string(),
        "-hls_flags".to_string(),
        "independent_segments+program_date_time".to_string(),
        work_dir.join(playlist_name).to_string_lossy().to_string(),
    ]);

    args
}

pub enum SupervisorEvent {
    Progress(super::stderr_parser::Progress),
    HardResetTrigger(String),
    SourceStalled,
    DecodeError,
    Exited(Option<i32>),
}

pub struct RunningProcess {
    child: Child,
    stdin_taken: bool,
}

impl RunningProcess {
    pub fn spawn(bin: &str, args: &[String], work_dir: &Path) -> Result<(Self, mpsc::Receiver<SupervisorEvent>)> {
        let mut cmd = tokio_command(bin);
        cmd.args(args)
            .current_dir(work_dir)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| Error::Internal(format!("failed to spawn ffmpeg: {e}")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("failed to capture ffmpeg stderr".into()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(watch_stderr(stderr, tx));

        Ok((Self { child, stdin_taken: false }, rx))
    }

    /// Ask FFmpeg to exit gracefully (`q` on stdin), falling back to kill.
    pub async fn stop(&mut self) -> Result<Option<i32>> {
        if !self.stdin_taken {
            if let Some(mut stdin) = self.child.stdin.take() {
                self.stdin_taken = true;
                let _ = stdin.write_all(b"q").await;
                let _ = stdin.flush().await;
                let _ = stdin.shutdown().await;
            }
        }

        match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => Ok(status.code()),
            Ok(Err(e)) => Err(Error::Internal(format!("error waiting for ffmpeg: {e}"))),
            Err(_) => {
                warn!("ffmpeg did not exit in time, killing");
                let _ = self.child.kill().await;
                let status = self.child.wait().await.map_err(|e| Error::Internal(e.to_string()))?;
                Ok(status.code())
            }
        }
    }

    pub async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await.map_err(|e| Error::Internal(e.to_string()))?;
        Ok(status.code())
    }
}

async fn watch_stderr(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<SupervisorEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    let mut last_progress_at = tokio::time::Instant::now();

    loop {
        let stall_check = tokio::time::sleep(Duration::from_secs(5));
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        debug!(target: "ffmpeg", "{text}");
                        match parse_line(&text) {
                            StreamEvent::Progress(p) => {
                                last_progress_at = tokio::time::Instant::now();
                                if tx.send(SupervisorEvent::Progress(p)).await.is_err() {
                                    return;
                                }
                            }
                            StreamEvent::ResolutionChanged { width, height } => {
                                let _ = tx
                                    .send(SupervisorEvent::HardResetTrigger(format!(
                                        "resolution changed to {width}x{height}"
                                    )))
                                    .await;
                            }
                            StreamEvent::CodecChanged { stream, codec } => {
                                let _ = tx
                                    .send(SupervisorEvent::HardResetTrigger(format!(
                                        "codec changed on {stream} to {codec}"
                                    )))
                                    .await;
                            }
                            StreamEvent::PmtVideoPidChanged { pmt_version, video_pid } => {
                                let _ = tx
                                    .send(SupervisorEvent::HardResetTrigger(format!(
                                        "pmt version {pmt_version} changed video pid to {video_pid}"
                                    )))
                                    .await;
                            }
                            StreamEvent::DecodeError => {
                                let _ = tx.send(SupervisorEvent::DecodeError).await;
                            }
                            StreamEvent::Unrecognized => {}
                        }
                    }
                    Ok(None) => {
                        return;
                    }
                    Err(e) => {
                        error!("error reading ffmpeg stderr: {e}");
                        return;
                    }
                }
            }
            _ = stall_check => {
                if last_progress_at.elapsed() >= Duration::from_secs(5) {
                    if tx.send(SupervisorEvent::SourceStalled).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
