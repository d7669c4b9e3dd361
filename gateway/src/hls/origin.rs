//! HLS origin (spec.md §4.6): serves playlist/segment files with path
//! confinement, playlist normalization on every read, and the
//! READY/DRAINING → 200, NEW/STARTING-absent → 404, terminal → 410
//! status semantics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::database::Store;
use crate::domain::{Profile, SessionId, SessionState};
use crate::error::{Error, Result};

use super::paths::{confine, content_type};
use super::playlist::{normalize, NormalizeOptions};

const FILE_POLL_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POLL_STEP: Duration = Duration::from_millis(250);
const LAST_ACCESS_THROTTLE_SECS: i64 = 5;

pub enum OriginResponse {
    Ok { body: Vec<u8>, content_type: &'static str },
    NotFound,
    Gone,
}

pub struct HlsOrigin {
    hls_root: PathBuf,
    store: Arc<dyn Store>,
}

impl HlsOrigin {
    pub fn new(hls_root: PathBuf, store: Arc<dyn Store>) -> Self {
        Self { hls_root, store }
    }

    pub async fn get(&self, session_id: SessionId, filename: &str, profile: &Profile) -> Result<OriginResponse> {
        let session = match self.store.get_session(session_id).await {
            Ok(s) => s,
            Err(Error::NotFound { .. }) => return Ok(OriginResponse::NotFound),
            Err(e) => return Err(e),
        };

        let path = confine(&self.hls_root, session_id, filename)?;

        match session.state {
            SessionState::Failed | SessionState::Cancelled | SessionState::Expired => {
                return Ok(OriginResponse::Gone);
            }
            _ => {}
        }

        let bytes = match self.read_with_poll(&path, &session).await {
            Some(bytes) => bytes,
            None => return Ok(OriginResponse::NotFound),
        };

        self.maybe_touch_last_access(&session).await;

        let content_type = content_type(filename);
        let body = if filename == "index.m3u8" {
            let text = String::from_utf8_lossy(&bytes);
            let opts = NormalizeOptions {
                dvr_window_sec: profile.dvr_window_sec,
                is_live_or_event: !matches!(session.state, SessionState::Expired),
            };
            normalize(&text, &opts).into_bytes()
        } else {
            bytes
        };

        Ok(OriginResponse::Ok { body, content_type })
    }

    /// Playlist GETs that race the packager's first write poll for up to
    /// 5s in 250ms steps before giving up.
    async fn read_with_poll(&self, path: &PathBuf, session: &crate::domain::Session) -> Option<Vec<u8>> {
        if let Ok(bytes) = tokio::fs::read(path).await {
            return Some(bytes);
        }

        if !matches!(session.state, SessionState::New | SessionState::Starting) {
            return None;
        }

        let deadline = tokio::time::Instant::now() + FILE_POLL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(FILE_POLL_STEP).await;
            if let Ok(bytes) = tokio::fs::read(path).await {
                return Some(bytes);
            }
        }
        None
    }

    async fn maybe_touch_last_access(&self, session: &crate::domain::Session) {
        let now = Utc::now().timestamp();
        if now - session.last_access_unix < LAST_ACCESS_THROTTLE_SECS {
            return;
        }
        let id = session.id;
        if let Err(e) = self
            .store
            .update_session(
                id,
                Box::new(move |s| {
                    s.last_access_unix = now;
                    Ok(())
                }),
            )
            .await
        {
            warn!(session_id = %id, error = %e, "failed to throttle-update lastAccessUnix");
        }
    }
}
