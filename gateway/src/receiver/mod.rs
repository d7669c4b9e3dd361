//! Receiver Client (spec.md §4.3): thin HTTP client for the OpenWebIF
//! surface exposed by Enigma2 set-top boxes.

pub mod ready;
pub mod types;

pub use ready::ReadyChecker;

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub use types::{CurrentService, IntOrStr, Signal};

/// Count of `locked=false ∧ snr>50` inferences (spec.md §9 open question),
/// surfaced by the diagnostics endpoint.
static INFER_LOCKED_TOTAL: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

pub fn infer_locked_total() -> u64 {
    INFER_LOCKED_TOTAL.load(std::sync::atomic::Ordering::Relaxed)
}

#[derive(Clone)]
pub struct ReceiverClient {
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl ReceiverClient {
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self { http, base_url, max_retries: 3 }
    }

    /// Instruct the receiver to tune to `sref`.
    pub async fn zap(&self, sref: &str) -> Result<()> {
        let url = format!("{}/api/zap", self.base_url);
        let body: ZapResponse = self
            .get_with_retry(&url, &[("sRef", sref)])
            .await?
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("zap decode failed: {e}")))?;

        if !body.result {
            return Err(Error::UpstreamResultFalse);
        }
        Ok(())
    }

    pub async fn get_current(&self) -> Result<CurrentService> {
        let url = format!("{}/api/getcurrent", self.base_url);
        let raw: GetCurrentResponse = self
            .get_with_retry(&url, &[])
            .await?
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("getcurrent decode failed: {e}")))?;

        Ok(CurrentService {
            service_ref: raw.currservice_serviceref,
            service_name: raw.currservice_name,
        })
    }

    pub async fn get_signal(&self) -> Result<Signal> {
        let url = format!("{}/api/signal", self.base_url);
        let raw: SignalResponse = self
            .get_with_retry(&url, &[])
            .await?
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("signal decode failed: {e}")))?;

        let mut locked = raw.locked;
        let snr: i64 = raw.snr.into();
        if !locked && snr > 50 {
            // Empirical workaround (spec open question): some receivers
            // report locked=false transiently while snr is already solid.
            locked = true;
            INFER_LOCKED_TOTAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        Ok(Signal {
            snr,
            agc: raw.agc.into(),
            ber: raw.ber.into(),
            locked,
        })
    }

    /// Resolve the playable stream URL for `sref` by parsing the
    /// `/web/stream.m3u` body and returning its first `http://` line.
    pub async fn resolve_stream_url(&self, sref: &str) -> Result<String> {
        let url = format!("{}/web/stream.m3u", self.base_url);
        let body = self
            .get_with_retry(&url, &[("ref", sref)])
            .await?
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("stream.m3u read failed: {e}")))?;

        let first_url = body
            .lines()
            .find(|line| line.starts_with("http://") || line.starts_with("https://"))
            .ok_or_else(|| Error::UpstreamUnavailable("stream.m3u had no http(s) line".into()))?
            .trim()
            .to_string();

        if first_url.ends_with('/') && !first_url.to_uppercase().contains(&sref.to_uppercase()) {
            Ok(format!("{first_url}{}", sref.to_uppercase()))
        } else {
            Ok(first_url)
        }
    }

    async fn get_with_retry(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let result = self.http.get(url).query(query).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if attempt >= self.max_retries {
                        return Err(Error::UpstreamUnavailable(format!("{url} returned {status}")));
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt >= self.max_retries {
                        return Err(Error::UpstreamUnavailable(format!("{url} unreachable: {e}")));
                    }
                    warn!(url, attempt, "receiver request failed, retrying");
                }
                Err(e) => return Err(Error::UpstreamUnavailable(format!("{url} failed: {e}"))),
            }

            let backoff_ms = 50u64 * 2u64.pow(attempt);
            let jitter = rand::rng().random_range(0..=backoff_ms / 4 + 1);
            debug!(url, attempt, backoff_ms, "backing off before retry");
            tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
            attempt += 1;
        }
    }
}

#[derive(serde::Deserialize)]
struct ZapResponse {
    result: bool,
}

#[derive(serde::Deserialize)]
struct GetCurrentResponse {
    #[serde(default)]
    currservice_serviceref: String,
    #[serde(default)]
    currservice_name: String,
}

#[derive(serde::Deserialize)]
struct SignalResponse {
    #[serde(default)]
    snr: IntOrStr,
    #[serde(default)]
    agc: IntOrStr,
    #[serde(default)]
    ber: IntOrStr,
    #[serde(default)]
    locked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_appends_sref_when_trailing_slash_and_missing() {
        // Exercised indirectly via the same logic used in resolve_stream_url;
        // kept here as a documentation test for the exact rule.
        let base = "http://host/1:0:1:0:0:0:0:0:0:0/";
        let sref = "1:0:1:132f:3ef:1:c00000:0:0:0:";
        let upper = sref.to_uppercase();
        assert!(base.ends_with('/'));
        assert!(!base.to_uppercase().contains(&upper));
    }
}
