//! Ready Checker (spec.md §4.4): jittered polling with debounce and a
//! single-flight guard so two sessions starting the same channel share
//! one probe stream, grounded on the single-flight dashmap pattern used
//! by the teacher's scheduler for in-flight job coalescing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::ServiceRef;
use crate::error::{Error, Result};

use super::ReceiverClient;

const DEFAULT_DEBOUNCE_N: u32 = 2;
const BASE_POLL: Duration = Duration::from_millis(250);
const JITTER_FRACTION: f64 = 0.2;

pub struct ReadyChecker {
    client: Arc<ReceiverClient>,
    in_flight: DashMap<String, broadcast::Sender<std::result::Result<(), String>>>,
}

impl ReadyChecker {
    pub fn new(client: Arc<ReceiverClient>) -> Self {
        Self { client, in_flight: DashMap::new() }
    }

    /// Block until the receiver reports `expected` (already normalized)
    /// and signal-locked for `debounce_n` consecutive polls, or `timeout`
    /// elapses.
    pub async fn wait_ready(
        &self,
        contention_key: &str,
        expected: &ServiceRef,
        timeout: Duration,
    ) -> Result<()> {
        // Single-flight: either join an in-flight probe for this tuner, or
        // become the leader that actually polls.
        let tx = match self.in_flight.entry(contention_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                let mut rx = e.get().subscribe();
                drop(e);
                return Self::await_broadcast(&mut rx, timeout).await;
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let (tx, _rx) = broadcast::channel(1);
                e.insert(tx.clone());
                tx
            }
        };

        let result = self.poll_until_ready(expected, timeout).await;
        let broadcast_result = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        let _ = tx.send(broadcast_result);
        self.in_flight.remove(contention_key);
        result
    }

    async fn await_broadcast(
        rx: &mut broadcast::Receiver<std::result::Result<(), String>>,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(msg))) => Err(Error::TuneTimeout(msg)),
            Ok(Err(_)) => Err(Error::Internal("ready-checker broadcast dropped".into())),
            Err(_) => Err(Error::TuneTimeout(format!("ready-checker timed out after {timeout:?}"))),
        }
    }

    async fn poll_until_ready(&self, expected: &ServiceRef, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut debounce = 0u32;

        loop {
            if Instant::now() >= deadline {
                return Err(Error::TuneTimeout(format!("ready timeout waiting for {}", expected.as_str())));
            }

            let outcome = self.probe_once(expected).await;
            match outcome {
                Ok(true) => {
                    debounce += 1;
                    if debounce >= DEFAULT_DEBOUNCE_N {
                        return Ok(());
                    }
                }
                Ok(false) => {
                    debounce = 0;
                }
                Err(e) => {
                    debounce = 0;
                    warn!(error = %e, "ready probe failed, resetting debounce");
                }
            }

            tokio::time::sleep(jittered_interval()).await;
        }
    }

    async fn probe_once(&self, expected: &ServiceRef) -> Result<bool> {
        let current = self.client.get_current().await?;
        let normalized_current = ServiceRef::normalize(&current.service_ref);
        let ref_matches = normalized_current.as_ref() == Some(expected);
        if !ref_matches {
            debug!(expected = expected.as_str(), actual = %current.service_ref, "ready probe: wrong ref");
            return Ok(false);
        }

        let signal = self.client.get_signal().await?;
        Ok(signal.locked)
    }
}

fn jittered_interval() -> Duration {
    let jitter_ms = (BASE_POLL.as_millis() as f64 * JITTER_FRACTION) as i64;
    let offset = rand::rng().random_range(-jitter_ms..=jitter_ms);
    let millis = (BASE_POLL.as_millis() as i64 + offset).max(1) as u64;
    Duration::from_millis(millis)
}
