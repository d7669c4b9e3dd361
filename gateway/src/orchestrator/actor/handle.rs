//! Generic actor handle with backpressure-aware sends, grounded on the
//! teacher's `scheduler::actor::handle::ActorHandle` (try_send fast path,
//! timeout-bounded `reserve()` slow path).

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    ActorStopped,
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "actor has stopped"),
            SendError::Timeout => write!(f, "send timed out"),
        }
    }
}

impl std::error::Error for SendError {}

#[derive(Clone)]
pub struct ActorHandle<M> {
    sender: mpsc::Sender<M>,
}

impl<M> ActorHandle<M> {
    pub fn new(sender: mpsc::Sender<M>) -> Self {
        Self { sender }
    }

    /// Fast path `try_send`; on a full mailbox, falls back to a
    /// timeout-bounded `reserve()` rather than blocking indefinitely.
    pub async fn send(&self, msg: M) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    pub fn try_send(&self, msg: M) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::Timeout),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }
}
