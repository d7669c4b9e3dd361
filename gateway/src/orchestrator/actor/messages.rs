//! Messages accepted by a session actor's mailbox (spec.md §4.7, §5):
//! client-facing intents, plus internal notifications from the lease
//! renewer and pipeline supervisor, all serialized through one inbox.

use tokio::sync::oneshot;

use crate::domain::Session;

#[derive(Debug)]
pub enum SessionMessage {
    Stop,
    Feedback { event: String, code: i64 },
    GetState(oneshot::Sender<Session>),
    /// Grace period after `Stop` elapsed; force the worker down.
    GraceExpired,
}
