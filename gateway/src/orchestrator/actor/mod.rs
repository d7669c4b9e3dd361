//! Per-session actor plumbing: mailbox handle, message types, and the
//! actor loop itself (spec.md §4.7).

pub mod handle;
pub mod messages;
pub mod session_actor;

pub use handle::ActorHandle;
pub use messages::SessionMessage;
pub use session_actor::{SessionActorConfig, spawn};
