//! Domain model: sessions, pipelines, leases, service refs, profiles.

pub mod ids;
pub mod intent;
pub mod lease;
pub mod pipeline;
pub mod profile;
pub mod reason;
pub mod service_ref;
pub mod session;

pub use ids::{PipelineId, SessionId};
pub use lease::Lease;
pub use pipeline::{Pipeline, PipelineState};
pub use profile::{Container, Profile};
pub use reason::ReasonCode;
pub use service_ref::ServiceRef;
pub use session::{Session, SessionState};
