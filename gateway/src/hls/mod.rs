//! HLS Packager / Origin (C6): path confinement, playlist normalization,
//! and the status-code semantics for serving session output.

pub mod origin;
pub mod paths;
pub mod playlist;

pub use origin::{HlsOrigin, OriginResponse};
