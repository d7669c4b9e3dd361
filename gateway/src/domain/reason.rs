//! Reason taxonomy (spec.md §7), propagated verbatim in session records
//! and metrics labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ReasonCode {
    Ok,
    Cancelled,
    Expired,
    LeaseBusy,
    LimitConcurrency,
    TuneTimeout,
    UpstreamUnavailable,
    UpstreamResultFalse,
    FfmpegExit(i32),
    SourceStall,
    ResetStorm,
    Contract,
    Internal,
    ClientStop,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonCode::Ok => write!(f, "R_OK"),
            ReasonCode::Cancelled => write!(f, "R_CANCELLED"),
            ReasonCode::Expired => write!(f, "R_EXPIRED"),
            ReasonCode::LeaseBusy => write!(f, "R_LEASE_BUSY"),
            ReasonCode::LimitConcurrency => write!(f, "R_LIMIT_CONCURRENCY"),
            ReasonCode::TuneTimeout => write!(f, "R_TUNE_TIMEOUT"),
            ReasonCode::UpstreamUnavailable => write!(f, "R_UPSTREAM_UNAVAILABLE"),
            ReasonCode::UpstreamResultFalse => write!(f, "R_UPSTREAM_RESULT_FALSE"),
            ReasonCode::FfmpegExit(code) => write!(f, "R_FFMPEG_EXIT_{code}"),
            ReasonCode::SourceStall => write!(f, "R_SOURCE_STALL"),
            ReasonCode::ResetStorm => write!(f, "R_RESET_STORM"),
            ReasonCode::Contract => write!(f, "R_CONTRACT"),
            ReasonCode::Internal => write!(f, "R_INTERNAL"),
            ReasonCode::ClientStop => write!(f, "R_CLIENT_STOP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_exit_carries_code() {
        assert_eq!(ReasonCode::FfmpegExit(137).to_string(), "R_FFMPEG_EXIT_137");
    }
}
