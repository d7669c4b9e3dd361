//! Pipeline Supervisor (C5): FFmpeg spawning, stderr-driven Hard Reset
//! detection, and lease lifecycle for a single pipeline attempt.

pub mod ffmpeg;
pub mod stderr_parser;
pub mod supervisor;

pub use supervisor::{PipelineOutcome, PipelineSupervisor};
