//! Capabilities / streaming profile (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Ts,
    Fmp4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub container: Container,
    pub video_codec: String,
    pub audio_codec: String,
    pub dvr_window_sec: u32,
    pub hls_target_duration_sec: u32,
    /// Sticky fMP4 fallback, once activated, persists for the session's
    /// lifetime (spec.md GLOSSARY "Sticky fallback").
    pub fallback_active: bool,
}

impl Profile {
    /// The `safari` profile named in spec.md scenarios S1/S2: TS container,
    /// AAC-LC 48kHz stereo audio per spec.md §4.5.
    pub fn safari() -> Self {
        Self {
            id: "safari".to_string(),
            container: Container::Ts,
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            dvr_window_sec: 60,
            hls_target_duration_sec: 6,
            fallback_active: false,
        }
    }

    /// Flip to the sticky fMP4 fallback profile (feedback endpoint, §4.8).
    pub fn activate_fmp4_fallback(&mut self) {
        self.container = Container::Fmp4;
        self.fallback_active = true;
    }

    /// Resolve a session's `profileId` to a concrete `Profile`. Only
    /// `safari` and its sticky-fallback variant `fmp4` exist today.
    pub fn by_id(id: &str) -> Self {
        let mut profile = Self::safari();
        if id == "fmp4" {
            profile.activate_fmp4_fallback();
        }
        profile
    }
}
