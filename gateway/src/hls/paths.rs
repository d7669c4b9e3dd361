//! Path confinement and filename validation for the HLS origin
//! (spec.md §4.6): filename must be a recognized basename and the
//! resolved path must stay under the session's own directory.

use std::path::{Path, PathBuf};

use crate::domain::SessionId;
use crate::error::{Error, Result};

pub fn is_valid_filename(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return false;
    }
    name == "index.m3u8"
        || name == "init.mp4"
        || is_segment_name(name, "ts")
        || is_segment_name(name, "m4s")
}

fn is_segment_name(name: &str, ext: &str) -> bool {
    let Some(stem) = name.strip_prefix("seg_") else { return false };
    let Some(digits) = stem.strip_suffix(&format!(".{ext}")) else { return false };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Resolve `filename` under `<hls_root>/sessions/<session_id>/`, rejecting
/// anything that would escape that directory.
pub fn confine(hls_root: &Path, session_id: SessionId, filename: &str) -> Result<PathBuf> {
    if !is_valid_filename(filename) {
        return Err(Error::PathConfinement(format!("rejected filename {filename:?}")));
    }

    let session_dir = hls_root.join("sessions").join(session_id.to_string());
    let candidate = session_dir.join(filename);

    // Lexical confinement: filename is already validated basename-only so
    // no `..`/separator traversal can occur; this guards against a future
    // relaxation of `is_valid_filename` silently becoming unsafe.
    if candidate.parent() != Some(session_dir.as_path()) {
        return Err(Error::PathConfinement(format!("path escaped session dir: {candidate:?}")));
    }

    Ok(candidate)
}

pub fn content_type(filename: &str) -> &'static str {
    if filename == "index.m3u8" {
        "application/vnd.apple.mpegurl"
    } else if filename == "init.mp4" {
        "video/mp4"
    } else if filename.ends_with(".m4s") {
        "video/iso.segment"
    } else {
        "video/MP2T"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_names() {
        assert!(is_valid_filename("index.m3u8"));
        assert!(is_valid_filename("init.mp4"));
        assert!(is_valid_filename("seg_00001.ts"));
        assert!(is_valid_filename("seg_42.m4s"));
    }

    #[test]
    fn rejects_traversal() {
        assert!(!is_valid_filename("../index.m3u8"));
        assert!(!is_valid_filename("seg_1.ts/../../etc/passwd"));
        assert!(!is_valid_filename("a\\b"));
    }

    #[test]
    fn rejects_non_digit_segment_names() {
        assert!(!is_valid_filename("seg_.ts"));
        assert!(!is_valid_filename("seg_1a.ts"));
        assert!(!is_valid_filename("seg_1.mp4"));
    }

    #[test]
    fn confine_rejects_bad_filename_before_touching_fs() {
        let err = confine(Path::new("/hls"), SessionId::new(), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, Error::PathConfinement(_)));
    }
}
