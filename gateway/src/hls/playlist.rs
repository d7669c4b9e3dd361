//! Playlist normalization on read (spec.md §4.6) and truth extraction for
//! diagnostics. Normalization is line-oriented by hand — an `m3u8-rs`
//! round trip would re-serialize tags the spec requires byte-stable, so
//! only PDT/header rewriting touches the text; `m3u8-rs` is used purely
//! for read-side validation (truth extraction) where its parser buys
//! correctness we would not want to hand-roll twice.

use chrono::DateTime;

pub struct NormalizeOptions {
    pub dvr_window_sec: u32,
    pub is_live_or_event: bool,
}

/// Apply the three mandatory rewrites: strict RFC 3339 PDT, EVENT/START
/// injection when DVR is enabled, and `#EXT-X-INDEPENDENT-SEGMENTS`.
pub fn normalize(raw: &str, opts: &NormalizeOptions) -> String {
    let mut lines: Vec<String> = raw.lines().map(normalize_pdt_line).collect();

    if !lines.iter().any(|l| l.trim() == "#EXT-X-INDEPENDENT-SEGMENTS") {
        if let Some(pos) = lines.iter().position(|l| l.trim() == "#EXTM3U") {
            lines.insert(pos + 1, "#EXT-X-INDEPENDENT-SEGMENTS".to_string());
        }
    }

    if opts.dvr_window_sec > 0 && opts.is_live_or_event {
        if let Some(pos) = lines.iter().position(|l| l.trim() == "#EXTM3U") {
            let already_event = lines.iter().any(|l| l.starts_with("#EXT-X-PLAYLIST-TYPE"));
            let mut insert_at = pos + 1;
            if !already_event {
                lines.insert(insert_at, "#EXT-X-PLAYLIST-TYPE:EVENT".to_string());
                insert_at += 1;
            }
            let has_start = lines.iter().any(|l| l.starts_with("#EXT-X-START"));
            if !has_start {
                lines.insert(
                    insert_at,
                    format!("#EXT-X-START:TIME-OFFSET=-{},PRECISE=YES", opts.dvr_window_sec),
                );
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn normalize_pdt_line(line: &str) -> String {
    let Some(rest) = line.strip_prefix("#EXT-X-PROGRAM-DATE-TIME:") else {
        return line.to_string();
    };
    match normalize_rfc3339(rest.trim()) {
        Some(normalized) => format!("#EXT-X-PROGRAM-DATE-TIME:{normalized}"),
        None => line.to_string(),
    }
}

/// `+0000` → `Z`; `±HHMM` → `±HH:MM`. Leaves everything before the offset
/// byte-stable, so an already-valid line (any seconds precision) round
/// trips untouched instead of being re-quantized to millisecond precision.
fn normalize_rfc3339(value: &str) -> Option<String> {
    let (body, offset) = split_offset(value)?;
    let offset_colon = colonize_offset(offset)?;
    let candidate = format!("{body}{offset_colon}");
    DateTime::parse_from_rfc3339(&candidate).ok()?;

    let normalized_offset = if is_zero_offset(&offset_colon) { "Z" } else { &offset_colon };
    Some(format!("{body}{normalized_offset}"))
}

/// Splits a timestamp into the part before the UTC offset and the offset
/// itself. Searches for the sign only within the time-of-day portion (after
/// `T`) so the date's `-` separators are never mistaken for an offset sign.
fn split_offset(value: &str) -> Option<(&str, &str)> {
    if let Some(body) = value.strip_suffix('Z') {
        return Some((body, "Z"));
    }
    let t_pos = value.find('T')?;
    let time_part = &value[t_pos..];
    let sign_pos = time_part.rfind(['+', '-'])?;
    let body_len = t_pos + sign_pos;
    Some((&value[..body_len], &value[body_len..]))
}

/// Accepts `Z`, `±HH:MM`, or bare `±HHMM`, normalizing the latter to
/// `±HH:MM`. Rejects anything else so the caller falls back to leaving the
/// line untouched.
fn colonize_offset(offset: &str) -> Option<String> {
    if offset == "Z" {
        return Some("Z".to_string());
    }
    let sign = offset.as_bytes().first()?;
    if *sign != b'+' && *sign != b'-' {
        return None;
    }
    let digits = &offset[1..];
    if digits.len() == 5 && digits.as_bytes()[2] == b':' {
        return Some(offset.to_string());
    }
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{}{}:{}", offset.chars().next().unwrap(), &digits[..2], &digits[2..]));
    }
    None
}

fn is_zero_offset(offset_colon: &str) -> bool {
    offset_colon == "Z" || offset_colon == "+00:00" || offset_colon == "-00:00"
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistTruth {
    pub is_vod: bool,
    pub total_duration_secs: f64,
    pub pdt_monotonic: bool,
    pub pdt_fully_covered: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TruthError {
    #[error("playlist failed to parse")]
    Parse,
    #[error("program-date-time is non-monotonic")]
    NonMonotonicPdt,
    #[error("live playlist has partial program-date-time coverage")]
    PartialPdtCoverage,
}

/// Parse and validate a playlist for diagnostics/truth purposes, using
/// `m3u8-rs` for the structural parse.
pub fn extract_truth(raw: &str) -> Result<PlaylistTruth, TruthError> {
    let playlist = m3u8_rs::parse_playlist_res(raw.as_bytes()).map_err(|_| TruthError::Parse)?;
    let m3u8_rs::Playlist::MediaPlaylist(media) = playlist else {
        return Err(TruthError::Parse);
    };

    let is_vod = matches!(media.playlist_type, Some(m3u8_rs::MediaPlaylistType::Vod)) || media.end_list;

    let total_duration_secs: f64 = media.segments.iter().map(|s| s.duration as f64).sum();

    let pdts: Vec<DateTime<chrono::FixedOffset>> =
        media.segments.iter().filter_map(|s| s.program_date_time).collect();

    let pdt_monotonic = pdts.windows(2).all(|w| w[0] <= w[1]);
    let covered = pdts.len();
    let total = media.segments.len();
    let pdt_fully_covered = covered == 0 || covered == total;

    if !pdt_monotonic {
        return Err(TruthError::NonMonotonicPdt);
    }
    if !is_vod && covered > 0 && !pdt_fully_covered {
        return Err(TruthError::PartialPdtCoverage);
    }

    Ok(PlaylistTruth { is_vod, total_duration_secs, pdt_monotonic, pdt_fully_covered })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plus_zero_offset_to_z() {
        let line = "#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00.000+0000";
        let out = normalize_pdt_line(line);
        assert!(out.ends_with('Z'), "got {out}");
    }

    #[test]
    fn rewrites_numeric_offset_with_colon() {
        let line = "#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00+0530";
        let out = normalize_pdt_line(line);
        assert!(out.contains("+05:30"), "got {out}");
    }

    #[test]
    fn plus_zero_offset_preserves_seconds_precision() {
        let line = "#EXT-X-PROGRAM-DATE-TIME:2026-01-04T16:00:00+0000";
        let out = normalize_pdt_line(line);
        assert_eq!(out, "#EXT-X-PROGRAM-DATE-TIME:2026-01-04T16:00:00Z");
    }

    #[test]
    fn already_valid_line_is_byte_stable() {
        let line = "#EXT-X-PROGRAM-DATE-TIME:2026-01-04T16:00:00Z";
        assert_eq!(normalize_pdt_line(line), line);

        let line = "#EXT-X-PROGRAM-DATE-TIME:2026-01-04T16:00:00+01:30";
        assert_eq!(normalize_pdt_line(line), line);
    }

    #[test]
    fn leaves_malformed_pdt_untouched() {
        let line = "#EXT-X-PROGRAM-DATE-TIME:not-a-timestamp";
        assert_eq!(normalize_pdt_line(line), line);
    }

    #[test]
    fn injects_independent_segments_after_header() {
        let raw = "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:6.0,\nseg_0.ts\n";
        let out = normalize(raw, &NormalizeOptions { dvr_window_sec: 0, is_live_or_event: false });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "#EXT-X-INDEPENDENT-SEGMENTS");
    }

    #[test]
    fn injects_event_and_start_when_dvr_enabled() {
        let raw = "#EXTM3U\n#EXTINF:6.0,\nseg_0.ts\n";
        let out = normalize(raw, &NormalizeOptions { dvr_window_sec: 60, is_live_or_event: true });
        assert!(out.contains("#EXT-X-PLAYLIST-TYPE:EVENT"));
        assert!(out.contains("#EXT-X-START:TIME-OFFSET=-60,PRECISE=YES"));
    }
}
