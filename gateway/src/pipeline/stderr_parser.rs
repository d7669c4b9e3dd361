//! FFmpeg stderr line parsing: progress fields plus the three Hard Reset
//! triggers (resolution change, codec change, PMT-version-with-PID
//! change). Field extraction mirrors the teacher's
//! `downloader::engine::utils::ffmpeg_parser` (find/substring, no parser
//! combinator).

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub time_secs: f64,
    pub size_bytes: u64,
    pub speed: f64,
    pub bitrate_bytes_per_sec: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Progress(Progress),
    ResolutionChanged { width: u32, height: u32 },
    CodecChanged { stream: String, codec: String },
    PmtVideoPidChanged { pmt_version: u32, video_pid: u32 },
    DecodeError,
    Unrecognized,
}

pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_time_field(line: &str) -> Option<f64> {
    let start = line.find("time=")? + 5;
    let rest = &line[start..];
    let end = rest.find(' ').unwrap_or(rest.len());
    parse_time(&rest[..end])
}

fn parse_size(line: &str) -> Option<u64> {
    let start = line.find("size=")? + 5;
    let rest = line[start..].trim_start();
    let end = rest.find(['k', 'K'])?;
    rest[..end].trim().parse::<u64>().ok().map(|kb| kb * 1024)
}

fn parse_speed(line: &str) -> Option<f64> {
    let start = line.find("speed=")? + 6;
    let rest = &line[start..];
    let end = rest.find('x')?;
    rest[..end].trim().parse().ok()
}

fn parse_bitrate(line: &str) -> Option<u64> {
    let start = line.find("bitrate=")? + 8;
    let rest = &line[start..];
    let end = rest.find("kbits/s")?;
    let kbits: f64 = rest[..end].trim().parse().ok()?;
    Some((kbits * 1024.0 / 8.0) as u64)
}

fn is_progress_line(line: &str) -> bool {
    line.contains("time=") && (line.contains("frame=") || line.contains("size="))
}

/// Resolution-change lines look like `Stream #0:0: Video: ... 1920x1080`
/// appearing mid-stream (ffmpeg re-logs the stream map on a format change).
fn parse_resolution_change(line: &str) -> Option<(u32, u32)> {
    if !line.contains("Video:") {
        return None;
    }
    line.split(|c: char| !c.is_ascii_digit() && c != 'x')
        .filter(|tok| tok.contains('x'))
        .find_map(|tok| {
            let (w, h) = tok.split_once('x')?;
            Some((w.parse().ok()?, h.parse().ok()?))
        })
}

fn parse_codec_change(line: &str) -> Option<(String, String)> {
    let start = line.find("Stream #")?;
    let rest = &line[start..];
    let colon = rest.find(": ")?;
    let stream = rest[..colon].to_string();
    let after = &rest[colon + 2..];
    let kind_end = after.find(": ")?;
    let kind = &after[..kind_end];
    if kind != "Video" && kind != "Audio" {
        return None;
    }
    let codec = after[kind_end + 2..]
        .split([' ', ','])
        .next()
        .unwrap_or("")
        .to_string();
    if codec.is_empty() {
        return None;
    }
    Some((stream, codec))
}

/// `pmt: version X` / `PID Y` pairs appear together on PAT/PMT rewrite
/// lines when the source swaps its video elementary stream.
fn parse_pmt_pid_change(line: &str) -> Option<(u32, u32)> {
    if !line.to_lowercase().contains("pmt") {
        return None;
    }
    let version_start = line.to_lowercase().find("version")? + "version".len();
    let version_rest = line[version_start..].trim_start();
    let version_end = version_rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(version_rest.len());
    let pmt_version: u32 = version_rest[..version_end].parse().ok()?;

    let pid_start = line.to_lowercase().find("pid")? + "pid".len();
    let pid_rest = line[pid_start..].trim_start();
    let pid_end = pid_rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(pid_rest.len());
    let video_pid: u32 = pid_rest[..pid_end].parse().ok()?;

    Some((pmt_version, video_pid))
}

/// Lines ffmpeg emits for a corrupt or unrecoverable frame, as opposed to
/// a structural change in the source (resolution/codec/PMT). These don't
/// warrant a Hard Reset on their own, just a counter.
fn is_decode_error_line(line: &str) -> bool {
    line.contains("Error while decoding stream")
        || line.contains("Invalid data found when processing input")
        || line.contains("decode_slice_header error")
        || line.contains("concealing errors")
}

pub fn parse_line(line: &str) -> StreamEvent {
    if let Some((pmt_version, video_pid)) = parse_pmt_pid_change(line) {
        return StreamEvent::PmtVideoPidChanged { pmt_version, video_pid };
    }
    if let Some((width, height)) = parse_resolution_change(line) {
        return StreamEvent::ResolutionChanged { width, height };
    }
    if let Some((stream, codec)) = parse_codec_change(line) {
        return StreamEvent::CodecChanged { stream, codec };
    }
    if is_decode_error_line(line) {
        return StreamEvent::DecodeError;
    }
    if is_progress_line(line) {
        return StreamEvent::Progress(Progress {
            time_secs: parse_time_field(line).unwrap_or(0.0),
            size_bytes: parse_size(line).unwrap_or(0),
            speed: parse_speed(line).unwrap_or(0.0),
            bitrate_bytes_per_sec: parse_bitrate(line).unwrap_or(0),
        });
    }
    StreamEvent::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_line() {
        let line = "frame= 1234 fps=30 q=-1.0 size=    2048kB time=00:01:30.50 bitrate=1024.0kbits/s speed=1.00x";
        match parse_line(line) {
            StreamEvent::Progress(p) => {
                assert_eq!(p.time_secs, 90.5);
                assert_eq!(p.size_bytes, 2048 * 1024);
                assert_eq!(p.speed, 1.0);
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn detects_resolution_change() {
        let line = "Stream #0:0: Video: h264, yuv420p, 1280x720, 30 fps";
        assert_eq!(
            parse_line(line),
            StreamEvent::ResolutionChanged { width: 1280, height: 720 }
        );
    }

    #[test]
    fn detects_pmt_pid_change() {
        let line = "[mpegts] PMT: version 3 PID 0x0100 changed";
        match parse_line(line) {
            StreamEvent::PmtVideoPidChanged { pmt_version, video_pid } => {
                assert_eq!(pmt_version, 3);
                assert_eq!(video_pid, 0);
            }
            other => panic!("expected pmt change, got {other:?}"),
        }
    }

    #[test]
    fn detects_decode_error() {
        let line = "[h264 @ 0x55d1a2a3e680] Error while decoding stream #0:0: Invalid data found when processing input";
        assert_eq!(parse_line(line), StreamEvent::DecodeError);
    }

    #[test]
    fn unrelated_line_is_unrecognized() {
        assert_eq!(parse_line("ffmpeg version 6.0"), StreamEvent::Unrecognized);
    }
}
