//! Core subtitle cue types and timestamp handling.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

/// A single timed subtitle unit.
///
/// Times are seconds from the start of the media. `end >= start` is
/// guaranteed after emission but not after parsing arbitrary input.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// 1-based index. Rewritten contiguously on emit.
    pub index: usize,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Text payload. May contain internal newlines, never empty.
    pub text: String,
}

impl Cue {
    /// Create a cue with the given timing and text.
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Duration in seconds. Negative when the cue is inverted.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Errors from subtitle codec operations.
#[derive(Debug, Error)]
pub enum SrtError {
    #[error("subtitle file is empty")]
    Empty,

    #[error("no parseable cues in subtitle data")]
    NoCues,

    #[error("unparseable timestamp line: {0}")]
    BadTimestamp(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Accepts both the canonical comma and the period millisecond
// separator seen in the wild.
static TIMING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})")
        .expect("timing regex")
});

/// Parse an `HH:MM:SS,mmm --> HH:MM:SS,mmm` line into (start, end) seconds.
///
/// Returns `None` when the line does not contain a timing range.
pub fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let caps = TIMING_RE.captures(line)?;
    let start = timestamp_seconds(&caps, 1)?;
    let end = timestamp_seconds(&caps, 5)?;
    Some((start, end))
}

fn timestamp_seconds(caps: &regex_lite::Captures, group: usize) -> Option<f64> {
    let hours: u64 = caps.get(group)?.as_str().parse().ok()?;
    let minutes: u64 = caps.get(group + 1)?.as_str().parse().ok()?;
    let seconds: u64 = caps.get(group + 2)?.as_str().parse().ok()?;
    let millis_str = caps.get(group + 3)?.as_str();
    let millis: u64 = millis_str.parse().ok()?;
    // "5" means 500ms only when zero-padded to three digits; pad right.
    let millis = match millis_str.len() {
        1 => millis * 100,
        2 => millis * 10,
        _ => millis,
    };
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds as f64 + millis as f64 / 1000.0)
}

/// Format seconds as `HH:MM:SS,mmm`. Negative inputs clamp to zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timing_line_comma() {
        let (start, end) = parse_timing_line("00:01:02,500 --> 00:01:04,250").unwrap();
        assert!((start - 62.5).abs() < 1e-9);
        assert!((end - 64.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timing_line_period() {
        let (start, end) = parse_timing_line("00:00:01.000 --> 00:00:02.000").unwrap();
        assert_eq!(start, 1.0);
        assert_eq!(end, 2.0);
    }

    #[test]
    fn test_parse_timing_line_rejects_garbage() {
        assert!(parse_timing_line("not a timestamp").is_none());
        assert!(parse_timing_line("12,500 --> 14,000").is_none());
    }

    #[test]
    fn test_format_timestamp_round_trip() {
        assert_eq!(format_timestamp(3661.042), "01:01:01,042");
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
    }

    #[test]
    fn test_format_timestamp_clamps_negative() {
        assert_eq!(format_timestamp(-3.2), "00:00:00,000");
    }

    #[test]
    fn test_cue_duration() {
        let cue = Cue::new(1, 1.0, 3.5, "hello");
        assert!((cue.duration() - 2.5).abs() < 1e-9);
    }
}
