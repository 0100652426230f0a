//! SubRip parse, emit, and cheap file scans.

use std::fs;
use std::path::Path;

use crate::duration::{classify, DurationConfig, DurationVerdict};

use super::types::{format_timestamp, parse_timing_line, Cue, SrtError};

/// Parse SubRip bytes into cues.
///
/// Parsing is lenient: CRLF is normalized, the leading index line is
/// optional, and blocks missing a timing line or text are silently
/// dropped. Cue order is preserved as found.
pub fn parse(data: &[u8]) -> Vec<Cue> {
    let content = String::from_utf8_lossy(data).replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in content.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        let lines: Vec<&str> = block.lines().collect();

        // Locate the timing line; everything after it is text. Blocks
        // may or may not carry a leading index line.
        let timing_pos = lines.iter().position(|l| l.contains("-->"));
        let (pos, timing) = match timing_pos.and_then(|p| parse_timing_line(lines[p]).map(|t| (p, t)))
        {
            Some((p, t)) => (p, t),
            None => continue,
        };

        let text = lines[pos + 1..]
            .iter()
            .filter(|l| !l.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            continue;
        }

        cues.push(Cue::new(cues.len() + 1, timing.0, timing.1, text));
    }

    cues
}

/// Emit cues as SubRip bytes.
///
/// Cues are sorted by start time, reindexed from 1, negative starts
/// clamped to zero, and the output always ends with a newline. A
/// clamped cue whose end also precedes zero becomes zero-duration,
/// which the alignment guard treats as a defect.
pub fn emit(cues: &[Cue]) -> Vec<u8> {
    let mut ordered: Vec<&Cue> = cues.iter().collect();
    ordered.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = String::new();
    for (i, cue) in ordered.iter().enumerate() {
        let start = cue.start.max(0.0);
        let end = cue.end.max(start);
        out.push_str(&format!("{}\n", i + 1));
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(start),
            format_timestamp(end)
        ));
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }

    out.into_bytes()
}

/// Count cues in a file without building the cue list.
pub fn count_cues(path: &Path) -> Result<usize, SrtError> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| parse_timing_line(l).is_some())
        .count())
}

/// Last cue end time in seconds, scanning timing lines only.
pub fn last_timestamp(path: &Path) -> Result<f64, SrtError> {
    bounds(path).map(|(_, last)| last)
}

/// First cue start and last cue end, in seconds.
///
/// Returns `SrtError::NoCues` when no timing line parses.
pub fn bounds(path: &Path) -> Result<(f64, f64), SrtError> {
    let content = fs::read_to_string(path)?;
    let mut first_start: Option<f64> = None;
    let mut last_end: f64 = 0.0;

    for line in content.lines() {
        if let Some((start, end)) = parse_timing_line(line) {
            if first_start.is_none() {
                first_start = Some(start);
            }
            if end > last_end {
                last_end = end;
            }
        }
    }

    match first_start {
        Some(first) => Ok((first, last_end)),
        None => Err(SrtError::NoCues),
    }
}

/// Validate a final subtitle file against the probed video duration.
///
/// Returns human-readable issues; an empty list means the file passed.
pub fn validate(
    path: &Path,
    video_seconds: f64,
    config: &DurationConfig,
) -> Result<Vec<String>, SrtError> {
    let data = fs::read(path)?;
    let mut issues = Vec::new();

    if data.iter().all(|b| b.is_ascii_whitespace()) {
        issues.push("subtitle file is empty".to_string());
        return Ok(issues);
    }

    let cues = parse(&data);
    if cues.is_empty() {
        issues.push("no cues with parseable timestamps".to_string());
        return Ok(issues);
    }

    if video_seconds > 0.0 {
        let first_start = cues.first().map(|c| c.start).unwrap_or(0.0);
        let last_end = cues.iter().map(|c| c.end).fold(0.0, f64::max);
        if let DurationVerdict::SoftReject(reason) =
            classify(first_start, last_end, video_seconds, config)
        {
            issues.push(reason);
        }
    }

    Ok(issues)
}
