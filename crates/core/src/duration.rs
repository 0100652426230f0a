//! Subtitle-vs-video duration classification and mis-identification
//! detection.
//!
//! A subtitle ending well before the video is normal (credits carry no
//! dialogue). A subtitle running past the end of the video is not. When
//! every candidate for an item misses by a wide margin in either
//! direction, the source media is probably not what the identification
//! stage claims, and the item should be diverted to human review.

use serde::{Deserialize, Serialize};

/// Tunable windows for duration classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationConfig {
    /// Largest tolerated gap between the last cue and the end of the
    /// video, in seconds (credits tail).
    pub max_credits_gap_secs: f64,
    /// Largest tolerated overrun of the subtitle past the end of the
    /// video, in seconds.
    pub max_overrun_secs: f64,
    /// Escape hatch: a subtitle starting at least this far into the
    /// video is allowed a tighter tail gap (un-subtitled intro/recap).
    pub late_start_secs: f64,
    /// Tail gap tolerated together with a late start, in seconds.
    pub late_start_tail_secs: f64,
    /// Absolute delta at which a failed candidate counts toward the
    /// mis-identification pattern, in seconds.
    pub suspect_abs_delta_secs: f64,
    /// Relative delta (fraction of video duration) at which a failed
    /// candidate counts toward the mis-identification pattern.
    pub suspect_rel_delta: f64,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            max_credits_gap_secs: 600.0,
            max_overrun_secs: 8.0,
            late_start_secs: 5.0,
            late_start_tail_secs: 45.0,
            suspect_abs_delta_secs: 60.0,
            suspect_rel_delta: 0.07,
        }
    }
}

/// Outcome of duration classification for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationVerdict {
    /// Duration delta is within tolerance.
    Accept,
    /// Candidate-level rejection; the caller tries the next candidate.
    SoftReject(String),
}

/// Classify the duration delta between a subtitle and its video.
///
/// `delta = video_seconds - last_cue_end`: positive means the subtitle
/// is shorter than the video.
pub fn classify(
    first_cue_start: f64,
    last_cue_end: f64,
    video_seconds: f64,
    config: &DurationConfig,
) -> DurationVerdict {
    let delta = video_seconds - last_cue_end;

    if delta >= 0.0 {
        if delta <= config.max_credits_gap_secs {
            return DurationVerdict::Accept;
        }
        // Late-start escape hatch: an un-subtitled intro shifts the
        // whole track forward, leaving a modest tail gap.
        if first_cue_start >= config.late_start_secs && delta <= config.late_start_tail_secs {
            return DurationVerdict::Accept;
        }
        return DurationVerdict::SoftReject(format!(
            "subtitle ends {:.0}s before the video ends",
            delta
        ));
    }

    if -delta <= config.max_overrun_secs {
        return DurationVerdict::Accept;
    }

    DurationVerdict::SoftReject(format!(
        "subtitle runs {:.0}s past the end of the video",
        -delta
    ))
}

/// Decide whether a set of per-candidate duration deltas points at a
/// mis-identified source.
///
/// True only when *every* delta is past the suspect thresholds, either
/// absolutely or relative to the video duration.
pub fn detect_suspect_misid(deltas: &[f64], video_seconds: f64, config: &DurationConfig) -> bool {
    if deltas.is_empty() || video_seconds <= 0.0 {
        return false;
    }

    deltas.iter().all(|d| {
        d.abs() >= config.suspect_abs_delta_secs
            || d.abs() / video_seconds >= config.suspect_rel_delta
    })
}
