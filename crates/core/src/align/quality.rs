//! Post-alignment quality guard.
//!
//! Alignment engines fail in recognizable ways: cues clamped to zero
//! duration, chaotic per-cue shifts, or a handful of cues flung far
//! away while the rest barely move. The guard compares cue timings
//! before and after an alignment pass and rejects those shapes, so the
//! caller can fall back to the unaligned input or try the next
//! candidate. A constant offset or a smooth linear drift passes.

use serde::{Deserialize, Serialize};

use crate::srt::Cue;

/// Empirically tuned thresholds, retunable without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentGuardConfig {
    /// Shift standard deviation above which an alignment is suspect.
    pub max_shift_stddev_secs: f64,
    /// Chaotic only when stddev also exceeds this multiple of the
    /// absolute median shift.
    pub stddev_median_ratio: f64,
    /// Largest tolerated fraction of newly overlapping cue pairs.
    pub max_new_overlap_ratio: f64,
    /// A cue moving at least this far counts as a sharp move.
    pub sharp_shift_secs: f64,
    /// Largest tolerated fraction of sharp movers when the median
    /// shift is trivial.
    pub max_sharp_fraction: f64,
    /// Median shifts at or below this are trivial.
    pub trivial_median_secs: f64,
}

impl Default for AlignmentGuardConfig {
    fn default() -> Self {
        Self {
            max_shift_stddev_secs: 10.0,
            stddev_median_ratio: 2.0,
            max_new_overlap_ratio: 0.10,
            sharp_shift_secs: 5.0,
            max_sharp_fraction: 0.20,
            trivial_median_secs: 0.5,
        }
    }
}

/// Whether the alignment is usable.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentVerdict {
    Accepted,
    Rejected(String),
}

/// Before/after comparison metrics.
#[derive(Debug, Clone)]
pub struct AlignmentReport {
    pub cue_count: usize,
    pub negative_timestamps: usize,
    pub zero_duration_cues: usize,
    pub new_overlaps: usize,
    pub pre_existing_overlaps: usize,
    pub shift_median: f64,
    pub shift_stddev: f64,
    pub shift_max: f64,
    pub verdict: AlignmentVerdict,
}

impl AlignmentReport {
    /// True when the alignment passed the guard.
    pub fn accepted(&self) -> bool {
        self.verdict == AlignmentVerdict::Accepted
    }
}

/// Compare cue timings before and after alignment.
///
/// Cues are paired by position (identity pairing); a length mismatch
/// compares the common prefix.
pub fn evaluate_alignment(
    before: &[Cue],
    after: &[Cue],
    config: &AlignmentGuardConfig,
) -> AlignmentReport {
    let n = before.len().min(after.len());
    let paired_before = &before[..n];
    let paired_after = &after[..n];

    let shifts: Vec<f64> = paired_after
        .iter()
        .zip(paired_before)
        .map(|(a, b)| a.start - b.start)
        .collect();

    let negative_timestamps = paired_after.iter().filter(|c| c.start < 0.0).count();
    let zero_duration_cues = paired_after.iter().filter(|c| c.end <= c.start).count();

    let mut new_overlaps = 0;
    let mut pre_existing_overlaps = 0;
    for i in 0..n.saturating_sub(1) {
        let before_overlap = paired_before[i + 1].start < paired_before[i].end;
        let after_overlap = paired_after[i + 1].start < paired_after[i].end;
        if before_overlap {
            pre_existing_overlaps += 1;
        }
        if after_overlap && !before_overlap {
            new_overlaps += 1;
        }
    }

    let shift_median = median(&shifts);
    let shift_stddev = stddev(&shifts);
    let shift_max = shifts.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));

    let sharp_movers = shifts
        .iter()
        .filter(|s| s.abs() >= config.sharp_shift_secs)
        .count();

    let verdict = decide(
        n,
        zero_duration_cues,
        negative_timestamps,
        new_overlaps,
        shift_median,
        shift_stddev,
        sharp_movers,
        config,
    );

    AlignmentReport {
        cue_count: n,
        negative_timestamps,
        zero_duration_cues,
        new_overlaps,
        pre_existing_overlaps,
        shift_median,
        shift_stddev,
        shift_max,
        verdict,
    }
}

#[allow(clippy::too_many_arguments)]
fn decide(
    cue_count: usize,
    zero_duration_cues: usize,
    negative_timestamps: usize,
    new_overlaps: usize,
    shift_median: f64,
    shift_stddev: f64,
    sharp_movers: usize,
    config: &AlignmentGuardConfig,
) -> AlignmentVerdict {
    if cue_count == 0 {
        return AlignmentVerdict::Rejected("alignment produced no cues".to_string());
    }

    if zero_duration_cues > 0 {
        return AlignmentVerdict::Rejected(format!(
            "{} zero-duration cue(s) after alignment",
            zero_duration_cues
        ));
    }

    if negative_timestamps > 0 {
        return AlignmentVerdict::Rejected(format!(
            "{} cue(s) with negative timestamps",
            negative_timestamps
        ));
    }

    if new_overlaps as f64 > config.max_new_overlap_ratio * cue_count as f64 {
        return AlignmentVerdict::Rejected(format!(
            "{} new overlapping cue pairs out of {}",
            new_overlaps, cue_count
        ));
    }

    if shift_stddev > config.max_shift_stddev_secs
        && shift_stddev > config.stddev_median_ratio * shift_median.abs()
    {
        return AlignmentVerdict::Rejected(format!(
            "chaotic shifts: stddev {:.1}s around median {:.1}s",
            shift_stddev, shift_median
        ));
    }

    if shift_median.abs() <= config.trivial_median_secs
        && sharp_movers as f64 > config.max_sharp_fraction * cue_count as f64
    {
        return AlignmentVerdict::Rejected(format!(
            "partial failure: {} of {} cues moved sharply while the median barely moved",
            sharp_movers, cue_count
        ));
    }

    AlignmentVerdict::Accepted
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues(timings: &[(f64, f64)]) -> Vec<Cue> {
        timings
            .iter()
            .enumerate()
            .map(|(i, (start, end))| Cue::new(i + 1, *start, *end, format!("cue {}", i + 1)))
            .collect()
    }

    fn spaced_cues(count: usize, spacing: f64, offset: f64) -> Vec<Cue> {
        (0..count)
            .map(|i| {
                let start = i as f64 * spacing + offset;
                Cue::new(i + 1, start, start + 2.0, format!("cue {}", i + 1))
            })
            .collect()
    }

    #[test]
    fn test_uniform_shift_accepted() {
        let before = spaced_cues(100, 4.0, 0.0);
        let after = spaced_cues(100, 4.0, 3.0);
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert!(report.accepted(), "verdict: {:?}", report.verdict);
        assert!((report.shift_median - 3.0).abs() < 1e-9);
        assert!(report.shift_stddev < 1e-9);
    }

    #[test]
    fn test_linear_drift_accepted() {
        let before = spaced_cues(100, 4.0, 0.0);
        let after: Vec<Cue> = before
            .iter()
            .enumerate()
            .map(|(i, c)| {
                // Drift grows smoothly to 4s across the file.
                let drift = 4.0 * i as f64 / 100.0;
                Cue::new(c.index, c.start + drift, c.end + drift, c.text.clone())
            })
            .collect();
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert!(report.accepted(), "verdict: {:?}", report.verdict);
    }

    #[test]
    fn test_alternating_shift_rejected() {
        // Wide spacing keeps the alternating shifts from overlapping,
        // so the chaos rule itself is what fires.
        let before = spaced_cues(100, 100.0, 50.0);
        let after: Vec<Cue> = before
            .iter()
            .map(|c| {
                let shift = if c.index % 2 == 0 { 30.0 } else { -30.0 };
                let start = c.start + shift;
                Cue::new(c.index, start, start + 2.0, c.text.clone())
            })
            .collect();
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        match report.verdict {
            AlignmentVerdict::Rejected(ref reason) => assert!(reason.contains("chaotic")),
            _ => panic!("expected chaotic rejection"),
        }
    }

    #[test]
    fn test_single_clamped_cue_rejected() {
        let before = spaced_cues(50, 4.0, 10.0);
        let mut after = spaced_cues(50, 4.0, 10.0);
        after[0].start = 0.0;
        after[0].end = 0.0;
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert_eq!(report.zero_duration_cues, 1);
        assert!(!report.accepted());
    }

    #[test]
    fn test_negative_timestamps_rejected() {
        let before = cues(&[(1.0, 2.0), (3.0, 4.0)]);
        let after = cues(&[(-1.0, 2.0), (3.0, 4.0)]);
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert_eq!(report.negative_timestamps, 1);
        assert!(!report.accepted());
    }

    #[test]
    fn test_new_overlaps_rejected() {
        let before = spaced_cues(10, 4.0, 0.0);
        let mut after = spaced_cues(10, 4.0, 0.0);
        // Pull most cue starts back over the previous cue's end.
        for i in 1..10 {
            after[i].start = after[i - 1].end - 0.5;
        }
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert!(report.new_overlaps > 1);
        assert!(!report.accepted());
    }

    #[test]
    fn test_pre_existing_overlaps_tolerated() {
        // Input already overlapped; alignment kept them as-is.
        let before = cues(&[(1.0, 5.0), (4.0, 8.0), (9.0, 10.0)]);
        let after = cues(&[(2.0, 6.0), (5.0, 9.0), (10.0, 11.0)]);
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        assert_eq!(report.pre_existing_overlaps, 1);
        assert_eq!(report.new_overlaps, 0);
        assert!(report.accepted());
    }

    #[test]
    fn test_partial_failure_rejected() {
        // Wide spacing so the 20s jumps cannot create overlaps; the
        // stddev stays under the chaotic cap but the shape is wrong.
        let before = spaced_cues(100, 100.0, 0.0);
        let mut after = spaced_cues(100, 100.0, 0.0);
        for i in 0..33 {
            after[i * 3].start += 20.0;
            after[i * 3].end += 20.0;
        }
        let report = evaluate_alignment(&before, &after, &AlignmentGuardConfig::default());
        match report.verdict {
            AlignmentVerdict::Rejected(ref reason) => {
                assert!(reason.contains("partial"), "reason: {}", reason)
            }
            _ => panic!("expected partial-failure rejection, report: {:?}", report),
        }
    }

    #[test]
    fn test_empty_alignment_rejected() {
        let report = evaluate_alignment(&[], &[], &AlignmentGuardConfig::default());
        assert!(!report.accepted());
    }

    #[test]
    fn test_median_and_stddev_helpers() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
        assert!(stddev(&[5.0, 5.0, 5.0]) < 1e-12);
        assert!((stddev(&[2.0, 4.0]) - 1.0).abs() < 1e-9);
    }
}
