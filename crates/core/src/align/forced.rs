//! Forced-subtitle (foreign-parts-only) retiming.
//!
//! A forced track covers only the foreign-language lines, so it cannot
//! be audio-aligned on its own. Instead its cues are matched against
//! the already-aligned regular track by text similarity, and a linear
//! transform fitted through the matching pairs retimes the whole
//! track.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::srt::Cue;

/// Tunables for forced-track pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedAlignConfig {
    /// Fraction of tokens (of the smaller token set) that must agree
    /// for a cue pair to count as a match.
    pub min_token_overlap: f64,
    /// Minimum matching pairs needed to fit the transform.
    pub min_pairs: usize,
}

impl Default for ForcedAlignConfig {
    fn default() -> Self {
        Self {
            min_token_overlap: 0.6,
            min_pairs: 2,
        }
    }
}

/// Retime a forced track against the aligned reference track.
///
/// Returns the retimed cues, or `None` when fewer than
/// `min_pairs` cue pairs match (the caller records "no forced subtitle
/// available").
pub fn align_forced(
    reference: &[Cue],
    forced: &[Cue],
    config: &ForcedAlignConfig,
) -> Option<Vec<Cue>> {
    let reference_tokens: Vec<HashSet<String>> =
        reference.iter().map(|c| tokens(&c.text)).collect();

    // (forced start, reference start) for every confident text match.
    let mut pairs: Vec<(f64, f64)> = Vec::new();
    for cue in forced {
        let cue_tokens = tokens(&cue.text);
        if cue_tokens.is_empty() {
            continue;
        }
        let best = reference_tokens
            .iter()
            .enumerate()
            .map(|(i, r)| (i, overlap(&cue_tokens, r)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((i, score)) = best {
            if score >= config.min_token_overlap {
                pairs.push((cue.start, reference[i].start));
            }
        }
    }

    if pairs.len() < config.min_pairs {
        debug!(
            pairs = pairs.len(),
            needed = config.min_pairs,
            "Not enough forced-cue matches to fit a transform"
        );
        return None;
    }

    let (scale, offset) = fit_line(&pairs)?;
    debug!(pairs = pairs.len(), scale = scale, offset = offset, "Forced track transform fitted");

    Some(
        forced
            .iter()
            .map(|c| {
                Cue::new(
                    c.index,
                    scale * c.start + offset,
                    scale * c.end + offset,
                    c.text.clone(),
                )
            })
            .collect(),
    )
}

/// Lowercase, strip punctuation, collapse whitespace, tokenize.
fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared-token fraction relative to the smaller set.
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Least-squares fit of `ref = scale * forced + offset`.
///
/// Returns `None` when the forced times are degenerate (all equal).
fn fit_line(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = pairs.len() as f64;
    let sum_x: f64 = pairs.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = pairs.iter().map(|(_, y)| y).sum();
    let sum_xx: f64 = pairs.iter().map(|(x, _)| x * x).sum();
    let sum_xy: f64 = pairs.iter().map(|(x, y)| x * y).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < 1e-9 {
        return None;
    }

    let scale = (n * sum_xy - sum_x * sum_y) / denominator;
    let offset = (sum_y - scale * sum_x) / n;
    Some((scale, offset))
}
