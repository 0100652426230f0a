//! Title comparison and year extraction.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

const STOP_WORDS: &[&str] = &["the", "a", "an"];

/// How closely a candidate title agrees with the expected title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMatch {
    /// Normalized forms are identical.
    Exact,
    /// One normalized form contains the other and the word sets agree.
    Contains,
    /// At least half of the words overlap after stop-word filtering.
    Partial,
    /// No meaningful agreement.
    None,
    /// One side is empty; agreement cannot be determined.
    Unknown,
}

/// Lowercase and strip everything that is not a letter or digit.
fn normalize(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Word list after lowercasing, punctuation splitting, and stop-word
/// removal.
fn words(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Compare an expected title against a candidate title.
pub fn compare_titles(expected: &str, candidate: &str) -> TitleMatch {
    let norm_expected = normalize(expected);
    let norm_candidate = normalize(candidate);

    if norm_expected.is_empty() || norm_candidate.is_empty() {
        return TitleMatch::Unknown;
    }

    if norm_expected == norm_candidate {
        return TitleMatch::Exact;
    }

    let expected_words = words(expected);
    let candidate_words = words(candidate);

    let substring =
        norm_expected.contains(&norm_candidate) || norm_candidate.contains(&norm_expected);
    if substring {
        // A substring hit still needs the word sets to agree, or
        // "It" would contain half the catalogue.
        let (shorter, longer) = if expected_words.len() <= candidate_words.len() {
            (&expected_words, &candidate_words)
        } else {
            (&candidate_words, &expected_words)
        };
        if !longer.is_empty() && shorter.len() * 2 >= longer.len() {
            return TitleMatch::Contains;
        }
    }

    let expected_set: HashSet<&str> = expected_words.iter().map(String::as_str).collect();
    let candidate_set: HashSet<&str> = candidate_words.iter().map(String::as_str).collect();
    let overlap = expected_set.intersection(&candidate_set).count();
    let smaller = expected_set.len().min(candidate_set.len());

    if overlap > 0 && overlap * 2 >= smaller {
        return TitleMatch::Partial;
    }

    TitleMatch::None
}

/// True when the candidate title disagrees hard with the expected one.
/// Empty inputs never count as a mismatch.
pub fn is_title_mismatch(expected: &str, candidate: &str) -> bool {
    compare_titles(expected, candidate) == TitleMatch::None
}

/// Strict agreement used for forced-subtitle candidates: only exact or
/// contains relationships pass, so "Star Trek III" cannot stand in for
/// "Star Trek: Generations".
pub fn strict_title_match(expected: &str, candidate: &str) -> bool {
    matches!(
        compare_titles(expected, candidate),
        TitleMatch::Exact | TitleMatch::Contains | TitleMatch::Unknown
    )
}

static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d{4})\)\s*$").expect("year regex"));

/// Extract a release year from a title-like string: a trailing
/// `(YYYY)`, else the first four characters when they are digits.
pub fn extract_year(s: &str) -> Option<i32> {
    let trimmed = s.trim();
    if let Some(caps) = TRAILING_YEAR_RE.captures(trimmed) {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    if trimmed.len() >= 4 && trimmed.chars().take(4).all(|c| c.is_ascii_digit()) {
        return trimmed[..4].parse().ok();
    }
    None
}
