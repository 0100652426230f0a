//! Edition (alternate cut) labels and release-string matching.

/// Canonical edition keys with the variant phrases that identify them
/// inside a normalized release string.
const EDITIONS: &[(&str, &[&str])] = &[
    ("directors", &["director's cut", "directors cut", "director cut", "dc"]),
    ("extended", &["extended"]),
    ("unrated", &["unrated"]),
    ("uncut", &["uncut"]),
    ("theatrical", &["theatrical"]),
    ("remastered", &["remastered"]),
    ("special", &["special edition", "special"]),
    ("final", &["final cut"]),
    ("redux", &["redux"]),
    ("imax", &["imax"]),
    ("ultimate", &["ultimate"]),
    ("definitive", &["definitive"]),
];

/// Normalize a release string for edition and token matching: lowercase
/// with `.`, `-`, `_` folded to spaces.
pub fn normalize_release(release: &str) -> String {
    release
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c == '-' || c == '_' { ' ' } else { c })
        .collect()
}

/// Resolve a free-form edition label to its canonical key.
pub fn canonical_edition(label: &str) -> Option<&'static str> {
    let normalized = normalize_release(label);
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return None;
    }
    EDITIONS
        .iter()
        .find(|(key, variants)| {
            *key == normalized || variants.iter().any(|v| phrase_in(normalized, v))
        })
        .map(|(key, _)| *key)
}

/// Whether a release string advertises the given canonical edition.
pub fn release_has_edition(release: &str, canonical: &str) -> bool {
    let normalized = normalize_release(release);
    EDITIONS
        .iter()
        .find(|(key, _)| *key == canonical)
        .map(|(_, variants)| variants.iter().any(|v| phrase_in(&normalized, v)))
        .unwrap_or(false)
}

// Word-bounded phrase search. Short variants like "dc" would otherwise
// match inside unrelated tokens.
fn phrase_in(haystack: &str, phrase: &str) -> bool {
    let tokens: Vec<&str> = haystack.split_whitespace().collect();
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || tokens.len() < needle.len() {
        return false;
    }
    tokens
        .windows(needle.len())
        .any(|w| w.iter().zip(&needle).all(|(a, b)| a == b))
}
