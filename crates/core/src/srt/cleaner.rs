//! Advertisement-cue removal and plain-text extraction.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::codec::{emit, parse};

// Matched against the lowercased cue text. Anything hitting one of
// these is dropped wholesale rather than partially edited.
static AD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"opensubtitles",
        r"subtitles? by",
        r"sync(ed)?\s*(and|&)\s*correct(ed)?",
        r"advertise",
        r"https?://",
        r"\bwww\.",
        r"\bsubscene\b",
        r"\byts\b",
        r"\byify\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("ad pattern"))
    .collect()
});

/// Drop advertisement cues and trim trailing whitespace on the rest.
///
/// Returns the re-emitted payload and the number of removed cues.
pub fn clean(data: &[u8]) -> (Vec<u8>, usize) {
    let cues = parse(data);
    let before = cues.len();

    let kept: Vec<_> = cues
        .into_iter()
        .filter(|cue| {
            let lowered = cue.text.to_lowercase();
            !AD_PATTERNS.iter().any(|re| re.is_match(&lowered))
        })
        .map(|mut cue| {
            cue.text = cue
                .text
                .lines()
                .map(|l| l.trim_end())
                .collect::<Vec<_>>()
                .join("\n");
            cue
        })
        .collect();

    let removed = before - kept.len();
    (emit(&kept), removed)
}

/// Concatenated cue text with punctuation preserved, cues joined by
/// newlines.
pub fn plain_text(data: &[u8]) -> String {
    parse(data)
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
