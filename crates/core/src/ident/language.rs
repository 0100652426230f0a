//! Two-letter / three-letter language code tables.

/// (ISO 639-1, ISO 639-2/T, display name) for the languages the stage
/// recognizes. Everything else degrades to `und` / passthrough.
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("en", "eng", "English"),
    ("es", "spa", "Spanish"),
    ("fr", "fra", "French"),
    ("de", "deu", "German"),
    ("it", "ita", "Italian"),
    ("pt", "por", "Portuguese"),
    ("ja", "jpn", "Japanese"),
    ("ko", "kor", "Korean"),
    ("zh", "zho", "Chinese"),
    ("ru", "rus", "Russian"),
    ("ar", "ara", "Arabic"),
    ("hi", "hin", "Hindi"),
    ("nl", "nld", "Dutch"),
    ("pl", "pol", "Polish"),
    ("sv", "swe", "Swedish"),
    ("da", "dan", "Danish"),
    ("no", "nor", "Norwegian"),
    ("fi", "fin", "Finnish"),
];

/// Map a two-letter code to its three-letter form. Unknown codes map
/// to `und`.
pub fn two_to_three(code: &str) -> String {
    let lower = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(two, _, _)| *two == lower)
        .map(|(_, three, _)| three.to_string())
        .unwrap_or_else(|| "und".to_string())
}

/// Map a three-letter code to its two-letter form. Unknown codes pass
/// through lowercased.
pub fn three_to_two(code: &str) -> String {
    let lower = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(_, three, _)| *three == lower)
        .map(|(two, _, _)| two.to_string())
        .unwrap_or(lower)
}

/// Display name for a two-letter code, used for embedded track labels.
/// Unknown codes fall back to the code itself.
pub fn display_name(code: &str) -> String {
    let lower = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(two, _, _)| *two == lower)
        .map(|(_, _, name)| name.to_string())
        .unwrap_or(lower)
}

/// Normalize a language tag of either length to a lowercase two-letter
/// code. Region suffixes (`pt-BR`) are stripped.
pub fn normalize_language(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    let base = lower.split(['-', '_']).next().unwrap_or(&lower);
    match base.len() {
        3 => three_to_two(base),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_to_three_known() {
        assert_eq!(two_to_three("en"), "eng");
        assert_eq!(two_to_three("DE"), "deu");
        assert_eq!(two_to_three("pt"), "por");
    }

    #[test]
    fn test_two_to_three_unknown() {
        assert_eq!(two_to_three("xx"), "und");
        assert_eq!(two_to_three(""), "und");
    }

    #[test]
    fn test_three_to_two_known() {
        assert_eq!(three_to_two("eng"), "en");
        assert_eq!(three_to_two("JPN"), "ja");
    }

    #[test]
    fn test_three_to_two_unknown_passes_through() {
        assert_eq!(three_to_two("QQQ"), "qqq");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("en"), "English");
        assert_eq!(display_name("sv"), "Swedish");
        assert_eq!(display_name("xx"), "xx");
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("ENG"), "en");
        assert_eq!(normalize_language("pt-BR"), "pt");
        assert_eq!(normalize_language(" fr "), "fr");
        assert_eq!(normalize_language("en"), "en");
    }
}
