//! Per-item identification context.

use serde::{Deserialize, Serialize};

use super::language::normalize_language;

/// Kind of media the identification stage resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    /// Fold the loose vocabulary of upstream metadata into the two
    /// kinds this stage distinguishes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "film" => Some(Self::Movie),
            "episode" | "tv" | "series" | "show" => Some(Self::Episode),
            _ => None,
        }
    }

    /// Wire value used in provider queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }
}

/// Identification metadata for one work item, built once from the
/// queue item's stored metadata and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdContext {
    /// TMDB id of the work (movie or episode's series entry point).
    pub tmdb_id: Option<u64>,
    /// TMDB id of the parent series, for episodes.
    pub parent_tmdb_id: Option<u64>,
    /// TMDB id of the specific episode.
    pub episode_tmdb_id: Option<u64>,
    /// IMDB id; may be empty or carry the `tt` prefix.
    #[serde(default)]
    pub imdb_id: String,
    /// Movie or episode.
    pub media_kind: MediaKind,
    /// Work title (movie title or episode title).
    pub title: String,
    /// Series title, for episodes.
    #[serde(default)]
    pub series_title: String,
    /// Four-digit release year, empty when unknown.
    #[serde(default)]
    pub year: String,
    /// Edition label such as "director's cut", empty when unset.
    #[serde(default)]
    pub edition: String,
    /// Season number; 0 means unknown.
    #[serde(default)]
    pub season: u32,
    /// Episode number; 0 means unknown.
    #[serde(default)]
    pub episode: u32,
    /// Preferred subtitle languages, two-letter, most preferred first.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl IdContext {
    /// Normalize the preferred-language list: lowercased two-letter
    /// codes, order-preserving dedup.
    pub fn normalize_languages(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.languages = self
            .languages
            .iter()
            .map(|l| normalize_language(l))
            .filter(|l| !l.is_empty())
            .filter(|l| seen.insert(l.clone()))
            .collect();
    }

    /// First preferred language, defaulting to English.
    pub fn primary_language(&self) -> String {
        self.languages
            .first()
            .cloned()
            .unwrap_or_else(|| "en".to_string())
    }

    /// Numeric release year, when the stored string parses.
    pub fn year_number(&self) -> Option<i32> {
        self.year.trim().parse().ok()
    }

    /// IMDB id with the `tt` prefix stripped, or `None` when the
    /// remainder is not all digits.
    pub fn sanitized_imdb_id(&self) -> Option<String> {
        let stripped = self.imdb_id.trim().trim_start_matches("tt");
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            Some(stripped.to_string())
        } else {
            None
        }
    }

    /// Episode-scoped copy overlaying season, episode, and title.
    pub fn for_episode(&self, season: u32, episode: u32, episode_title: &str) -> Self {
        let mut ctx = self.clone();
        if season > 0 {
            ctx.season = season;
        }
        if episode > 0 {
            ctx.episode = episode;
        }
        if !episode_title.is_empty() {
            ctx.title = episode_title.to_string();
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_context() -> IdContext {
        IdContext {
            tmdb_id: Some(123),
            parent_tmdb_id: None,
            episode_tmdb_id: None,
            imdb_id: String::new(),
            media_kind: MediaKind::Movie,
            title: "Example Movie".to_string(),
            series_title: String::new(),
            year: "2024".to_string(),
            edition: String::new(),
            season: 0,
            episode: 0,
            languages: vec!["en".to_string()],
        }
    }

    #[test]
    fn test_media_kind_folding() {
        assert_eq!(MediaKind::parse("movie"), Some(MediaKind::Movie));
        assert_eq!(MediaKind::parse("Film"), Some(MediaKind::Movie));
        assert_eq!(MediaKind::parse("tv"), Some(MediaKind::Episode));
        assert_eq!(MediaKind::parse("series"), Some(MediaKind::Episode));
        assert_eq!(MediaKind::parse("episode"), Some(MediaKind::Episode));
        assert_eq!(MediaKind::parse("podcast"), None);
    }

    #[test]
    fn test_normalize_languages() {
        let mut ctx = base_context();
        ctx.languages = vec![
            "EN".to_string(),
            "eng".to_string(),
            "pt-BR".to_string(),
            "en".to_string(),
        ];
        ctx.normalize_languages();
        assert_eq!(ctx.languages, vec!["en", "pt"]);
    }

    #[test]
    fn test_primary_language_default() {
        let mut ctx = base_context();
        ctx.languages.clear();
        assert_eq!(ctx.primary_language(), "en");
    }

    #[test]
    fn test_sanitized_imdb_id() {
        let mut ctx = base_context();
        ctx.imdb_id = "tt0133093".to_string();
        assert_eq!(ctx.sanitized_imdb_id(), Some("0133093".to_string()));

        ctx.imdb_id = "0133093".to_string();
        assert_eq!(ctx.sanitized_imdb_id(), Some("0133093".to_string()));

        ctx.imdb_id = "ttnotdigits".to_string();
        assert_eq!(ctx.sanitized_imdb_id(), None);

        ctx.imdb_id = String::new();
        assert_eq!(ctx.sanitized_imdb_id(), None);
    }

    #[test]
    fn test_for_episode_overlay() {
        let ctx = base_context();
        let ep = ctx.for_episode(2, 5, "The One With The Title");
        assert_eq!(ep.season, 2);
        assert_eq!(ep.episode, 5);
        assert_eq!(ep.title, "The One With The Title");
        // Zero / empty values leave the base untouched.
        let same = ctx.for_episode(0, 0, "");
        assert_eq!(same.season, ctx.season);
        assert_eq!(same.title, ctx.title);
    }

    #[test]
    fn test_year_number() {
        let ctx = base_context();
        assert_eq!(ctx.year_number(), Some(2024));
        let mut ctx = base_context();
        ctx.year = String::new();
        assert_eq!(ctx.year_number(), None);
    }
}
