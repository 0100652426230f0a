//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of all external service traits,
//! allowing comprehensive E2E testing without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use subplot_core::testing::{MockProvider, MockQueueStore, MockRunner};
//!
//! let provider = MockProvider::new();
//! let runner = MockRunner::new();
//! let queue = MockQueueStore::new();
//!
//! // Configure mock responses
//! provider.push_search(vec![MockProvider::sample_candidate(42, "en", 100)]);
//! runner.on("ffprobe", |_| Ok(Default::default()));
//!
//! // Use in a SubtitleStage...
//! ```

mod mock_provider;
mod mock_queue;
mod mock_runner;

pub use mock_provider::MockProvider;
pub use mock_queue::MockQueueStore;
pub use mock_runner::MockRunner;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::ident::{IdContext, MediaKind};
    use crate::provider::Candidate;

    /// Create a test candidate with reasonable defaults.
    pub fn candidate(file_id: u64, language: &str, downloads: u64, release: &str) -> Candidate {
        Candidate {
            file_id,
            language: language.to_string(),
            downloads,
            release: release.to_string(),
            feature_title: "Example Movie".to_string(),
            feature_year: Some(2024),
            feature_type: "movie".to_string(),
            hd: false,
            hearing_impaired: false,
            ai_translated: false,
        }
    }

    /// Create a movie identification context.
    pub fn movie_context(title: &str, tmdb_id: u64, year: &str) -> IdContext {
        IdContext {
            tmdb_id: Some(tmdb_id),
            parent_tmdb_id: None,
            episode_tmdb_id: None,
            imdb_id: String::new(),
            media_kind: MediaKind::Movie,
            title: title.to_string(),
            series_title: String::new(),
            year: year.to_string(),
            edition: String::new(),
            season: 0,
            episode: 0,
            languages: vec!["en".to_string()],
        }
    }

    /// Create an episode identification context.
    pub fn episode_context(series: &str, parent_tmdb_id: u64, season: u32, episode: u32) -> IdContext {
        IdContext {
            tmdb_id: None,
            parent_tmdb_id: Some(parent_tmdb_id),
            episode_tmdb_id: None,
            imdb_id: String::new(),
            media_kind: MediaKind::Episode,
            title: String::new(),
            series_title: series.to_string(),
            year: String::new(),
            edition: String::new(),
            season,
            episode,
            languages: vec!["en".to_string()],
        }
    }

    /// ffprobe JSON for a container with one default audio stream and
    /// the given duration.
    pub fn probe_json(duration_seconds: f64) -> String {
        format!(
            r#"{{
                "streams": [
                    {{"index": 0, "codec_type": "video", "codec_name": "h264"}},
                    {{"index": 1, "codec_type": "audio", "codec_name": "aac",
                     "disposition": {{"default": 1}}, "tags": {{"language": "eng"}}}}
                ],
                "format": {{"duration": "{}"}}
            }}"#,
            duration_seconds
        )
    }

    /// A small SRT payload from (start, end, text) triples.
    pub fn srt_payload(cues: &[(f64, f64, &str)]) -> Vec<u8> {
        let cues: Vec<crate::srt::Cue> = cues
            .iter()
            .enumerate()
            .map(|(i, (start, end, text))| crate::srt::Cue::new(i + 1, *start, *end, *text))
            .collect();
        crate::srt::emit(&cues)
    }
}
