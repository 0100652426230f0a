//! Types for the remote subtitle provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelSignal;
use crate::ident::MediaKind;

/// Query parameters for one provider search call. Only non-empty
/// fields are sent on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// TMDB id of the work.
    pub tmdb_id: Option<u64>,
    /// TMDB id of the parent series, for episode searches.
    pub parent_tmdb_id: Option<u64>,
    /// IMDB id, digits only (already sanitized).
    pub imdb_id: Option<String>,
    /// Free-text title query.
    pub query: Option<String>,
    /// Release year filter.
    pub year: Option<i32>,
    /// Season number, for episode searches.
    pub season: Option<u32>,
    /// Episode number, for episode searches.
    pub episode: Option<u32>,
    /// Two-letter language filter, most preferred first.
    pub languages: Vec<String>,
    /// Media type filter.
    pub media_kind: Option<MediaKind>,
    /// Restrict to foreign-parts-only (forced) tracks.
    pub forced_only: bool,
}

impl SearchRequest {
    /// Stable signature for variant deduplication.
    pub fn signature(&self) -> String {
        format!(
            "tmdb={:?}|parent={:?}|imdb={:?}|q={:?}|y={:?}|s={:?}|e={:?}|langs={}|type={:?}|forced={}",
            self.tmdb_id,
            self.parent_tmdb_id,
            self.imdb_id,
            self.query,
            self.year,
            self.season,
            self.episode,
            self.languages.join(","),
            self.media_kind.map(|k| k.as_str()),
            self.forced_only
        )
    }

    /// Whether the request carries at least one searchable field.
    pub fn is_searchable(&self) -> bool {
        self.tmdb_id.is_some()
            || self.parent_tmdb_id.is_some()
            || self.imdb_id.is_some()
            || self.query.as_deref().is_some_and(|q| !q.is_empty())
    }
}

/// A single downloadable subtitle file from a search response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Provider file id; 0 marks an invalid entry and is filtered out.
    pub file_id: u64,
    /// Subtitle language as reported.
    pub language: String,
    /// Download count, used as the popularity base of the score.
    pub downloads: u64,
    /// Release descriptor string.
    pub release: String,
    /// Title of the feature the subtitle claims to match.
    pub feature_title: String,
    /// Year of that feature.
    pub feature_year: Option<i32>,
    /// Feature type as reported (`movie`, `episode`, ...).
    pub feature_type: String,
    /// Marked as matching an HD release.
    pub hd: bool,
    /// Hearing-impaired track.
    pub hearing_impaired: bool,
    /// Machine-translated track.
    pub ai_translated: bool,
}

/// A candidate with its computed score and the reasons behind it.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    /// Human-readable score components, e.g. `release=bluray`.
    pub reasons: Vec<String>,
}

/// Result of one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Candidates in response order.
    pub candidates: Vec<Candidate>,
    /// Total as declared by the provider (may exceed the page).
    pub total: u64,
}

/// A downloaded subtitle payload.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub language: String,
    pub url: String,
}

/// Errors from provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The client is not configured (missing API key).
    #[error("provider not configured: {0}")]
    Configuration(String),

    /// Transport-level failure.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("provider API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body did not decode.
    #[error("unparseable provider response: {0}")]
    Decode(String),

    /// The caller's cancellation signal fired.
    #[error("provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a retry with backoff may help.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429,
            Self::Transport(msg) => {
                let lower = msg.to_lowercase();
                [
                    "timeout",
                    "deadline exceeded",
                    "connection reset",
                    "connection refused",
                    "temporary failure",
                    "awaiting headers",
                    "rate limit",
                ]
                .iter()
                .any(|needle| lower.contains(needle))
            }
            _ => false,
        }
    }
}

/// Seam for the remote subtitle service.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Execute one search call.
    async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancelSignal,
    ) -> Result<SearchOutcome, ProviderError>;

    /// Download a subtitle payload by file id.
    async fn download(
        &self,
        file_id: u64,
        cancel: &CancelSignal,
    ) -> Result<Download, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_distinguishes_requests() {
        let a = SearchRequest {
            tmdb_id: Some(1),
            ..Default::default()
        };
        let b = SearchRequest {
            tmdb_id: Some(2),
            ..Default::default()
        };
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature(), a.clone().signature());
    }

    #[test]
    fn test_is_searchable() {
        assert!(!SearchRequest::default().is_searchable());
        assert!(SearchRequest {
            query: Some("title".to_string()),
            ..Default::default()
        }
        .is_searchable());
        assert!(!SearchRequest {
            query: Some(String::new()),
            ..Default::default()
        }
        .is_searchable());
        assert!(SearchRequest {
            imdb_id: Some("123".to_string()),
            ..Default::default()
        }
        .is_searchable());
    }

    #[test]
    fn test_retriable_classification() {
        assert!(ProviderError::Api {
            status: 429,
            body: String::new()
        }
        .is_retriable());
        assert!(!ProviderError::Api {
            status: 404,
            body: String::new()
        }
        .is_retriable());
        assert!(ProviderError::Transport("Connection reset by peer".to_string()).is_retriable());
        assert!(ProviderError::Transport("error awaiting headers".to_string()).is_retriable());
        assert!(!ProviderError::Transport("tls handshake".to_string()).is_retriable());
        assert!(!ProviderError::Cancelled.is_retriable());
    }
}
