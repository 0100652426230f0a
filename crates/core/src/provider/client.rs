//! OpenSubtitles-class HTTP client.

use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::{wait_cancelled, CancelSignal};
use crate::metrics;

use super::types::{
    Candidate, Download, ProviderError, SearchOutcome, SearchRequest, SubtitleProvider,
};

/// Minimum spacing between any two outbound calls.
pub(crate) const MIN_CALL_INTERVAL: Duration = Duration::from_secs(1);
/// Retry budget for transient failures.
pub(crate) const MAX_RATE_RETRIES: u32 = 4;
/// First backoff delay; doubles per attempt.
pub(crate) const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
/// Backoff ceiling.
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(12);

const API_KEY_HEADER: &str = "Api-Key";

/// Configuration for the remote subtitle provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// API key; required for any remote lookup.
    #[serde(default)]
    pub api_key: String,
    /// User-Agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional per-user bearer token.
    #[serde(default)]
    pub user_token: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.opensubtitles.com/api/v1".to_string()
}

fn default_user_agent() -> String {
    "subplot/0.1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            user_agent: default_user_agent(),
            user_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Authenticated client for the subtitle provider.
///
/// One instance per stage worker. All calls are serialized through the
/// rate gate, so the 1 s minimum spacing holds across search, download
/// link resolution, and payload fetches alike.
pub struct OpenSubtitlesClient {
    config: ProviderConfig,
    http: OnceCell<Client>,
    last_call: Mutex<Option<Instant>>,
}

impl OpenSubtitlesClient {
    /// Create a client. The HTTP client itself is built lazily on
    /// first use.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: OnceCell::new(),
            last_call: Mutex::new(None),
        }
    }

    fn http(&self) -> Result<&Client, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "missing provider API key".to_string(),
            ));
        }
        self.http.get_or_try_init(|| {
            let mut headers = HeaderMap::new();
            headers.insert(
                API_KEY_HEADER,
                HeaderValue::from_str(&self.config.api_key)
                    .map_err(|e| ProviderError::Configuration(format!("bad API key: {}", e)))?,
            );
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(&self.config.user_agent)
                    .map_err(|e| ProviderError::Configuration(format!("bad user agent: {}", e)))?,
            );
            if !self.config.user_token.is_empty() {
                let value = format!("Bearer {}", self.config.user_token);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&value).map_err(|e| {
                        ProviderError::Configuration(format!("bad user token: {}", e))
                    })?,
                );
            }
            Client::builder()
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .default_headers(headers)
                .build()
                .map_err(|e| ProviderError::Configuration(e.to_string()))
        })
    }

    /// Enforce the minimum spacing before an outbound call. The lock
    /// is held across the sleep so calls stay globally serialized.
    async fn gate(&self, cancel: &CancelSignal) -> Result<(), ProviderError> {
        let mut last = self.last_call.lock().await;
        let mut waited = 0.0;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < MIN_CALL_INTERVAL {
                let remaining = MIN_CALL_INTERVAL - elapsed;
                waited = remaining.as_secs_f64();
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = wait_cancelled(cancel) => return Err(ProviderError::Cancelled),
                }
            }
        }
        *last = Some(Instant::now());
        metrics::RATE_GATE_WAIT.with_label_values(&[]).observe(waited);
        Ok(())
    }

    /// Run one request through the gate and the retry loop.
    async fn execute<F>(
        &self,
        build: F,
        cancel: &CancelSignal,
    ) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let client = self.http()?;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt: u32 = 0;

        loop {
            self.gate(cancel).await?;

            let sent = tokio::select! {
                r = build(client).send() => r,
                _ = wait_cancelled(cancel) => return Err(ProviderError::Cancelled),
            };

            let error = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    ProviderError::Api {
                        status,
                        body: body.chars().take(200).collect(),
                    }
                }
                Err(e) if e.is_timeout() => ProviderError::Transport(format!("timeout: {}", e)),
                Err(e) => ProviderError::Transport(e.to_string()),
            };

            if !error.is_retriable() || attempt >= MAX_RATE_RETRIES {
                return Err(error);
            }

            attempt += 1;
            metrics::PROVIDER_RETRIES.inc();
            warn!(attempt = attempt, backoff_secs = backoff.as_secs(), error = %error, "Provider call failed, retrying");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_cancelled(cancel) => return Err(ProviderError::Cancelled),
            }
            backoff = next_backoff(backoff);
        }
    }
}

/// Doubling backoff capped at [`MAX_BACKOFF`].
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Assemble the search query parameters, skipping empty fields.
fn build_search_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = Vec::new();

    if let Some(episode) = request.episode {
        params.push(("episode_number", episode.to_string()));
    }
    if request.forced_only {
        params.push(("foreign_parts_only", "only".to_string()));
    }
    if let Some(imdb) = request.imdb_id.as_deref().filter(|s| !s.is_empty()) {
        params.push(("imdb_id", imdb.to_string()));
    }
    if !request.languages.is_empty() {
        params.push(("languages", request.languages.join(",")));
    }
    if let Some(parent) = request.parent_tmdb_id {
        params.push(("parent_tmdb_id", parent.to_string()));
    }
    if let Some(query) = request.query.as_deref().filter(|s| !s.is_empty()) {
        params.push(("query", query.to_lowercase()));
    }
    if let Some(season) = request.season {
        params.push(("season_number", season.to_string()));
    }
    if let Some(tmdb) = request.tmdb_id {
        params.push(("tmdb_id", tmdb.to_string()));
    }
    if let Some(kind) = request.media_kind {
        params.push(("type", kind.as_str().to_string()));
    }
    if let Some(year) = request.year {
        params.push(("year", year.to_string()));
    }

    params
}

#[async_trait::async_trait]
impl SubtitleProvider for OpenSubtitlesClient {
    fn name(&self) -> &str {
        "opensubtitles"
    }

    async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancelSignal,
    ) -> Result<SearchOutcome, ProviderError> {
        let url = format!("{}/subtitles", self.config.api_url.trim_end_matches('/'));
        let params = build_search_params(request);
        debug!(url = %url, params = ?params, "Provider search");

        let response = match self.execute(|c| c.get(&url).query(&params), cancel).await {
            Ok(r) => r,
            Err(e) => {
                metrics::PROVIDER_SEARCHES.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let candidates: Vec<Candidate> = body
            .data
            .into_iter()
            .flat_map(candidates_from_datum)
            .collect();

        metrics::PROVIDER_SEARCHES.with_label_values(&["success"]).inc();
        metrics::SEARCH_RESULTS
            .with_label_values(&[])
            .observe(candidates.len() as f64);
        debug!(results = candidates.len(), total = body.total_count, "Provider search complete");

        Ok(SearchOutcome {
            candidates,
            total: body.total_count,
        })
    }

    async fn download(
        &self,
        file_id: u64,
        cancel: &CancelSignal,
    ) -> Result<Download, ProviderError> {
        let url = format!("{}/download", self.config.api_url.trim_end_matches('/'));
        let payload = serde_json::json!({ "file_id": file_id });

        let link: DownloadResponse = match self
            .execute(|c| c.post(&url).json(&payload), cancel)
            .await
        {
            Ok(r) => r
                .json()
                .await
                .map_err(|e| ProviderError::Decode(e.to_string()))?,
            Err(e) => {
                metrics::PROVIDER_DOWNLOADS.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };

        let bytes = match self.execute(|c| c.get(&link.link), cancel).await {
            Ok(r) => r
                .bytes()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?,
            Err(e) => {
                metrics::PROVIDER_DOWNLOADS.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };

        metrics::PROVIDER_DOWNLOADS.with_label_values(&["success"]).inc();
        debug!(file_id = file_id, bytes = bytes.len(), "Subtitle downloaded");

        Ok(Download {
            bytes: bytes.to_vec(),
            file_name: link.file_name,
            language: link.language,
            url: link.link,
        })
    }
}

// Provider wire shapes. Everything optional; responses are messy.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchDatum>,
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchDatum {
    attributes: Option<SearchAttributes>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchAttributes {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    download_count: Option<u64>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    hd: Option<bool>,
    #[serde(default)]
    hearing_impaired: Option<bool>,
    #[serde(default)]
    ai_translated: Option<bool>,
    #[serde(default)]
    feature_details: Option<FeatureDetails>,
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct FeatureDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    feature_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(default)]
    file_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    language: String,
}

fn candidates_from_datum(datum: SearchDatum) -> Vec<Candidate> {
    let attrs = match datum.attributes {
        Some(a) => a,
        None => return Vec::new(),
    };
    let feature = attrs.feature_details.unwrap_or_default();

    attrs
        .files
        .iter()
        .map(|f| Candidate {
            file_id: f.file_id.unwrap_or(0),
            language: attrs.language.clone().unwrap_or_default(),
            downloads: attrs.download_count.unwrap_or(0),
            release: attrs.release.clone().unwrap_or_default(),
            feature_title: feature.title.clone().unwrap_or_default(),
            feature_year: feature.year,
            feature_type: feature.feature_type.clone().unwrap_or_default(),
            hd: attrs.hd.unwrap_or(false),
            hearing_impaired: attrs.hearing_impaired.unwrap_or(false),
            ai_translated: attrs.ai_translated.unwrap_or(false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::never_cancelled;
    use crate::ident::MediaKind;

    #[test]
    fn test_build_search_params_full() {
        let request = SearchRequest {
            tmdb_id: Some(123),
            parent_tmdb_id: Some(77),
            imdb_id: Some("0133093".to_string()),
            query: Some("Example Movie".to_string()),
            year: Some(2024),
            season: Some(1),
            episode: Some(2),
            languages: vec!["en".to_string(), "de".to_string()],
            media_kind: Some(MediaKind::Episode),
            forced_only: false,
        };

        let params = build_search_params(&request);
        assert!(params.contains(&("tmdb_id", "123".to_string())));
        assert!(params.contains(&("parent_tmdb_id", "77".to_string())));
        assert!(params.contains(&("imdb_id", "0133093".to_string())));
        assert!(params.contains(&("query", "example movie".to_string())));
        assert!(params.contains(&("languages", "en,de".to_string())));
        assert!(params.contains(&("season_number", "1".to_string())));
        assert!(params.contains(&("episode_number", "2".to_string())));
        assert!(params.contains(&("type", "episode".to_string())));
        assert!(params.contains(&("year", "2024".to_string())));
    }

    #[test]
    fn test_build_search_params_skips_empty() {
        let params = build_search_params(&SearchRequest::default());
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_search_params_forced() {
        let request = SearchRequest {
            tmdb_id: Some(1),
            forced_only: true,
            ..Default::default()
        };
        let params = build_search_params(&request);
        assert!(params.contains(&("foreign_parts_only", "only".to_string())));
    }

    #[test]
    fn test_candidates_from_search_response() {
        let json = r#"{
            "total_count": 2,
            "data": [
                {"attributes": {
                    "language": "en",
                    "download_count": 600,
                    "release": "Example.Movie.2024.1080p.BluRay.x264",
                    "hd": true,
                    "hearing_impaired": false,
                    "ai_translated": false,
                    "feature_details": {"title": "Example Movie", "year": 2024, "feature_type": "movie"},
                    "files": [{"file_id": 42}, {"file_id": 43}]
                }},
                {"attributes": {
                    "language": "es",
                    "files": [{}]
                }}
            ]
        }"#;
        let body: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates: Vec<Candidate> = body
            .data
            .into_iter()
            .flat_map(candidates_from_datum)
            .collect();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].file_id, 42);
        assert_eq!(candidates[1].file_id, 43);
        assert_eq!(candidates[0].downloads, 600);
        assert_eq!(candidates[0].feature_year, Some(2024));
        // Missing file_id degrades to 0 and is filtered by the ranker.
        assert_eq!(candidates[2].file_id, 0);
        assert_eq!(candidates[2].language, "es");
    }

    #[test]
    fn test_download_response_parse() {
        let json = r#"{"link": "https://cdn.example/x.srt", "file_name": "x.srt", "language": "en"}"#;
        let parsed: DownloadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.link, "https://cdn.example/x.srt");
        assert_eq!(parsed.file_name, "x.srt");
    }

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = INITIAL_BACKOFF;
        let mut observed = vec![backoff.as_secs()];
        for _ in 0..4 {
            backoff = next_backoff(backoff);
            observed.push(backoff.as_secs());
        }
        assert_eq!(observed, vec![2, 4, 8, 12, 12]);
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let client = OpenSubtitlesClient::new(ProviderConfig::default());
        assert!(matches!(
            client.http(),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_enforces_spacing() {
        let client = OpenSubtitlesClient::new(ProviderConfig::default());
        let cancel = never_cancelled();

        let start = Instant::now();
        client.gate(&cancel).await.unwrap();
        client.gate(&cancel).await.unwrap();
        client.gate(&cancel).await.unwrap();

        // Two enforced gaps of 1s each.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rate_gate_cancellation() {
        let client = OpenSubtitlesClient::new(ProviderConfig::default());
        let (tx, cancel) = crate::cancel::cancel_pair();

        client.gate(&cancel).await.unwrap();
        tx.send(true).unwrap();
        // Second call must wait, observe the cancellation, and bail.
        let err = client.gate(&cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
