//! Mock subtitle provider for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::provider::{
    Candidate, Download, ProviderError, SearchOutcome, SearchRequest, SubtitleProvider,
};

type ErrorFactory = Box<dyn Fn() -> ProviderError + Send + Sync>;

/// Mock implementation of the `SubtitleProvider` trait.
///
/// Provides controllable behavior for testing:
/// - Queue scripted search result sets (popped per call; an empty
///   queue returns empty outcomes)
/// - Register download payloads per file id
/// - Track every search and download for assertions
/// - Simulate failures
pub struct MockProvider {
    search_queue: Mutex<VecDeque<Vec<Candidate>>>,
    search_error: Mutex<Option<ErrorFactory>>,
    downloads: Mutex<HashMap<u64, Vec<u8>>>,
    recorded_searches: Mutex<Vec<SearchRequest>>,
    recorded_downloads: Mutex<Vec<u64>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a mock provider that returns empty search results.
    pub fn new() -> Self {
        Self {
            search_queue: Mutex::new(VecDeque::new()),
            search_error: Mutex::new(None),
            downloads: Mutex::new(HashMap::new()),
            recorded_searches: Mutex::new(Vec::new()),
            recorded_downloads: Mutex::new(Vec::new()),
        }
    }

    /// Queue a scripted result set for the next search call.
    pub fn push_search(&self, candidates: Vec<Candidate>) {
        self.search_queue.lock().unwrap().push_back(candidates);
    }

    /// Make every search call fail with a freshly built error.
    pub fn fail_searches_with(
        &self,
        factory: impl Fn() -> ProviderError + Send + Sync + 'static,
    ) {
        *self.search_error.lock().unwrap() = Some(Box::new(factory));
    }

    /// Register the payload served for a file id.
    pub fn set_download(&self, file_id: u64, bytes: Vec<u8>) {
        self.downloads.lock().unwrap().insert(file_id, bytes);
    }

    /// Number of search calls made.
    pub fn search_calls(&self) -> usize {
        self.recorded_searches.lock().unwrap().len()
    }

    /// Number of download calls made.
    pub fn download_calls(&self) -> usize {
        self.recorded_downloads.lock().unwrap().len()
    }

    /// Every search request, in call order.
    pub fn recorded_searches(&self) -> Vec<SearchRequest> {
        self.recorded_searches.lock().unwrap().clone()
    }

    /// A candidate whose feature matches the fixtures' movie context.
    pub fn sample_candidate(file_id: u64, language: &str, downloads: u64) -> Candidate {
        Candidate {
            file_id,
            language: language.to_string(),
            downloads,
            release: "Example.Movie.2024.1080p.BluRay.x264".to_string(),
            feature_title: "Example Movie".to_string(),
            feature_year: Some(2024),
            feature_type: "movie".to_string(),
            hd: true,
            hearing_impaired: false,
            ai_translated: false,
        }
    }
}

#[async_trait]
impl SubtitleProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        request: &SearchRequest,
        _cancel: &CancelSignal,
    ) -> Result<SearchOutcome, ProviderError> {
        self.recorded_searches.lock().unwrap().push(request.clone());

        if let Some(factory) = self.search_error.lock().unwrap().as_ref() {
            return Err(factory());
        }

        let candidates = self
            .search_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let total = candidates.len() as u64;
        Ok(SearchOutcome { candidates, total })
    }

    async fn download(
        &self,
        file_id: u64,
        _cancel: &CancelSignal,
    ) -> Result<Download, ProviderError> {
        self.recorded_downloads.lock().unwrap().push(file_id);

        match self.downloads.lock().unwrap().get(&file_id) {
            Some(bytes) => Ok(Download {
                bytes: bytes.clone(),
                file_name: format!("{}.srt", file_id),
                language: "en".to_string(),
                url: format!("mock://download/{}", file_id),
            }),
            None => Err(ProviderError::Api {
                status: 404,
                body: format!("no payload registered for file {}", file_id),
            }),
        }
    }
}
