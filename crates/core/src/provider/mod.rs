//! Remote subtitle provider: search/download client, candidate
//! ranking, and multi-variant search strategy.
//!
//! All outbound calls flow through a per-instance rate gate (minimum
//! 1 s spacing) and a retry loop with doubling backoff for transient
//! failures. Candidates come back ranked; iteration order downstream
//! is strictly the ranked order.

mod client;
mod ranker;
mod strategy;
mod types;

pub use client::{OpenSubtitlesClient, ProviderConfig};
pub use ranker::rank_candidates;
pub use strategy::{episode_variants, movie_variants, search_with_fallback};
pub use types::{
    Candidate, Download, ProviderError, ScoredCandidate, SearchOutcome, SearchRequest,
    SubtitleProvider,
};
