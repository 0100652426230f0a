//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Remote provider (searches, downloads, retries, rate-gate waits)
//! - Generation (transcriptions, alignments)
//! - Muxing

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Remote provider metrics
// =============================================================================

/// Provider search calls total by result.
pub static PROVIDER_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "subplot_provider_searches_total",
            "Total provider search calls",
        ),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Provider downloads total by result.
pub static PROVIDER_DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "subplot_provider_downloads_total",
            "Total provider download calls",
        ),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Retry attempts against the provider.
pub static PROVIDER_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "subplot_provider_retries_total",
        "Total provider retry attempts",
    )
    .unwrap()
});

/// Time spent waiting on the rate gate.
pub static RATE_GATE_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "subplot_rate_gate_wait_seconds",
            "Time spent waiting for the provider rate gate",
        )
        .buckets(vec![0.0, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        &[],
    )
    .unwrap()
});

/// Candidates returned per search.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "subplot_search_results",
            "Number of candidates returned per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Generation metrics
// =============================================================================

/// Transcription runs total by result.
pub static TRANSCRIPTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplot_transcriptions_total", "Total transcription runs"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Alignment runs rejected by the quality guard.
pub static ALIGNMENTS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "subplot_alignments_rejected_total",
        "Total alignments rejected by the quality guard",
    )
    .unwrap()
});

/// Subtitles generated per source.
pub static SUBTITLES_GENERATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplot_subtitles_generated_total", "Subtitles generated"),
        &["source"], // "opensubtitles", "whisperx", "cache"
    )
    .unwrap()
});

// =============================================================================
// Muxing metrics
// =============================================================================

/// Mux operations total by result.
pub static MUXES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplot_muxes_total", "Total container mux operations"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PROVIDER_SEARCHES.clone()),
        Box::new(PROVIDER_DOWNLOADS.clone()),
        Box::new(PROVIDER_RETRIES.clone()),
        Box::new(RATE_GATE_WAIT.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        Box::new(TRANSCRIPTIONS.clone()),
        Box::new(ALIGNMENTS_REJECTED.clone()),
        Box::new(SUBTITLES_GENERATED.clone()),
        Box::new(MUXES.clone()),
    ]
}
