// Allow some clippy lints that are too noisy for this codebase
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::collapsible_if)]

pub mod align;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod duration;
pub mod ident;
pub mod metrics;
pub mod mux;
pub mod pipeline;
pub mod provider;
pub mod srt;
pub mod tools;
pub mod transcribe;

/// Testing utilities and mock implementations for E2E tests.
///
/// This module provides mock implementations of all external service traits,
/// allowing comprehensive E2E testing without real infrastructure.
pub mod testing;

pub use align::{
    align_forced, align_subtitle, AlignError, AlignRequest, AlignmentGuardConfig, AlignmentReport,
    AlignmentVerdict, ForcedAlignConfig,
};
pub use cache::{snippet_transcript_key, CacheDir, CacheError, CacheMeta, SubtitleCache};
pub use cancel::{cancel_pair, is_cancelled, never_cancelled, wait_cancelled, CancelSignal};
pub use config::{
    load_config, load_config_from_str, validate_config, CacheConfig, Config, ConfigError,
    SanitizedConfig, StageConfig, ToolsConfig, TranscribeConfig, VadMethod,
};
pub use duration::{classify, detect_suspect_misid, DurationConfig, DurationVerdict};
pub use ident::{
    canonical_edition, compare_titles, display_name, extract_year, is_title_mismatch,
    normalize_language, normalize_release, release_has_edition, strict_title_match, three_to_two,
    two_to_three, IdContext, MediaKind, TitleMatch,
};
pub use mux::{mux_subtitles, MuxError, MuxRequest};
pub use pipeline::{
    AssetRecord, AssetStatus, Assets, EncodedFile, GenerationRecord, ItemSummary, Manifest,
    QueueError, QueueStore, SoftReject, StageError, SubtitleStage, SubtitleTarget, WorkItem,
    PRIMARY_EPISODE_KEY,
};
pub use provider::{
    episode_variants, movie_variants, rank_candidates, search_with_fallback, Candidate, Download,
    OpenSubtitlesClient, ProviderConfig, ProviderError, ScoredCandidate, SearchOutcome,
    SearchRequest, SubtitleProvider,
};
pub use srt::{Cue, SrtError};
pub use tools::{
    pick_audio_stream, probe_media, MediaInfo, StreamInfo, SystemRunner, ToolError, ToolOutput,
    ToolRunner, ToolSpec,
};
pub use transcribe::{
    extract_audio, transcribe, transcribe_snippet, SnippetRequest, TokenValidator,
    TranscribeError, TranscriptionPlan,
};
