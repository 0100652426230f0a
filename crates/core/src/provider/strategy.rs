//! Ordered query-variant generation and fallback iteration.
//!
//! One search request rarely fits all catalogues: TMDB ids are missing
//! for older items, titles are ambiguous without a year, and episode
//! air years rarely match the season's year. The strategy runs a
//! deduplicated variant list from most to least specific and stops at
//! the first variant that returns results.

use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::ident::{IdContext, MediaKind};

use super::types::{Candidate, ProviderError, SearchRequest, SubtitleProvider};

/// Ordered search variants for a movie context.
pub fn movie_variants(context: &IdContext) -> Vec<SearchRequest> {
    let languages = context.languages.clone();
    let imdb = context.sanitized_imdb_id();
    let title = (!context.title.is_empty()).then(|| context.title.clone());
    let year = context.year_number();

    let base = SearchRequest {
        tmdb_id: context.tmdb_id,
        imdb_id: imdb.clone(),
        query: title.clone(),
        year,
        languages: languages.clone(),
        media_kind: Some(MediaKind::Movie),
        ..Default::default()
    };

    let tmdb_only = SearchRequest {
        tmdb_id: context.tmdb_id,
        languages: languages.clone(),
        media_kind: Some(MediaKind::Movie),
        ..Default::default()
    };

    let title_year = SearchRequest {
        query: title.clone(),
        year,
        languages: languages.clone(),
        media_kind: Some(MediaKind::Movie),
        ..Default::default()
    };

    let title_only = SearchRequest {
        query: title,
        languages: languages.clone(),
        media_kind: Some(MediaKind::Movie),
        ..Default::default()
    };

    let imdb_only = SearchRequest {
        imdb_id: imdb,
        languages,
        media_kind: Some(MediaKind::Movie),
        ..Default::default()
    };

    dedupe([base, tmdb_only, title_year, title_only, imdb_only])
}

/// Ordered search variants for an episode context. Year is always
/// dropped: episode air dates rarely agree with the season-level year.
pub fn episode_variants(context: &IdContext) -> Vec<SearchRequest> {
    let languages = context.languages.clone();
    let show = if context.series_title.is_empty() {
        context.title.clone()
    } else {
        context.series_title.clone()
    };
    let show_query = (!show.is_empty()).then_some(show);
    let season = (context.season > 0).then_some(context.season);
    let episode = (context.episode > 0).then_some(context.episode);

    let episode_variant = |tmdb_id: Option<u64>, parent: Option<u64>, query: Option<String>| {
        SearchRequest {
            tmdb_id,
            parent_tmdb_id: parent,
            query,
            season,
            episode,
            languages: languages.clone(),
            media_kind: Some(MediaKind::Episode),
            ..Default::default()
        }
    };

    let primary = episode_variant(
        context.episode_tmdb_id,
        context.parent_tmdb_id,
        show_query.clone(),
    );
    let parent_only = episode_variant(None, context.parent_tmdb_id, None);
    let episode_id_only = episode_variant(context.episode_tmdb_id, None, None);
    let title_fallback = episode_variant(None, None, show_query);

    dedupe([primary, parent_only, episode_id_only, title_fallback])
}

fn dedupe<const N: usize>(variants: [SearchRequest; N]) -> Vec<SearchRequest> {
    let mut seen = std::collections::HashSet::new();
    variants
        .into_iter()
        .filter(|v| v.is_searchable())
        .filter(|v| seen.insert(v.signature()))
        .collect()
}

/// Run the variant list against the provider, returning the first
/// non-empty result set.
///
/// An empty list from every variant is an empty `Ok`; an error from
/// every variant propagates the last error.
pub async fn search_with_fallback(
    provider: &dyn SubtitleProvider,
    context: &IdContext,
    forced_only: bool,
    cancel: &CancelSignal,
) -> Result<Vec<Candidate>, ProviderError> {
    let mut variants = match context.media_kind {
        MediaKind::Movie => movie_variants(context),
        MediaKind::Episode => episode_variants(context),
    };
    for variant in &mut variants {
        variant.forced_only = forced_only;
    }

    let total = variants.len();
    let mut last_error: Option<ProviderError> = None;
    let mut any_succeeded = false;

    for (i, variant) in variants.iter().enumerate() {
        debug!(variant = i + 1, total = total, signature = %variant.signature(), "Trying search variant");
        match provider.search(variant, cancel).await {
            Ok(outcome) => {
                any_succeeded = true;
                if !outcome.candidates.is_empty() {
                    debug!(
                        variant = i + 1,
                        results = outcome.candidates.len(),
                        "Search variant produced results"
                    );
                    return Ok(outcome.candidates);
                }
            }
            Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
            Err(e) => {
                warn!(variant = i + 1, error = %e, "Search variant failed");
                last_error = Some(e);
            }
        }
    }

    if any_succeeded {
        return Ok(Vec::new());
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(Vec::new()),
    }
}
