//! Candidate scoring and ordering.
//!
//! The score starts from download popularity (`ln(1 + downloads)`) and
//! moves with release-name heuristics, edition/title/year agreement,
//! media-type agreement, and per-track flags. Candidates are then
//! bucketed by preferred language and AI-translation status before
//! sorting, so a low-scoring candidate in the preferred language still
//! beats a perfect one in a fallback language.

use tracing::debug;

use crate::ident::{
    canonical_edition, compare_titles, is_title_mismatch, normalize_release, release_has_edition,
    IdContext, MediaKind, TitleMatch,
};

use super::types::{Candidate, ScoredCandidate};

/// Score, filter, and order search results against the item context.
///
/// Candidates with `file_id == 0` or a hard title mismatch are dropped
/// before scoring.
pub fn rank_candidates(candidates: &[Candidate], context: &IdContext) -> Vec<ScoredCandidate> {
    let preferred: Vec<String> = context.languages.clone();

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter(|c| c.file_id != 0)
        .filter(|c| !is_title_mismatch(&context.title, &c.feature_title))
        .map(|c| score_candidate(c, context))
        .collect();

    scored.sort_by(|a, b| {
        let bucket_a = bucket(&a.candidate, &preferred);
        let bucket_b = bucket(&b.candidate, &preferred);
        bucket_a
            .cmp(&bucket_b)
            .then_with(|| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.candidate.downloads.cmp(&a.candidate.downloads))
            .then_with(|| a.candidate.file_id.cmp(&b.candidate.file_id))
    });

    debug!(
        input = candidates.len(),
        ranked = scored.len(),
        "Candidates ranked"
    );
    scored
}

/// Language/AI bucket. Lower sorts first.
fn bucket(candidate: &Candidate, preferred: &[String]) -> u8 {
    let lang = crate::ident::normalize_language(&candidate.language);
    let preferred_lang = preferred.iter().any(|p| *p == lang);
    match (preferred_lang, candidate.ai_translated) {
        (true, false) => 0,
        (true, true) => 1,
        (false, false) => 2,
        (false, true) => 3,
    }
}

fn score_candidate(candidate: &Candidate, context: &IdContext) -> ScoredCandidate {
    let mut score = (1.0 + candidate.downloads as f64).ln();
    let mut reasons = Vec::new();
    let add = |score: &mut f64, delta: f64, reason: &str, reasons: &mut Vec<String>| {
        *score += delta;
        reasons.push(reason.to_string());
    };

    let release_lower = candidate.release.to_lowercase();
    let release_norm = normalize_release(&candidate.release);
    let tokens: Vec<&str> = release_norm.split_whitespace().collect();
    let has = |needles: &[&str]| needles.iter().any(|n| release_lower.contains(n));
    let has_token = |needles: &[&str]| needles.iter().any(|n| tokens.contains(n));

    // Release source heuristics.
    if has(&["bluray", "blu-ray", "bdrip", "brrip"]) {
        add(&mut score, 3.0, "release=bluray", &mut reasons);
    }
    if has(&["remux"]) {
        add(&mut score, 2.5, "release=remux", &mut reasons);
    }
    if has(&["2160p", "uhd", "4k"]) {
        add(&mut score, 1.5, "release=uhd", &mut reasons);
    }
    if has(&["1080p"]) {
        add(&mut score, 1.0, "release=1080p", &mut reasons);
    }
    if has(&["720p"]) {
        add(&mut score, 0.5, "release=720p", &mut reasons);
    }
    if has(&["webrip", "web-dl", "webdl"]) {
        add(&mut score, -2.0, "release=web", &mut reasons);
    }
    if has(&["hdrip", "dvdrip", "tvrip", "hdtv"]) {
        add(&mut score, -1.0, "release=sd", &mut reasons);
    }
    // Short tags need word boundaries or "ts" would match "artists".
    if has(&["telesync", "telecine", "screener"]) || has_token(&["cam", "ts", "tc", "scr"]) {
        add(&mut score, -4.0, "release=cam", &mut reasons);
    }
    if has(&["hcsub", "hardcoded"]) {
        add(&mut score, -1.5, "release=hardcoded", &mut reasons);
    }

    // Edition agreement.
    if !context.edition.is_empty() {
        let canon = canonical_edition(&context.edition);
        let matched = match canon {
            Some(key) => release_has_edition(&candidate.release, key),
            None => release_norm.contains(normalize_release(&context.edition).trim()),
        };
        if matched {
            add(&mut score, 8.0, "edition=match", &mut reasons);
        } else {
            add(&mut score, -6.0, "edition=mismatch", &mut reasons);
        }
    }

    // Title agreement. Hard mismatches are filtered before scoring,
    // but the penalty stays for callers that skip the pre-filter.
    match compare_titles(&context.title, &candidate.feature_title) {
        TitleMatch::Exact => add(&mut score, 1.0, "title=exact", &mut reasons),
        TitleMatch::Contains => add(&mut score, 0.5, "title=contains", &mut reasons),
        TitleMatch::Partial => add(&mut score, 0.0, "title=partial", &mut reasons),
        TitleMatch::None => add(&mut score, -10.0, "title=mismatch", &mut reasons),
        TitleMatch::Unknown => {}
    }

    // Year agreement.
    if let (Some(expected), Some(actual)) = (context.year_number(), candidate.feature_year) {
        let delta = (expected - actual).abs();
        match delta {
            0 => add(&mut score, 1.5, "year=exact", &mut reasons),
            1 => add(&mut score, 1.0, "year=close", &mut reasons),
            2..=3 => add(&mut score, -0.5, "year=off", &mut reasons),
            4..=5 => add(&mut score, -1.5, "year=far", &mut reasons),
            _ => add(&mut score, -4.0, "year=wrong", &mut reasons),
        }
    }

    // Media type agreement.
    if let Some(kind) = MediaKind::parse(&candidate.feature_type) {
        if kind != context.media_kind {
            add(&mut score, -1.0, "media_type=mismatch", &mut reasons);
        }
    }

    // Per-track flags.
    if candidate.hd {
        add(&mut score, 0.5, "flag=hd", &mut reasons);
    }
    if candidate.hearing_impaired {
        add(&mut score, -0.5, "flag=hi", &mut reasons);
    }
    if candidate.ai_translated {
        add(&mut score, -4.0, "flag=ai", &mut reasons);
    }

    ScoredCandidate {
        candidate: candidate.clone(),
        score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::MediaKind;

    fn context() -> IdContext {
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

    fn candidate(file_id: u64, language: &str, downloads: u64, release: &str) -> Candidate {
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

    #[test]
    fn test_bluray_beats_popular_webdl() {
        let ctx = context();
        let bluray = candidate(1, "en", 600, "Example.Movie.2024.1080p.BluRay.x264");
        let webdl = candidate(2, "en", 6000, "Example.Movie.2024.WEB-DL");

        let ranked = rank_candidates(&[webdl, bluray], &ctx);
        assert_eq!(ranked[0].candidate.file_id, 1);
        assert!(ranked[0].reasons.contains(&"release=bluray".to_string()));
        assert!(ranked[1].reasons.contains(&"release=web".to_string()));
    }

    #[test]
    fn test_language_buckets() {
        let ctx = context();
        let es_bluray = candidate(1, "es", 5000, "Example.Movie.2024.BluRay");
        let en_bluray = candidate(2, "en", 100, "Example.Movie.2024.BluRay");
        let mut en_web_ai = candidate(3, "en", 9000, "Example.Movie.2024.WEB-DL");
        en_web_ai.ai_translated = true;

        let ranked = rank_candidates(&[es_bluray, en_bluray, en_web_ai], &ctx);
        let order: Vec<u64> = ranked.iter().map(|s| s.candidate.file_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_hard_title_mismatch_filtered() {
        let ctx = context();
        let mut wrong = candidate(1, "en", 100, "Release");
        wrong.feature_title = "Completely Different Feature".to_string();
        let right = candidate(2, "en", 100, "Release");

        let ranked = rank_candidates(&[wrong, right], &ctx);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.file_id, 2);
    }

    #[test]
    fn test_zero_file_id_filtered() {
        let ctx = context();
        let ranked = rank_candidates(&[candidate(0, "en", 100, "Release")], &ctx);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_edition_match_and_mismatch() {
        let mut ctx = context();
        ctx.edition = "Director's Cut".to_string();

        let dc = candidate(1, "en", 10, "Example.Movie.2024.Directors.Cut.1080p");
        let plain = candidate(2, "en", 10, "Example.Movie.2024.1080p");

        let ranked = rank_candidates(&[plain.clone(), dc.clone()], &ctx);
        assert_eq!(ranked[0].candidate.file_id, 1);
        assert!(ranked[0].reasons.contains(&"edition=match".to_string()));
        assert!(ranked[1].reasons.contains(&"edition=mismatch".to_string()));
        // +8 vs -6 dominates everything else here.
        assert!(ranked[0].score - ranked[1].score > 10.0);
    }

    #[test]
    fn test_year_scoring() {
        let ctx = context();
        let mut far = candidate(1, "en", 100, "x");
        far.feature_year = Some(2017);
        let mut close = candidate(2, "en", 100, "x");
        close.feature_year = Some(2023);

        let ranked = rank_candidates(&[far, close], &ctx);
        assert_eq!(ranked[0].candidate.file_id, 2);
        assert!(ranked[0].reasons.contains(&"year=close".to_string()));
        assert!(ranked[1].reasons.contains(&"year=wrong".to_string()));
    }

    #[test]
    fn test_short_cam_tags_need_word_boundary() {
        let ctx = context();
        // "ts" inside "artists" must not trigger the cam penalty.
        let scored = score_candidate(&candidate(1, "en", 0, "Example.Movie.By.Artists"), &ctx);
        assert!(!scored.reasons.contains(&"release=cam".to_string()));

        let scored = score_candidate(&candidate(1, "en", 0, "Example.Movie.TS.XViD"), &ctx);
        assert!(scored.reasons.contains(&"release=cam".to_string()));
    }

    #[test]
    fn test_flag_scoring() {
        let ctx = context();
        let mut c = candidate(1, "en", 0, "x");
        c.hd = true;
        c.hearing_impaired = true;
        let scored = score_candidate(&c, &ctx);
        assert!(scored.reasons.contains(&"flag=hd".to_string()));
        assert!(scored.reasons.contains(&"flag=hi".to_string()));
    }

    #[test]
    fn test_media_type_mismatch_penalty() {
        let ctx = context();
        let mut c = candidate(1, "en", 0, "x");
        c.feature_type = "tv".to_string();
        let scored = score_candidate(&c, &ctx);
        assert!(scored.reasons.contains(&"media_type=mismatch".to_string()));
    }

    #[test]
    fn test_tie_break_downloads_then_file_id() {
        let ctx = context();
        let a = candidate(9, "en", 100, "x");
        let b = candidate(4, "en", 100, "x");
        let c = candidate(2, "en", 500, "x");

        let ranked = rank_candidates(&[a, b, c], &ctx);
        let order: Vec<u64> = ranked.iter().map(|s| s.candidate.file_id).collect();
        assert_eq!(order, vec![2, 4, 9]);
    }
}
