//! The subtitle stage: drives every target of a work item through
//! cache lookup, remote search, transcription, alignment, forced-track
//! handling, muxing, and per-episode persistence.
//!
//! Targets are processed sequentially in manifest order. A failed
//! target records a failed asset and processing continues; the stage
//! itself only fails when every non-skipped target failed.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::align::{align_forced, align_subtitle, AlignError, AlignRequest};
use crate::cache::SubtitleCache;
use crate::cancel::{is_cancelled, CancelSignal};
use crate::config::Config;
use crate::duration::{classify, detect_suspect_misid, DurationVerdict};
use crate::ident::{strict_title_match, IdContext, MediaKind};
use crate::metrics;
use crate::provider::{
    rank_candidates, search_with_fallback, Candidate, ProviderError, SubtitleProvider,
};
use crate::srt;
use crate::tools::ToolRunner;
use crate::transcribe::{extract_audio, transcribe, TokenValidator, TranscriptionPlan};

use super::error::{SoftReject, StageError};
use super::queue::QueueStore;
use super::types::{AssetRecord, GenerationRecord, Manifest, SubtitleTarget, WorkItem};

const STAGE_NAME: &str = "subtitles";
const PREPARE_PERCENT: f32 = 5.0;
const GENERATE_SPAN: f32 = 90.0;

/// Counts for the stage's final summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSummary {
    pub total: usize,
    pub generated: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What the remote candidate loop produced.
enum RemoteOutcome {
    Accepted(GenerationRecord),
    /// No usable candidate; carries the last soft-reject reason for
    /// the logs.
    Exhausted(Option<String>),
}

/// One subtitle stage instance per queue worker.
pub struct SubtitleStage {
    config: Config,
    provider: Arc<dyn SubtitleProvider>,
    runner: Arc<dyn ToolRunner>,
    queue: Arc<dyn QueueStore>,
    cache: SubtitleCache,
    tokens: TokenValidator,
}

impl SubtitleStage {
    pub fn new(
        config: Config,
        provider: Arc<dyn SubtitleProvider>,
        runner: Arc<dyn ToolRunner>,
        queue: Arc<dyn QueueStore>,
        cache: SubtitleCache,
    ) -> Self {
        Self {
            config,
            provider,
            runner,
            queue,
            cache,
            tokens: TokenValidator::new(),
        }
    }

    /// Process every target of the item. Returns the summary, or
    /// `Transient` when every non-skipped target failed.
    pub async fn process_item(
        &self,
        item: &mut WorkItem,
        cancel: &CancelSignal,
    ) -> Result<ItemSummary, StageError> {
        let targets = item.targets();
        let mut summary = ItemSummary {
            total: targets.len(),
            ..Default::default()
        };

        self.queue
            .update_progress(&item.id, STAGE_NAME, "preparing", PREPARE_PERCENT)
            .await?;
        self.queue.set_error_message(&item.id, "").await?;

        for (index, target) in targets.iter().enumerate() {
            if is_cancelled(cancel) {
                return Err(StageError::Cancelled);
            }

            let label = if target.episode_title.is_empty() {
                target.episode_key.clone()
            } else {
                target.episode_title.clone()
            };
            let percent =
                PREPARE_PERCENT + GENERATE_SPAN * index as f32 / targets.len().max(1) as f32;
            self.queue
                .update_progress(
                    &item.id,
                    STAGE_NAME,
                    &format!("generating ({}/{} — {})", index + 1, targets.len(), label),
                    percent,
                )
                .await?;
            self.queue
                .set_active_episode(&item.id, &target.episode_key)
                .await?;

            // Resume: a completed asset for this episode key means a
            // previous run already finished it.
            if item.manifest.completed_subtitled(&target.episode_key).is_some() {
                info!(item = %item.id, episode = %target.episode_key, "Subtitle already generated, skipping");
                summary.skipped += 1;
                continue;
            }

            let episode_ctx =
                item.context
                    .for_episode(target.season, target.episode, &target.episode_title);

            match self
                .process_target(&item.id, &mut item.manifest, target, &episode_ctx, cancel)
                .await
            {
                Ok(record) => {
                    if record.cached {
                        summary.cached += 1;
                    } else {
                        summary.generated += 1;
                    }
                }
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => {
                    summary.failed += 1;
                    let message = e.to_string();
                    warn!(item = %item.id, episode = %target.episode_key, error = %message, "Subtitle generation failed");

                    if let StageError::SuspectMisId { ref deltas } = e {
                        let reason = format!(
                            "{} (deltas: {})",
                            message,
                            deltas
                                .iter()
                                .map(|d| format!("{:+.0}s", d))
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                        self.queue.flag_review(&item.id, &reason).await?;
                    }

                    item.manifest.upsert_subtitled(AssetRecord::failed(
                        &target.episode_key,
                        &target.title_id,
                        &message,
                    ));
                    item.manifest.record_generation(&GenerationRecord {
                        episode_key: target.episode_key.clone(),
                        source: String::new(),
                        cached: false,
                        segments: 0,
                        path: String::new(),
                        subtitles_muxed: false,
                        error: message,
                    });
                    self.queue.save_manifest(&item.id, &item.manifest).await?;
                }
            }
        }

        item.manifest.record_summary(json!({
            "total": summary.total,
            "generated": summary.generated,
            "cached": summary.cached,
            "skipped": summary.skipped,
            "failed": summary.failed,
        }));
        self.queue.save_manifest(&item.id, &item.manifest).await?;
        self.queue
            .update_progress(&item.id, STAGE_NAME, "finished", PREPARE_PERCENT + GENERATE_SPAN)
            .await?;

        info!(
            item = %item.id,
            total = summary.total,
            generated = summary.generated,
            cached = summary.cached,
            skipped = summary.skipped,
            failed = summary.failed,
            "Subtitle stage finished"
        );

        let processed = summary.total - summary.skipped;
        if processed > 0 && summary.failed == processed {
            return Err(StageError::Transient(format!(
                "all {} episode(s) failed subtitle generation",
                processed
            )));
        }
        Ok(summary)
    }

    /// Drive one target end to end and persist its asset record.
    async fn process_target(
        &self,
        item_id: &str,
        manifest: &mut Manifest,
        target: &SubtitleTarget,
        ctx: &IdContext,
        cancel: &CancelSignal,
    ) -> Result<GenerationRecord, StageError> {
        let plan = TranscriptionPlan::prepare(
            self.runner.as_ref(),
            &target.video_path,
            &target.work_dir,
            &target.output_dir,
            Some(&target.base_name),
            self.config.transcribe.cuda,
            cancel,
        )
        .await?;

        let result = self
            .generate(item_id, manifest, target, ctx, &plan, cancel)
            .await;
        plan.cleanup().await;
        let mut record = result?;

        // Structural validation of whatever we are about to ship. A
        // failed check flags review but does not fail the episode.
        let final_path = PathBuf::from(&record.path);
        match srt::validate(&final_path, plan.total_seconds, &self.config.duration) {
            Ok(issues) if !issues.is_empty() => {
                let reason = format!(
                    "subtitle validation issues for {}: {}",
                    target.episode_key,
                    issues.join("; ")
                );
                warn!(item = %item_id, episode = %target.episode_key, reason = %reason, "Flagging for review");
                self.queue.flag_review(item_id, &reason).await?;
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        let mut srt_paths = vec![final_path.clone()];
        if manifest.forced_subtitle_track()
            && self.config.stage.remote_enabled
            && !self.config.stage.force_ai
        {
            match self.forced_track(target, ctx, &final_path, cancel).await {
                Ok(Some(path)) => srt_paths.push(path),
                Ok(None) => {
                    info!(item = %item_id, episode = %target.episode_key, "No forced subtitle available")
                }
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => {
                    warn!(item = %item_id, error = %e, "Forced subtitle lookup failed, continuing without")
                }
            }
        }

        if self.config.stage.mux {
            let request = crate::mux::MuxRequest {
                source: target.video_path.clone(),
                srt_paths: srt_paths.clone(),
                language: ctx.primary_language(),
                strip_existing: self.config.stage.strip_existing_subs,
            };
            match crate::mux::mux_subtitles(self.runner.as_ref(), &request, cancel).await {
                Ok(muxed) => record.subtitles_muxed = muxed,
                Err(crate::mux::MuxError::Tool(crate::tools::ToolError::Cancelled { .. })) => {
                    return Err(StageError::Cancelled)
                }
                Err(e) => {
                    // The sidecar is intact; the episode still
                    // completes with subtitles_muxed = false.
                    warn!(item = %item_id, error = %e, "Mux failed, keeping sidecar subtitles");
                }
            }
        }

        manifest.upsert_subtitled(AssetRecord::completed(
            &target.episode_key,
            &target.title_id,
            &record.path,
            record.subtitles_muxed,
        ));
        manifest.record_generation(&record);
        self.queue.save_manifest(item_id, manifest).await?;

        Ok(record)
    }

    /// Produce the final subtitle for a target: cached transcript,
    /// remote candidates, or transcription.
    async fn generate(
        &self,
        item_id: &str,
        manifest: &Manifest,
        target: &SubtitleTarget,
        ctx: &IdContext,
        plan: &TranscriptionPlan,
        cancel: &CancelSignal,
    ) -> Result<GenerationRecord, StageError> {
        if ctx.media_kind != MediaKind::Movie {
            if let Some(record) = self.cached_transcript(manifest, target).await? {
                return Ok(record);
            }
        }

        if self.config.stage.force_ai || !self.config.stage.remote_enabled {
            return self.ai_generate(item_id, target, plan, cancel).await;
        }

        match self.remote_generate(target, ctx, plan, cancel).await? {
            RemoteOutcome::Accepted(record) => Ok(record),
            RemoteOutcome::Exhausted(last_reason) => {
                if let Some(reason) = last_reason {
                    info!(episode = %target.episode_key, reason = %reason, "No usable remote candidate, transcribing instead");
                } else {
                    info!(episode = %target.episode_key, "No remote candidates, transcribing instead");
                }
                self.ai_generate(item_id, target, plan, cancel).await
            }
        }
    }

    /// Pre-generated transcript lookup for episodes.
    async fn cached_transcript(
        &self,
        manifest: &Manifest,
        target: &SubtitleTarget,
    ) -> Result<Option<GenerationRecord>, StageError> {
        let transcripts = manifest.content_id_transcripts();
        let Some(source) = transcripts.get(&target.episode_key) else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(source).await {
            Ok(b) if !b.is_empty() => b,
            _ => {
                warn!(path = %source.display(), "Recorded transcript missing or empty, regenerating");
                return Ok(None);
            }
        };
        let segments = srt::parse(&bytes).len();
        if segments == 0 {
            warn!(path = %source.display(), "Recorded transcript has no cues, regenerating");
            return Ok(None);
        }

        let dest = target
            .output_dir
            .join(format!("{}.srt", target.base_name));
        tokio::fs::create_dir_all(&target.output_dir).await?;
        tokio::fs::copy(source, &dest).await?;
        metrics::SUBTITLES_GENERATED.with_label_values(&["cache"]).inc();
        debug!(from = %source.display(), to = %dest.display(), "Using pre-generated transcript");

        Ok(Some(GenerationRecord {
            episode_key: target.episode_key.clone(),
            source: "whisperx".to_string(),
            cached: true,
            segments,
            path: dest.to_string_lossy().to_string(),
            subtitles_muxed: false,
            error: String::new(),
        }))
    }

    /// The remote path: search, rank, then try candidates in order
    /// until one aligns and passes duration validation.
    async fn remote_generate(
        &self,
        target: &SubtitleTarget,
        ctx: &IdContext,
        plan: &TranscriptionPlan,
        cancel: &CancelSignal,
    ) -> Result<RemoteOutcome, StageError> {
        let candidates =
            search_with_fallback(self.provider.as_ref(), ctx, false, cancel).await?;
        let ranked = rank_candidates(&candidates, ctx);
        if ranked.is_empty() {
            return Ok(RemoteOutcome::Exhausted(None));
        }

        extract_audio(self.runner.as_ref(), plan, cancel).await?;

        let language = ctx.primary_language();
        let final_path = target
            .output_dir
            .join(format!("{}.{}.srt", target.base_name, language));

        let mut tried = 0usize;
        let mut duration_deltas: Vec<f64> = Vec::new();
        let mut last_reject: Option<SoftReject> = None;

        for scored in &ranked {
            if is_cancelled(cancel) {
                return Err(StageError::Cancelled);
            }
            let candidate = &scored.candidate;
            tried += 1;
            debug!(
                file_id = candidate.file_id,
                score = scored.score,
                reasons = ?scored.reasons,
                "Trying candidate"
            );

            let payload = match self.fetch_payload(candidate, cancel).await {
                Ok(bytes) => bytes,
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => {
                    warn!(file_id = candidate.file_id, error = %e, "Candidate download failed, trying next");
                    last_reject = Some(SoftReject::UnusablePayload {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let (cleaned, removed) = srt::clean(&payload);
            let cue_count = srt::parse(&cleaned).len();
            if cue_count == 0 {
                last_reject = Some(SoftReject::UnusablePayload {
                    reason: format!("candidate {} had no usable cues", candidate.file_id),
                });
                continue;
            }
            if removed > 0 {
                debug!(file_id = candidate.file_id, removed = removed, "Removed advertisement cues");
            }

            let input_path = plan
                .scratch_dir
                .join(format!("candidate-{}.srt", candidate.file_id));
            tokio::fs::write(&input_path, &cleaned).await?;

            let request = AlignRequest {
                audio_path: plan.audio_path.clone(),
                input_srt: input_path,
                output_srt: final_path.clone(),
                language: language.clone(),
                cuda: plan.cuda,
                sync_prepass: self.config.stage.sync_prepass,
            };
            match align_subtitle(
                self.runner.as_ref(),
                &request,
                &self.config.alignment,
                cancel,
            )
            .await
            {
                Ok(_) => {}
                Err(AlignError::QualityRejected { reason }) => {
                    debug!(file_id = candidate.file_id, reason = %reason, "Alignment rejected, trying next candidate");
                    last_reject = Some(SoftReject::AlignmentRejected { reason });
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let (first_start, last_end) = srt::bounds(&final_path)?;
            match classify(first_start, last_end, plan.total_seconds, &self.config.duration) {
                DurationVerdict::Accept => {
                    let segments = srt::count_cues(&final_path)?;
                    metrics::SUBTITLES_GENERATED
                        .with_label_values(&["opensubtitles"])
                        .inc();
                    info!(
                        file_id = candidate.file_id,
                        segments = segments,
                        path = %final_path.display(),
                        "Remote subtitle accepted"
                    );
                    return Ok(RemoteOutcome::Accepted(GenerationRecord {
                        episode_key: target.episode_key.clone(),
                        source: "opensubtitles".to_string(),
                        cached: false,
                        segments,
                        path: final_path.to_string_lossy().to_string(),
                        subtitles_muxed: false,
                        error: String::new(),
                    }));
                }
                DurationVerdict::SoftReject(reason) => {
                    let delta = plan.total_seconds - last_end;
                    debug!(file_id = candidate.file_id, delta = delta, reason = %reason, "Duration mismatch, trying next candidate");
                    duration_deltas.push(delta);
                    last_reject = Some(SoftReject::DurationMismatch { reason, delta });
                    let _ = tokio::fs::remove_file(&final_path).await;
                }
            }
        }

        // Every candidate failed on duration with consistently large
        // offsets: the item is probably mis-identified.
        if duration_deltas.len() == tried
            && detect_suspect_misid(&duration_deltas, plan.total_seconds, &self.config.duration)
        {
            return Err(StageError::SuspectMisId {
                deltas: duration_deltas,
            });
        }

        Ok(RemoteOutcome::Exhausted(
            last_reject.map(|r| r.reason().to_string()),
        ))
    }

    /// The transcription path. The finished transcript is also stored
    /// in the transcript cache under `queue-<item>/<episode-key>`.
    async fn ai_generate(
        &self,
        item_id: &str,
        target: &SubtitleTarget,
        plan: &TranscriptionPlan,
        cancel: &CancelSignal,
    ) -> Result<GenerationRecord, StageError> {
        transcribe(
            self.runner.as_ref(),
            plan,
            &self.config.transcribe,
            &self.tokens,
            cancel,
        )
        .await?;

        let bytes = tokio::fs::read(&plan.final_srt).await?;
        let segments = srt::parse(&bytes).len();
        if segments == 0 {
            return Err(StageError::Transient(format!(
                "transcription produced no cues at {}",
                plan.final_srt.display()
            )));
        }

        let key = format!("queue-{}/{}", item_id, target.episode_key);
        if let Err(e) = self
            .cache
            .transcripts()
            .store(&key, &plan.language, segments, &bytes)
            .await
        {
            warn!(key = %key, error = %e, "Could not cache generated transcript");
        }

        metrics::SUBTITLES_GENERATED
            .with_label_values(&["whisperx"])
            .inc();
        info!(segments = segments, path = %plan.final_srt.display(), "Transcription finished");

        Ok(GenerationRecord {
            episode_key: target.episode_key.clone(),
            source: "whisperx".to_string(),
            cached: false,
            segments,
            path: plan.final_srt.to_string_lossy().to_string(),
            subtitles_muxed: false,
            error: String::new(),
        })
    }

    /// Search, download, and retime a forced (foreign-parts-only)
    /// track against the finished regular track.
    async fn forced_track(
        &self,
        target: &SubtitleTarget,
        ctx: &IdContext,
        reference_path: &PathBuf,
        cancel: &CancelSignal,
    ) -> Result<Option<PathBuf>, StageError> {
        let candidates =
            search_with_fallback(self.provider.as_ref(), ctx, true, cancel).await?;
        // Forced tracks get the strict comparison: a near-miss title
        // means a different film's foreign parts.
        let strict: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| strict_title_match(&ctx.title, &c.feature_title))
            .collect();
        let ranked = rank_candidates(&strict, ctx);
        let Some(best) = ranked.first() else {
            return Ok(None);
        };

        let payload = self.fetch_payload(&best.candidate, cancel).await?;
        let (cleaned, _) = srt::clean(&payload);
        let forced_cues = srt::parse(&cleaned);
        if forced_cues.is_empty() {
            return Ok(None);
        }

        let reference = srt::parse(&tokio::fs::read(reference_path).await?);
        let Some(retimed) = align_forced(&reference, &forced_cues, &self.config.forced) else {
            return Ok(None);
        };

        let language = ctx.primary_language();
        let path = target
            .output_dir
            .join(format!("{}.{}.forced.srt", target.base_name, language));
        tokio::fs::write(&path, srt::emit(&retimed)).await?;
        info!(path = %path.display(), cues = retimed.len(), "Forced subtitle written");
        Ok(Some(path))
    }

    /// Payload fetch with the content-addressed cache in front of the
    /// provider.
    async fn fetch_payload(
        &self,
        candidate: &Candidate,
        cancel: &CancelSignal,
    ) -> Result<Vec<u8>, StageError> {
        let key = SubtitleCache::file_id_key(candidate.file_id);
        if let Some((bytes, _meta)) = self.cache.payloads().load(&key).await {
            return Ok(bytes);
        }

        let download = match self.provider.download(candidate.file_id, cancel).await {
            Ok(d) => d,
            Err(ProviderError::Cancelled) => return Err(StageError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let segments = srt::parse(&download.bytes).len();
        self.cache
            .payloads()
            .store(&key, &candidate.language, segments, &download.bytes)
            .await?;
        Ok(download.bytes)
    }
}
