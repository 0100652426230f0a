//! Commentary-snippet transcription.
//!
//! Alternate audio tracks are often director commentaries rather than
//! dubs. Transcribing a short snippet of the track and inspecting the
//! text is how upstream tells them apart. Snippets are cached in the
//! transcript store keyed on the source file's identity, so repeated
//! identification runs never re-extract.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::cache::{snippet_transcript_key, SubtitleCache};
use crate::cancel::CancelSignal;
use crate::config::TranscribeConfig;
use crate::srt;
use crate::tools::{ToolRunner, ToolSpec};

use super::driver::{whisperx_spec, TranscribeError};
use super::token::TokenValidator;

/// Keep snippet artifacts for debugging when set to anything
/// non-empty.
const KEEP_ENV: &str = "SPD_DEBUG_COMMENTARY_KEEP";

/// One snippet transcription.
#[derive(Debug, Clone)]
pub struct SnippetRequest {
    /// Source container.
    pub video_path: PathBuf,
    /// Scratch root; a `snippet-<track>` subdirectory is created.
    pub work_dir: PathBuf,
    /// Audio stream index to sample.
    pub audio_index: usize,
    /// Snippet start within the track, in milliseconds.
    pub start_ms: u64,
    /// Snippet length, in milliseconds.
    pub duration_ms: u64,
    /// Two-letter language hint for the engine.
    pub language: String,
    /// Run the engine on CUDA.
    pub cuda: bool,
}

/// Transcribe a snippet of an audio track and return its plain text.
///
/// The result is cached under a key derived from the file identity
/// (path, size, mtime) and the snippet coordinates; a second call for
/// the same snippet never touches the tools.
pub async fn transcribe_snippet(
    runner: &dyn ToolRunner,
    cache: &SubtitleCache,
    request: &SnippetRequest,
    config: &TranscribeConfig,
    validator: &TokenValidator,
    cancel: &CancelSignal,
) -> Result<String, TranscribeError> {
    if !request.video_path.exists() {
        return Err(TranscribeError::NotFound(request.video_path.clone()));
    }

    let metadata = tokio::fs::metadata(&request.video_path).await?;
    let mtime_secs = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let key = snippet_transcript_key(
        &request.video_path,
        metadata.len(),
        mtime_secs,
        request.audio_index,
        request.start_ms,
        request.duration_ms,
        &request.language,
    );

    if let Some((bytes, meta)) = cache.transcripts().load(&key).await {
        debug!(key = %key, segments = meta.segments, "Snippet transcript served from cache");
        return Ok(srt::plain_text(&bytes));
    }

    let scratch = request
        .work_dir
        .join(format!("snippet-{}", request.audio_index));
    tokio::fs::create_dir_all(&scratch).await?;

    let result = run_snippet(runner, request, config, validator, &scratch, cancel).await;

    let keep = std::env::var(KEEP_ENV).map(|v| !v.is_empty()).unwrap_or(false);
    if keep {
        debug!(dir = %scratch.display(), "Keeping snippet artifacts ({} set)", KEEP_ENV);
    } else if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %scratch.display(), error = %e, "Could not remove snippet scratch");
        }
    }

    let bytes = result?;
    let segments = srt::parse(&bytes).len();
    if let Err(e) = cache
        .transcripts()
        .store(&key, &request.language, segments, &bytes)
        .await
    {
        warn!(key = %key, error = %e, "Could not cache snippet transcript");
    }

    Ok(srt::plain_text(&bytes))
}

async fn run_snippet(
    runner: &dyn ToolRunner,
    request: &SnippetRequest,
    config: &TranscribeConfig,
    validator: &TokenValidator,
    scratch: &std::path::Path,
    cancel: &CancelSignal,
) -> Result<Vec<u8>, TranscribeError> {
    let audio_path = scratch.join("snippet.wav");
    let extract = ToolSpec::with_args(
        "ffmpeg",
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", request.start_ms as f64 / 1000.0),
            "-t".to_string(),
            format!("{:.3}", request.duration_ms as f64 / 1000.0),
            "-i".to_string(),
            request.video_path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", request.audio_index),
            "-vn".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            "16000".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            audio_path.to_string_lossy().to_string(),
        ],
    );
    runner.run(&extract, cancel).await?;

    let vad = validator.effective_vad_method(config, cancel).await?;
    let spec = whisperx_spec(
        &audio_path,
        scratch,
        &request.language,
        request.cuda,
        config,
        vad,
    );
    runner.run(&spec, cancel).await?;

    let engine_srt = scratch.join("snippet.srt");
    let bytes = tokio::fs::read(&engine_srt)
        .await
        .map_err(|_| TranscribeError::EmptyOutput(engine_srt.clone()))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(TranscribeError::EmptyOutput(engine_srt));
    }
    Ok(bytes)
}
