//! Alignment engine driver.
//!
//! Takes a cleaned subtitle and the extracted audio, runs the optional
//! audio-sync pre-pass, then the neural aligner, and finally checks
//! the result against the quality guard. A guard rejection is a
//! distinct error so the caller can soft-reject the candidate instead
//! of failing the episode.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::metrics;
use crate::srt::{self, SrtError};
use crate::tools::{ToolError, ToolRunner, ToolSpec};

use super::quality::{evaluate_alignment, AlignmentGuardConfig, AlignmentReport, AlignmentVerdict};

// Runs inside `uvx --from whisperx python -c`. Arguments: audio,
// input SRT, output SRT, language, device.
const ALIGNER_SCRIPT: &str = r#"
import sys
import whisperx
from whisperx.SubtitlesProcessor import SubtitlesProcessor

audio_path, srt_in, srt_out, language, device = sys.argv[1:6]
audio = whisperx.load_audio(audio_path)
model, metadata = whisperx.load_align_model(language_code=language, device=device)
segments = whisperx.utils.read_srt_as_segments(srt_in)
aligned = whisperx.align(segments, model, metadata, audio, device)
whisperx.utils.write_segments_as_srt(aligned["segments"], srt_out)
"#;

/// Errors from alignment.
#[derive(Debug, Error)]
pub enum AlignError {
    /// The aligner subprocess failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The aligner ran but the quality guard rejected the result.
    #[error("alignment rejected: {reason}")]
    QualityRejected { reason: String },

    /// The aligned output was unreadable.
    #[error(transparent)]
    Srt(#[from] SrtError),

    #[error("aligner wrote no output at {0}")]
    MissingOutput(PathBuf),
}

/// One alignment invocation.
#[derive(Debug, Clone)]
pub struct AlignRequest {
    /// Extracted mono PCM audio.
    pub audio_path: PathBuf,
    /// Cleaned input subtitle.
    pub input_srt: PathBuf,
    /// Where the aligned subtitle goes.
    pub output_srt: PathBuf,
    /// Two-letter language code.
    pub language: String,
    /// Use CUDA for the aligner.
    pub cuda: bool,
    /// Run the audio-sync pre-pass first.
    pub sync_prepass: bool,
}

/// Align a subtitle to the audio track and gate the result.
///
/// Returns the guard report on success. On a guard rejection the
/// output file is removed and `AlignError::QualityRejected` is
/// returned.
pub async fn align_subtitle(
    runner: &dyn ToolRunner,
    request: &AlignRequest,
    guard: &AlignmentGuardConfig,
    cancel: &CancelSignal,
) -> Result<AlignmentReport, AlignError> {
    let before = srt::parse(&std::fs::read(&request.input_srt).map_err(SrtError::Io)?);

    // Optional coarse pre-pass. Its failure is tolerated; the aligner
    // sees the uncorrected input instead.
    let aligner_input = if request.sync_prepass {
        match run_sync_prepass(runner, request, cancel).await {
            Ok(path) => path,
            Err(ToolError::Cancelled { tool }) => return Err(ToolError::Cancelled { tool }.into()),
            Err(e) => {
                warn!(error = %e, "Audio-sync pre-pass failed, aligning the uncorrected input");
                request.input_srt.clone()
            }
        }
    } else {
        request.input_srt.clone()
    };

    let device = if request.cuda { "cuda" } else { "cpu" };
    let spec = ToolSpec::with_args(
        "uvx",
        vec![
            "--from".to_string(),
            "whisperx".to_string(),
            "python".to_string(),
            "-c".to_string(),
            ALIGNER_SCRIPT.to_string(),
            request.audio_path.to_string_lossy().to_string(),
            aligner_input.to_string_lossy().to_string(),
            request.output_srt.to_string_lossy().to_string(),
            request.language.clone(),
            device.to_string(),
        ],
    );
    runner.run(&spec, cancel).await?;

    if !request.output_srt.exists() {
        return Err(AlignError::MissingOutput(request.output_srt.clone()));
    }

    let after = srt::parse(&std::fs::read(&request.output_srt).map_err(SrtError::Io)?);
    let report = evaluate_alignment(&before, &after, guard);
    debug!(
        cues = report.cue_count,
        median = report.shift_median,
        stddev = report.shift_stddev,
        "Alignment evaluated"
    );

    if let AlignmentVerdict::Rejected(ref reason) = report.verdict {
        metrics::ALIGNMENTS_REJECTED.inc();
        let _ = std::fs::remove_file(&request.output_srt);
        return Err(AlignError::QualityRejected {
            reason: reason.clone(),
        });
    }

    Ok(report)
}

async fn run_sync_prepass(
    runner: &dyn ToolRunner,
    request: &AlignRequest,
    cancel: &CancelSignal,
) -> Result<PathBuf, ToolError> {
    let presync = presync_path(&request.input_srt);
    let spec = ToolSpec::with_args(
        "ffsubsync",
        vec![
            request.audio_path.to_string_lossy().to_string(),
            "-i".to_string(),
            request.input_srt.to_string_lossy().to_string(),
            "-o".to_string(),
            presync.to_string_lossy().to_string(),
        ],
    );
    runner.run(&spec, cancel).await?;
    Ok(presync)
}

fn presync_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    input.with_file_name(format!("{}.presync.srt", stem))
}
