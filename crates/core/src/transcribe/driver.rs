//! Transcription engine driver.
//!
//! Extracts mono PCM audio, runs whisperx with a fixed parameter set,
//! then reshapes the output into sentence-level cues. If the shaper
//! fails the raw transcription ships instead; the pipeline never
//! leaves a target empty-handed once the engine has produced cues.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::{TranscribeConfig, VadMethod};
use crate::metrics;
use crate::tools::{ToolError, ToolRunner, ToolSpec};

use super::plan::TranscriptionPlan;
use super::token::{TokenError, TokenValidator};

const WHISPER_MODEL: &str = "large-v3";
const ALIGN_MODEL: &str = "WAV2VEC2_ASR_LARGE_LV60K_960H";

// Runs inside `uvx --from stable-ts-whisperless python -c`.
// Arguments: raw whisperx JSON, output SRT, optional --language.
const SHAPER_SCRIPT: &str = r#"
import sys
import stable_whisper

json_path, out_path = sys.argv[1], sys.argv[2]
language = None
if "--language" in sys.argv:
    language = sys.argv[sys.argv.index("--language") + 1]

result = stable_whisper.WhisperResult(json_path)
result.split_by_punctuation([(".", " "), "。", "?", "？", "!", "！"])
result.merge_by_gap(0.3, max_words=None)
result.to_srt_vtt(out_path, word_level=False)
"#;

/// Errors from transcription.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// Bad inputs (empty path, no audio stream).
    #[error("invalid transcription input: {0}")]
    Validation(String),

    /// Source file missing on disk.
    #[error("source file not found: {0}")]
    NotFound(PathBuf),

    /// A subprocess failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Token validation failed transiently.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The engine exited cleanly but produced nothing usable.
    #[error("transcription produced no usable output at {0}")]
    EmptyOutput(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract the selected audio stream as mono 16 kHz PCM.
pub async fn extract_audio(
    runner: &dyn ToolRunner,
    plan: &TranscriptionPlan,
    cancel: &CancelSignal,
) -> Result<(), TranscribeError> {
    let spec = ToolSpec::with_args(
        "ffmpeg",
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            plan.video_path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", plan.audio_index),
            "-vn".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            "16000".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            plan.audio_path.to_string_lossy().to_string(),
        ],
    );
    runner.run(&spec, cancel).await?;
    debug!(audio = %plan.audio_path.display(), "Audio extracted");
    Ok(())
}

/// Run the full transcription path: extract, transcribe, shape.
///
/// On success `plan.final_srt` holds the sentence-shaped subtitle, or
/// the raw engine output when shaping failed.
pub async fn transcribe(
    runner: &dyn ToolRunner,
    plan: &TranscriptionPlan,
    config: &TranscribeConfig,
    validator: &TokenValidator,
    cancel: &CancelSignal,
) -> Result<(), TranscribeError> {
    extract_audio(runner, plan, cancel).await?;

    let vad = validator.effective_vad_method(config, cancel).await?;
    let spec = whisperx_spec(
        &plan.audio_path,
        &plan.scratch_dir,
        &plan.language,
        plan.cuda,
        config,
        vad,
    );

    if let Err(e) = runner.run(&spec, cancel).await {
        metrics::TRANSCRIPTIONS.with_label_values(&["failed"]).inc();
        return Err(e.into());
    }

    // The engine names its outputs after the audio file; move them to
    // the base-derived paths.
    for (engine_name, target) in [
        ("primary_audio.srt", &plan.raw_srt),
        ("primary_audio.json", &plan.raw_json),
    ] {
        let engine_path = plan.scratch_dir.join(engine_name);
        if engine_path != **target && engine_path.exists() {
            tokio::fs::rename(&engine_path, target).await?;
        }
    }

    let raw = tokio::fs::read(&plan.raw_srt)
        .await
        .map_err(|_| TranscribeError::EmptyOutput(plan.raw_srt.clone()))?;
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        metrics::TRANSCRIPTIONS.with_label_values(&["failed"]).inc();
        return Err(TranscribeError::EmptyOutput(plan.raw_srt.clone()));
    }

    shape_sentences(runner, plan, cancel).await?;
    metrics::TRANSCRIPTIONS.with_label_values(&["success"]).inc();
    Ok(())
}

pub(crate) fn whisperx_spec(
    audio_path: &std::path::Path,
    scratch_dir: &std::path::Path,
    language: &str,
    cuda: bool,
    config: &TranscribeConfig,
    vad: VadMethod,
) -> ToolSpec {
    let mut args = vec![
        "--from".to_string(),
        "whisperx".to_string(),
        "python".to_string(),
        "-m".to_string(),
        "whisperx".to_string(),
        audio_path.to_string_lossy().to_string(),
        "--model".to_string(),
        WHISPER_MODEL.to_string(),
        "--align_model".to_string(),
        ALIGN_MODEL.to_string(),
        "--batch_size".to_string(),
        "4".to_string(),
        "--chunk_size".to_string(),
        "15".to_string(),
        "--vad_onset".to_string(),
        "0.08".to_string(),
        "--vad_offset".to_string(),
        "0.07".to_string(),
        "--beam_size".to_string(),
        "10".to_string(),
        "--best_of".to_string(),
        "10".to_string(),
        "--temperature".to_string(),
        "0.0".to_string(),
        "--patience".to_string(),
        "1.0".to_string(),
        "--segment_resolution".to_string(),
        "sentence".to_string(),
        "--output_format".to_string(),
        "all".to_string(),
        "--output_dir".to_string(),
        scratch_dir.to_string_lossy().to_string(),
        "--language".to_string(),
        language.to_string(),
        "--vad_method".to_string(),
        vad.as_str().to_string(),
    ];

    if cuda {
        args.extend(["--device".to_string(), "cuda".to_string()]);
    } else {
        args.extend([
            "--device".to_string(),
            "cpu".to_string(),
            "--compute_type".to_string(),
            "float32".to_string(),
        ]);
    }

    if vad == VadMethod::Pyannote {
        args.extend(["--hf_token".to_string(), config.hf_token.clone()]);
    }

    ToolSpec::with_args("uvx", args)
}

/// Run the sentence shaper; fall back to the raw SRT on failure.
async fn shape_sentences(
    runner: &dyn ToolRunner,
    plan: &TranscriptionPlan,
    cancel: &CancelSignal,
) -> Result<(), TranscribeError> {
    let shaped_tmp = plan.final_srt.with_extension("srt.tmp");
    let spec = ToolSpec::with_args(
        "uvx",
        vec![
            "--from".to_string(),
            "stable-ts-whisperless".to_string(),
            "python".to_string(),
            "-c".to_string(),
            SHAPER_SCRIPT.to_string(),
            plan.raw_json.to_string_lossy().to_string(),
            shaped_tmp.to_string_lossy().to_string(),
            "--language".to_string(),
            plan.language.clone(),
        ],
    );

    let shaped = match runner.run(&spec, cancel).await {
        Ok(_) if shaped_tmp.exists() => {
            tokio::fs::rename(&shaped_tmp, &plan.final_srt).await?;
            true
        }
        Ok(_) => false,
        Err(ToolError::Cancelled { tool }) => return Err(ToolError::Cancelled { tool }.into()),
        Err(e) => {
            warn!(error = %e, "Sentence shaping failed, shipping the raw transcription");
            false
        }
    };

    if !shaped {
        let _ = tokio::fs::remove_file(&shaped_tmp).await;
        tokio::fs::copy(&plan.raw_srt, &plan.final_srt).await?;
    }

    debug!(final_srt = %plan.final_srt.display(), shaped = shaped, "Transcription finalized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::never_cancelled;
    use crate::testing::MockRunner;
    use tempfile::TempDir;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "disposition": {"default": 1}, "tags": {"language": "eng"}}
        ],
        "format": {"duration": "600.0"}
    }"#;

    const RAW_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nraw line one\n\n2\n00:00:03,000 --> 00:00:04,000\nraw line two\n\n";
    const SHAPED_SRT: &str = "1\n00:00:01,000 --> 00:00:04,000\nShaped sentence.\n\n";

    async fn plan_for(tmp: &TempDir, runner: &MockRunner) -> TranscriptionPlan {
        let video = tmp.path().join("movie.mkv");
        std::fs::write(&video, b"fake").unwrap();
        TranscriptionPlan::prepare(
            runner,
            &video,
            &tmp.path().join("work"),
            &tmp.path().join("out"),
            None,
            false,
            &never_cancelled(),
        )
        .await
        .unwrap()
    }

    fn base_runner() -> MockRunner {
        let runner = MockRunner::new();
        runner.on("ffprobe", |_| {
            Ok(crate::tools::ToolOutput {
                stdout: PROBE_JSON.to_string(),
                stderr: String::new(),
            })
        });
        runner.on("ffmpeg", |spec| {
            // The extraction contract: last argument is the wav path.
            let dst = spec.args.last().unwrap().clone();
            std::fs::write(dst, b"pcm").unwrap();
            Ok(Default::default())
        });
        runner
    }

    fn is_whisperx(spec: &ToolSpec) -> bool {
        spec.args.iter().any(|a| a == "-m")
    }

    #[tokio::test]
    async fn test_extract_audio_command_shape() {
        let tmp = TempDir::new().unwrap();
        let runner = base_runner();
        let plan = plan_for(&tmp, &runner).await;

        extract_audio(&runner, &plan, &never_cancelled()).await.unwrap();

        let spec = runner.last_run_of("ffmpeg").unwrap();
        let args = spec.args.join(" ");
        assert!(args.contains("-map 0:1"));
        assert!(args.contains("-ac 1"));
        assert!(args.contains("-ar 16000"));
        assert!(args.contains("-c:a pcm_s16le"));
        assert!(plan.audio_path.exists());
    }

    #[tokio::test]
    async fn test_transcribe_with_shaper() {
        let tmp = TempDir::new().unwrap();
        let runner = base_runner();
        let plan = plan_for(&tmp, &runner).await;

        let raw_srt = plan.raw_srt.clone();
        let raw_json = plan.raw_json.clone();
        runner.on("uvx", move |spec| {
            if is_whisperx(spec) {
                std::fs::write(&raw_srt, RAW_SRT).unwrap();
                std::fs::write(&raw_json, b"{}").unwrap();
            } else {
                // Shaper: second positional arg after the script.
                let out = spec.args.iter().rev().nth(2).unwrap();
                std::fs::write(out, SHAPED_SRT).unwrap();
            }
            Ok(Default::default())
        });

        transcribe(
            &runner,
            &plan,
            &TranscribeConfig::default(),
            &TokenValidator::new(),
            &never_cancelled(),
        )
        .await
        .unwrap();

        let final_content = std::fs::read_to_string(&plan.final_srt).unwrap();
        assert_eq!(final_content, SHAPED_SRT);
    }

    #[tokio::test]
    async fn test_shaper_failure_ships_raw_srt() {
        let tmp = TempDir::new().unwrap();
        let runner = base_runner();
        let plan = plan_for(&tmp, &runner).await;

        let raw_srt = plan.raw_srt.clone();
        let raw_json = plan.raw_json.clone();
        runner.on("uvx", move |spec| {
            if is_whisperx(spec) {
                std::fs::write(&raw_srt, RAW_SRT).unwrap();
                std::fs::write(&raw_json, b"{}").unwrap();
                Ok(Default::default())
            } else {
                Err(ToolError::Failed {
                    tool: "uvx".to_string(),
                    log_path: PathBuf::from("/tmp/shaper.log"),
                })
            }
        });

        transcribe(
            &runner,
            &plan,
            &TranscribeConfig::default(),
            &TokenValidator::new(),
            &never_cancelled(),
        )
        .await
        .unwrap();

        // Byte-identical to the raw transcription.
        let final_content = std::fs::read_to_string(&plan.final_srt).unwrap();
        assert_eq!(final_content, RAW_SRT);
    }

    #[tokio::test]
    async fn test_empty_engine_output_is_error() {
        let tmp = TempDir::new().unwrap();
        let runner = base_runner();
        let plan = plan_for(&tmp, &runner).await;

        let raw_srt = plan.raw_srt.clone();
        runner.on("uvx", move |_| {
            std::fs::write(&raw_srt, b"").unwrap();
            Ok(Default::default())
        });

        let err = transcribe(
            &runner,
            &plan,
            &TranscribeConfig::default(),
            &TokenValidator::new(),
            &never_cancelled(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranscribeError::EmptyOutput(_)));
    }

    #[test]
    fn test_whisperx_flags() {
        let audio = PathBuf::from("/w/whisperx/primary_audio.wav");
        let scratch = PathBuf::from("/w/whisperx");

        let spec = whisperx_spec(
            &audio,
            &scratch,
            "en",
            false,
            &TranscribeConfig::default(),
            VadMethod::Silero,
        );
        let args = spec.args.join(" ");
        assert!(args.contains("--model large-v3"));
        assert!(args.contains("--batch_size 4"));
        assert!(args.contains("--chunk_size 15"));
        assert!(args.contains("--vad_onset 0.08"));
        assert!(args.contains("--vad_offset 0.07"));
        assert!(args.contains("--beam_size 10"));
        assert!(args.contains("--temperature 0.0"));
        assert!(args.contains("--segment_resolution sentence"));
        assert!(args.contains("--output_format all"));
        assert!(args.contains("--output_dir /w/whisperx"));
        assert!(args.contains("--device cpu --compute_type float32"));
        assert!(args.contains("--vad_method silero"));
        assert!(!args.contains("--hf_token"));

        let config = TranscribeConfig {
            hf_token: "hf_x".to_string(),
            ..Default::default()
        };
        let spec = whisperx_spec(&audio, &scratch, "en", true, &config, VadMethod::Pyannote);
        let args = spec.args.join(" ");
        assert!(args.contains("--device cuda"));
        assert!(!args.contains("float32"));
        assert!(args.contains("--vad_method pyannote"));
        assert!(args.contains("--hf_token hf_x"));
    }
}
