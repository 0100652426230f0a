//! Per-target transcription planning.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::ident::normalize_language;
use crate::tools::{pick_audio_stream, probe_media, MediaInfo, ToolRunner};

use super::driver::TranscribeError;

/// Scratch subdirectory created under the work directory.
pub const SCRATCH_DIR_NAME: &str = "whisperx";

/// Keep scratch artifacts for debugging when set to anything
/// non-empty.
const KEEP_ENV: &str = "SPD_DEBUG_SUBTITLES_KEEP";

/// Runtime scratch for one subtitle target: resolved paths, the
/// selected audio stream, and the probed duration.
#[derive(Debug, Clone)]
pub struct TranscriptionPlan {
    /// Source container.
    pub video_path: PathBuf,
    /// Scratch directory (`<work_dir>/whisperx`), removed on cleanup.
    pub scratch_dir: PathBuf,
    /// Extracted mono PCM audio.
    pub audio_path: PathBuf,
    /// Raw engine SRT output.
    pub raw_srt: PathBuf,
    /// Raw engine JSON output (input to the sentence shaper).
    pub raw_json: PathBuf,
    /// Final sidecar path: `<output_dir>/<base>.<lang>.srt`.
    pub final_srt: PathBuf,
    /// Base name used for all derived files.
    pub base_name: String,
    /// Two-letter language of the selected audio stream.
    pub language: String,
    /// Index of the selected audio stream within the container.
    pub audio_index: usize,
    /// Probed total duration in seconds.
    pub total_seconds: f64,
    /// Run the engine on CUDA.
    pub cuda: bool,
    pub(crate) keep_scratch: bool,
}

impl TranscriptionPlan {
    /// Prepare a plan: validate the source, probe it, pick the audio
    /// stream, and lay out the scratch and output paths.
    pub async fn prepare(
        runner: &dyn ToolRunner,
        video_path: &Path,
        work_dir: &Path,
        output_dir: &Path,
        base_name: Option<&str>,
        cuda: bool,
        cancel: &CancelSignal,
    ) -> Result<Self, TranscribeError> {
        if video_path.as_os_str().is_empty() {
            return Err(TranscribeError::Validation(
                "empty source video path".to_string(),
            ));
        }
        if !video_path.exists() {
            return Err(TranscribeError::NotFound(video_path.to_path_buf()));
        }

        tokio::fs::create_dir_all(work_dir).await?;
        tokio::fs::create_dir_all(output_dir).await?;

        let info = probe_media(runner, video_path, cancel).await?;
        let plan = Self::from_probe(&info, video_path, work_dir, output_dir, base_name, cuda)?;
        tokio::fs::create_dir_all(&plan.scratch_dir).await?;

        debug!(
            video = %video_path.display(),
            audio_index = plan.audio_index,
            language = %plan.language,
            duration = plan.total_seconds,
            "Transcription plan prepared"
        );
        Ok(plan)
    }

    fn from_probe(
        info: &MediaInfo,
        video_path: &Path,
        work_dir: &Path,
        output_dir: &Path,
        base_name: Option<&str>,
        cuda: bool,
    ) -> Result<Self, TranscribeError> {
        let stream = pick_audio_stream(info).ok_or_else(|| {
            TranscribeError::Validation(format!(
                "no audio stream in {}",
                video_path.display()
            ))
        })?;

        let language = stream
            .language_tag()
            .map(|t| normalize_language(&t))
            .unwrap_or_else(|| "en".to_string());

        let base = match base_name.filter(|b| !b.is_empty()) {
            Some(b) => b.to_string(),
            None => video_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string()),
        };

        let scratch_dir = work_dir.join(SCRATCH_DIR_NAME);
        let keep_scratch = std::env::var(KEEP_ENV).map(|v| !v.is_empty()).unwrap_or(false);

        Ok(Self {
            video_path: video_path.to_path_buf(),
            audio_path: scratch_dir.join("primary_audio.wav"),
            raw_srt: scratch_dir.join(format!("{}.srt", base)),
            raw_json: scratch_dir.join(format!("{}.json", base)),
            final_srt: output_dir.join(format!("{}.{}.srt", base, language)),
            scratch_dir,
            base_name: base,
            language,
            audio_index: stream.index,
            total_seconds: info.duration_seconds,
            cuda,
            keep_scratch,
        })
    }

    /// Remove the scratch directory unless debug retention is on.
    pub async fn cleanup(&self) {
        if self.keep_scratch {
            debug!(dir = %self.scratch_dir.display(), "Keeping scratch directory ({} set)", KEEP_ENV);
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.scratch_dir.display(), error = %e, "Could not remove scratch directory");
            }
        }
    }
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
        "format": {"duration": "5400.0"}
    }"#;

    fn probing_runner() -> MockRunner {
        let runner = MockRunner::new();
        runner.on("ffprobe", |_| {
            Ok(crate::tools::ToolOutput {
                stdout: PROBE_JSON.to_string(),
                stderr: String::new(),
            })
        });
        runner
    }

    #[tokio::test]
    async fn test_prepare_lays_out_paths() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("Movie.2024.mkv");
        std::fs::write(&video, b"fake").unwrap();
        let work = tmp.path().join("work");
        let out = tmp.path().join("out");

        let runner = probing_runner();
        let plan = TranscriptionPlan::prepare(
            &runner,
            &video,
            &work,
            &out,
            None,
            false,
            &never_cancelled(),
        )
        .await
        .unwrap();

        assert_eq!(plan.base_name, "Movie.2024");
        assert_eq!(plan.language, "en");
        assert_eq!(plan.audio_index, 1);
        assert!((plan.total_seconds - 5400.0).abs() < 1e-9);
        assert_eq!(plan.scratch_dir, work.join("whisperx"));
        assert_eq!(plan.audio_path, work.join("whisperx/primary_audio.wav"));
        assert_eq!(plan.final_srt, out.join("Movie.2024.en.srt"));
        assert!(plan.scratch_dir.is_dir());
        assert!(out.is_dir());
    }

    #[tokio::test]
    async fn test_prepare_honors_base_name_request() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("raw-encode.mkv");
        std::fs::write(&video, b"fake").unwrap();

        let runner = probing_runner();
        let plan = TranscriptionPlan::prepare(
            &runner,
            &video,
            &tmp.path().join("work"),
            &tmp.path().join("out"),
            Some("Show - s01e01"),
            true,
            &never_cancelled(),
        )
        .await
        .unwrap();

        assert_eq!(plan.base_name, "Show - s01e01");
        assert!(plan.cuda);
        assert!(plan
            .final_srt
            .to_string_lossy()
            .ends_with("Show - s01e01.en.srt"));
    }

    #[tokio::test]
    async fn test_prepare_missing_source() {
        let tmp = TempDir::new().unwrap();
        let runner = probing_runner();
        let err = TranscriptionPlan::prepare(
            &runner,
            &tmp.path().join("missing.mkv"),
            &tmp.path().join("work"),
            &tmp.path().join("out"),
            None,
            false,
            &never_cancelled(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranscribeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_prepare_no_audio_stream() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("video-only.mkv");
        std::fs::write(&video, b"fake").unwrap();

        let runner = MockRunner::new();
        runner.on("ffprobe", |_| {
            Ok(crate::tools::ToolOutput {
                stdout: r#"{"streams": [{"index": 0, "codec_type": "video", "codec_name": "h264"}], "format": {"duration": "10"}}"#.to_string(),
                stderr: String::new(),
            })
        });

        let err = TranscriptionPlan::prepare(
            &runner,
            &video,
            &tmp.path().join("work"),
            &tmp.path().join("out"),
            None,
            false,
            &never_cancelled(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranscribeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cleanup_removes_scratch() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("a.mkv");
        std::fs::write(&video, b"fake").unwrap();

        let runner = probing_runner();
        let plan = TranscriptionPlan::prepare(
            &runner,
            &video,
            &tmp.path().join("work"),
            &tmp.path().join("out"),
            None,
            false,
            &never_cancelled(),
        )
        .await
        .unwrap();

        std::fs::write(plan.scratch_dir.join("junk.wav"), b"x").unwrap();
        plan.cleanup().await;
        assert!(!plan.scratch_dir.exists());
    }
}
