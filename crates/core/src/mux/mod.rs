//! Container muxing through an mkvmerge-class tool.
//!
//! Tracks are written to a sibling temp file which replaces the source
//! by rename, so a crash mid-mux never leaves a half-written
//! container. Sidecar files are only removed once the rewritten
//! container verifies.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::ident::{display_name, two_to_three};
use crate::metrics;
use crate::tools::{probe_media, ToolError, ToolRunner, ToolSpec};

/// Errors from muxing.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Source container or a subtitle sidecar is missing.
    #[error("mux input not found: {0}")]
    NotFound(PathBuf),

    /// No subtitle tracks were given.
    #[error("nothing to mux")]
    NoTracks,

    /// The muxer subprocess failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One mux operation.
#[derive(Debug, Clone)]
pub struct MuxRequest {
    /// Container to rewrite in place.
    pub source: PathBuf,
    /// Sidecar SRTs to embed; a path containing `.forced.` becomes a
    /// forced track.
    pub srt_paths: Vec<PathBuf>,
    /// Two-letter language for the embedded tracks.
    pub language: String,
    /// Drop pre-existing subtitle tracks from the source.
    pub strip_existing: bool,
}

/// Embed subtitle tracks into the source container.
///
/// Returns `true` when the rewritten container verifies (expected
/// track count and language tag); sidecars are removed only in that
/// case. Returns `false` when the mux ran but verification did not
/// hold, leaving the sidecars in place.
pub async fn mux_subtitles(
    runner: &dyn ToolRunner,
    request: &MuxRequest,
    cancel: &CancelSignal,
) -> Result<bool, MuxError> {
    if request.srt_paths.is_empty() {
        return Err(MuxError::NoTracks);
    }
    if !request.source.exists() {
        return Err(MuxError::NotFound(request.source.clone()));
    }
    for srt in &request.srt_paths {
        if !srt.exists() {
            return Err(MuxError::NotFound(srt.clone()));
        }
    }

    let tmp = temp_path(&request.source);
    let spec = build_mux_spec(request, &tmp);

    if let Err(e) = runner.run(&spec, cancel).await {
        metrics::MUXES.with_label_values(&["failed"]).inc();
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    tokio::fs::rename(&tmp, &request.source).await?;
    debug!(source = %request.source.display(), tracks = request.srt_paths.len(), "Container rewritten");

    let verified = verify_mux(runner, request, cancel).await;
    if !verified {
        metrics::MUXES.with_label_values(&["failed"]).inc();
        warn!(source = %request.source.display(), "Muxed container failed verification, keeping sidecars");
        return Ok(false);
    }

    for srt in &request.srt_paths {
        if let Err(e) = tokio::fs::remove_file(srt).await {
            warn!(path = %srt.display(), error = %e, "Could not remove sidecar after mux");
        }
    }

    metrics::MUXES.with_label_values(&["success"]).inc();
    info!(source = %request.source.display(), tracks = request.srt_paths.len(), "Subtitles muxed");
    Ok(true)
}

fn temp_path(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "container".to_string());
    source.with_file_name(format!(".mux-{}.tmp", name))
}

fn build_mux_spec(request: &MuxRequest, tmp: &Path) -> ToolSpec {
    let mut args = vec!["-o".to_string(), tmp.to_string_lossy().to_string()];
    if request.strip_existing {
        args.push("-S".to_string());
    }
    args.push(request.source.to_string_lossy().to_string());

    let iso3 = two_to_three(&request.language);
    let display = display_name(&request.language);

    for srt in &request.srt_paths {
        let forced = srt.to_string_lossy().contains(".forced.");
        args.push("--language".to_string());
        args.push(format!("0:{}", iso3));
        args.push("--track-name".to_string());
        if forced {
            args.push(format!("0:{} (Forced)", display));
            args.push("--default-track".to_string());
            args.push("0:no".to_string());
            args.push("--forced-track".to_string());
            args.push("0:yes".to_string());
        } else {
            args.push(format!("0:{}", display));
            args.push("--default-track".to_string());
            args.push("0:yes".to_string());
        }
        args.push(srt.to_string_lossy().to_string());
    }

    ToolSpec::with_args("mkvmerge", args)
}

/// Probe the rewritten container and confirm the embedded tracks are
/// actually there with the expected language tag.
async fn verify_mux(runner: &dyn ToolRunner, request: &MuxRequest, cancel: &CancelSignal) -> bool {
    let info = match probe_media(runner, &request.source, cancel).await {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "Post-mux probe failed");
            return false;
        }
    };

    let subtitles = info.streams_of_type("subtitle");
    if subtitles.len() < request.srt_paths.len() {
        return false;
    }

    let iso3 = two_to_three(&request.language);
    subtitles.iter().any(|s| {
        s.language_tag()
            .map(|t| t.to_lowercase() == iso3)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::never_cancelled;
    use crate::testing::MockRunner;
    use tempfile::TempDir;

    fn probe_json(subtitle_langs: &[&str]) -> String {
        let subs: Vec<String> = subtitle_langs
            .iter()
            .enumerate()
            .map(|(i, lang)| {
                format!(
                    r#"{{"index": {}, "codec_type": "subtitle", "codec_name": "subrip", "tags": {{"language": "{}"}}}}"#,
                    i + 2,
                    lang
                )
            })
            .collect();
        format!(
            r#"{{"streams": [{{"index": 0, "codec_type": "video", "codec_name": "h264"}}, {{"index": 1, "codec_type": "audio", "codec_name": "aac"}}, {}], "format": {{"duration": "100"}}}}"#,
            subs.join(", ")
        )
    }

    fn setup(tmp: &TempDir, srt_names: &[&str]) -> MuxRequest {
        let source = tmp.path().join("movie.mkv");
        std::fs::write(&source, b"original container").unwrap();
        let srt_paths: Vec<PathBuf> = srt_names
            .iter()
            .map(|n| {
                let p = tmp.path().join(n);
                std::fs::write(&p, b"1\n00:00:01,000 --> 00:00:02,000\nhi\n\n").unwrap();
                p
            })
            .collect();
        MuxRequest {
            source,
            srt_paths,
            language: "en".to_string(),
            strip_existing: false,
        }
    }

    fn muxing_runner(probe: String) -> MockRunner {
        let runner = MockRunner::new();
        runner.on("mkvmerge", |spec| {
            // -o <tmp> is the output contract.
            let tmp = spec.args[1].clone();
            std::fs::write(tmp, b"muxed container").unwrap();
            Ok(Default::default())
        });
        runner.on("ffprobe", move |_| {
            Ok(crate::tools::ToolOutput {
                stdout: probe.clone(),
                stderr: String::new(),
            })
        });
        runner
    }

    #[tokio::test]
    async fn test_mux_success_removes_sidecars() {
        let tmp = TempDir::new().unwrap();
        let request = setup(&tmp, &["movie.en.srt"]);
        let runner = muxing_runner(probe_json(&["eng"]));

        let muxed = mux_subtitles(&runner, &request, &never_cancelled()).await.unwrap();
        assert!(muxed);
        assert!(!request.srt_paths[0].exists());
        assert_eq!(
            std::fs::read(&request.source).unwrap(),
            b"muxed container"
        );
        // Temp file renamed away.
        assert!(!temp_path(&request.source).exists());
    }

    #[tokio::test]
    async fn test_mux_command_shape() {
        let tmp = TempDir::new().unwrap();
        let mut request = setup(&tmp, &["movie.en.srt", "movie.en.forced.srt"]);
        request.strip_existing = true;
        let runner = muxing_runner(probe_json(&["eng", "eng"]));

        mux_subtitles(&runner, &request, &never_cancelled()).await.unwrap();

        let spec = runner.last_run_of("mkvmerge").unwrap();
        let args = spec.args.join(" ");
        assert!(args.contains("-S"));
        assert!(args.contains("--language 0:eng"));
        assert!(args.contains("--track-name 0:English --default-track 0:yes"));
        assert!(args.contains("--track-name 0:English (Forced) --default-track 0:no --forced-track 0:yes"));
        assert!(spec.args[1].contains(".mux-movie.mkv.tmp"));
    }

    #[tokio::test]
    async fn test_mux_failure_preserves_everything() {
        let tmp = TempDir::new().unwrap();
        let request = setup(&tmp, &["movie.en.srt"]);

        let runner = MockRunner::new();
        runner.fail("mkvmerge");

        let err = mux_subtitles(&runner, &request, &never_cancelled()).await.unwrap_err();
        assert!(matches!(err, MuxError::Tool(_)));
        // Source untouched, sidecar kept, temp gone.
        assert_eq!(
            std::fs::read(&request.source).unwrap(),
            b"original container"
        );
        assert!(request.srt_paths[0].exists());
        assert!(!temp_path(&request.source).exists());
    }

    #[tokio::test]
    async fn test_mux_verification_mismatch_keeps_sidecars() {
        let tmp = TempDir::new().unwrap();
        let request = setup(&tmp, &["movie.en.srt"]);
        // Probe reports no subtitle streams at all.
        let runner = muxing_runner(
            r#"{"streams": [{"index": 0, "codec_type": "video", "codec_name": "h264"}], "format": {"duration": "100"}}"#.to_string(),
        );

        let muxed = mux_subtitles(&runner, &request, &never_cancelled()).await.unwrap();
        assert!(!muxed);
        assert!(request.srt_paths[0].exists());
    }

    #[tokio::test]
    async fn test_mux_missing_inputs() {
        let tmp = TempDir::new().unwrap();
        let runner = MockRunner::new();

        let request = MuxRequest {
            source: tmp.path().join("absent.mkv"),
            srt_paths: vec![tmp.path().join("absent.srt")],
            language: "en".to_string(),
            strip_existing: false,
        };
        assert!(matches!(
            mux_subtitles(&runner, &request, &never_cancelled()).await,
            Err(MuxError::NotFound(_))
        ));

        let request = MuxRequest {
            source: tmp.path().join("absent.mkv"),
            srt_paths: vec![],
            language: "en".to_string(),
            strip_existing: false,
        };
        assert!(matches!(
            mux_subtitles(&runner, &request, &never_cancelled()).await,
            Err(MuxError::NoTracks)
        ));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/media/movie.mkv")),
            PathBuf::from("/media/.mux-movie.mkv.tmp")
        );
    }
}
