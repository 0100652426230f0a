//! Media probing through ffprobe.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::cancel::CancelSignal;

use super::runner::{ToolError, ToolRunner, ToolSpec};

/// One stream of a probed container.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream index within the container.
    pub index: usize,
    /// `audio`, `video`, `subtitle`, ...
    pub codec_type: String,
    /// Codec name as reported.
    pub codec_name: String,
    /// Default-track disposition flag.
    pub default: bool,
    /// Raw stream tags.
    pub tags: HashMap<String, String>,
}

impl StreamInfo {
    /// Language tag of the stream, searched across the tag spellings
    /// seen in the wild, NUL bytes stripped. `None` when untagged.
    pub fn language_tag(&self) -> Option<String> {
        for key in ["language", "LANGUAGE", "lang", "LANG"] {
            if let Some(value) = self.tags.get(key) {
                let cleaned: String = value.chars().filter(|c| *c != '\0').collect();
                let trimmed = cleaned.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }
}

/// Probed container facts the stage cares about.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Total duration in seconds.
    pub duration_seconds: f64,
    /// All streams, container order.
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Streams of the given codec type.
    pub fn streams_of_type(&self, codec_type: &str) -> Vec<&StreamInfo> {
        self.streams
            .iter()
            .filter(|s| s.codec_type == codec_type)
            .collect()
    }

    /// Number of subtitle streams.
    pub fn subtitle_count(&self) -> usize {
        self.streams_of_type("subtitle").len()
    }
}

// ffprobe JSON shapes. Everything optional; real files are messy.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(
    runner: &dyn ToolRunner,
    path: &Path,
    cancel: &CancelSignal,
) -> Result<MediaInfo, ToolError> {
    let spec = ToolSpec::with_args(
        "ffprobe",
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ],
    );

    let output = runner.run(&spec, cancel).await?;
    parse_ffprobe_output(&output.stdout).map_err(|e| {
        ToolError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unparseable ffprobe output: {}", e),
        ))
    })
}

fn parse_ffprobe_output(stdout: &str) -> Result<MediaInfo, serde_json::Error> {
    let raw: FfprobeOutput = serde_json::from_str(stdout)?;

    let duration_seconds = raw
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let streams = raw
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_type: s.codec_type.unwrap_or_default(),
            codec_name: s.codec_name.unwrap_or_default(),
            default: s.disposition.get("default").copied().unwrap_or(0) == 1,
            tags: s.tags,
        })
        .collect();

    Ok(MediaInfo {
        duration_seconds,
        streams,
    })
}

/// Pick the primary audio stream: the first default-flagged audio
/// stream, else the first audio stream.
pub fn pick_audio_stream(info: &MediaInfo) -> Option<&StreamInfo> {
    let audio = info.streams_of_type("audio");
    audio
        .iter()
        .find(|s| s.default)
        .copied()
        .or_else(|| audio.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "disposition": {"default": 0}, "tags": {"language": "jpn"}},
            {"index": 2, "codec_type": "audio", "codec_name": "ac3",
             "disposition": {"default": 1}, "tags": {"LANGUAGE": "eng"}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "subrip",
             "tags": {"language": "eng"}}
        ],
        "format": {"duration": "5400.123"}
    }"#;

    #[test]
    fn test_parse_ffprobe_output() {
        let info = parse_ffprobe_output(SAMPLE).unwrap();
        assert!((info.duration_seconds - 5400.123).abs() < 1e-6);
        assert_eq!(info.streams.len(), 4);
        assert_eq!(info.subtitle_count(), 1);
    }

    #[test]
    fn test_pick_audio_prefers_default() {
        let info = parse_ffprobe_output(SAMPLE).unwrap();
        let picked = pick_audio_stream(&info).unwrap();
        assert_eq!(picked.index, 2);
    }

    #[test]
    fn test_pick_audio_falls_back_to_first() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264"},
                {"index": 1, "codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "10"}
        }"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert_eq!(pick_audio_stream(&info).unwrap().index, 1);
    }

    #[test]
    fn test_pick_audio_none_without_audio() {
        let json = r#"{"streams": [], "format": {"duration": "10"}}"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert!(pick_audio_stream(&info).is_none());
    }

    #[test]
    fn test_language_tag_variants() {
        let info = parse_ffprobe_output(SAMPLE).unwrap();
        assert_eq!(info.streams[1].language_tag(), Some("jpn".to_string()));
        assert_eq!(info.streams[2].language_tag(), Some("eng".to_string()));
        assert_eq!(info.streams[0].language_tag(), None);
    }

    #[test]
    fn test_language_tag_strips_nul() {
        let mut tags = HashMap::new();
        tags.insert("language".to_string(), "en\0\0".to_string());
        let stream = StreamInfo {
            index: 0,
            codec_type: "audio".to_string(),
            codec_name: "aac".to_string(),
            default: false,
            tags,
        };
        assert_eq!(stream.language_tag(), Some("en".to_string()));
    }

    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let info = parse_ffprobe_output(r#"{"streams": []}"#).unwrap();
        assert_eq!(info.duration_seconds, 0.0);
    }
}
