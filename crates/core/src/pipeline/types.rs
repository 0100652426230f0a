//! Work item, target, and manifest types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ident::IdContext;

/// Episode key used for items without per-episode structure.
pub const PRIMARY_EPISODE_KEY: &str = "primary";

/// One finished video file from the encoding stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedFile {
    /// Path to the encoded container.
    pub path: PathBuf,
    /// Lowercased `sNNeMM` key, or empty for a movie's single file.
    #[serde(default)]
    pub episode_key: String,
    /// Identifier of the episode's title entry.
    #[serde(default)]
    pub title_id: String,
    /// Season number; 0 when unknown.
    #[serde(default)]
    pub season: u32,
    /// Episode number; 0 when unknown.
    #[serde(default)]
    pub episode: u32,
    /// Episode title, empty when unknown.
    #[serde(default)]
    pub episode_title: String,
}

/// One video file to be subtitled, derived from an encoded file.
#[derive(Debug, Clone)]
pub struct SubtitleTarget {
    /// Source video.
    pub video_path: PathBuf,
    /// Scratch root for this target.
    pub work_dir: PathBuf,
    /// Where finished sidecars go.
    pub output_dir: PathBuf,
    /// Base name for `<base>.<lang>.srt`.
    pub base_name: String,
    /// Lowercased `sNNeMM`, or `primary`.
    pub episode_key: String,
    /// Episode title, empty when unknown.
    pub episode_title: String,
    /// Title id carried into the asset record.
    pub title_id: String,
    /// Season override; 0 keeps the context value.
    pub season: u32,
    /// Episode override; 0 keeps the context value.
    pub episode: u32,
}

/// Completion state of a per-episode asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Completed,
    Failed,
}

/// Per-episode asset record persisted back to the queue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Always `subtitled` for this stage.
    pub kind: String,
    /// Episode key the record belongs to.
    pub episode_key: String,
    /// Title id, empty when unknown.
    #[serde(default)]
    pub title_id: String,
    /// Finished sidecar path; empty on failure.
    #[serde(default)]
    pub path: String,
    /// Completed or failed.
    pub status: AssetStatus,
    /// Failure message, empty on success.
    #[serde(default)]
    pub error: String,
    /// Tracks were embedded into the container.
    #[serde(default)]
    pub subtitles_muxed: bool,
}

impl AssetRecord {
    /// A completed record.
    pub fn completed(episode_key: &str, title_id: &str, path: &str, muxed: bool) -> Self {
        Self {
            kind: "subtitled".to_string(),
            episode_key: episode_key.to_string(),
            title_id: title_id.to_string(),
            path: path.to_string(),
            status: AssetStatus::Completed,
            error: String::new(),
            subtitles_muxed: muxed,
        }
    }

    /// A failed record carrying the error message.
    pub fn failed(episode_key: &str, title_id: &str, error: &str) -> Self {
        Self {
            kind: "subtitled".to_string(),
            episode_key: episode_key.to_string(),
            title_id: title_id.to_string(),
            path: String::new(),
            status: AssetStatus::Failed,
            error: error.to_string(),
            subtitles_muxed: false,
        }
    }
}

/// Asset collections within the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assets {
    /// Subtitled assets, one per episode key.
    #[serde(default)]
    pub subtitled: Vec<AssetRecord>,
}

/// Per-episode generation outcome stored under
/// `attributes.subtitle_generation_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub episode_key: String,
    /// `opensubtitles` or `whisperx`.
    pub source: String,
    /// Served from the transcript cache.
    #[serde(default)]
    pub cached: bool,
    /// Cue count of the finished subtitle.
    #[serde(default)]
    pub segments: usize,
    /// Finished sidecar path; empty on failure.
    #[serde(default)]
    pub path: String,
    /// Tracks embedded into the container.
    #[serde(default)]
    pub subtitles_muxed: bool,
    /// Failure message, empty on success.
    #[serde(default)]
    pub error: String,
}

/// The item manifest: a keyed attribute bag plus typed asset lists.
///
/// Older manifests carry `has_forced_subtitle_track` only as a
/// free-form attribute; readers accept both shapes and prefer the
/// typed field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Typed forced-track flag, when the producing stage set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_forced_subtitle_track: Option<bool>,
    /// Free-form attributes (nested maps and lists survive JSON
    /// round-trips loosely typed).
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    /// Typed asset collections.
    #[serde(default)]
    pub assets: Assets,
}

impl Manifest {
    /// Parse a stored manifest value. A shape that does not parse is
    /// treated as "no per-episode context": an empty manifest.
    pub fn from_stored(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Whether the item declares a forced (foreign-parts-only) track.
    ///
    /// The typed field wins; the attribute fallback tolerates bools,
    /// strings, and 0/1 numbers from older JSON round-trips.
    pub fn forced_subtitle_track(&self) -> bool {
        if let Some(flag) = self.has_forced_subtitle_track {
            return flag;
        }
        match self.attributes.get("has_forced_subtitle_track") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s == "1",
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Pre-generated transcript paths keyed by episode key, from
    /// `attributes.content_id_transcripts`.
    pub fn content_id_transcripts(&self) -> HashMap<String, PathBuf> {
        let mut out = HashMap::new();
        if let Some(Value::Object(map)) = self.attributes.get("content_id_transcripts") {
            for (key, value) in map {
                if let Value::String(path) = value {
                    out.insert(key.to_lowercase(), PathBuf::from(path));
                }
            }
        }
        out
    }

    /// The completed subtitled asset for an episode key, if any.
    pub fn completed_subtitled(&self, episode_key: &str) -> Option<&AssetRecord> {
        self.assets
            .subtitled
            .iter()
            .find(|a| a.episode_key == episode_key && a.status == AssetStatus::Completed && !a.path.is_empty())
    }

    /// Insert or replace the subtitled asset for the record's episode
    /// key. Duplicate additions collapse to last-write-wins.
    pub fn upsert_subtitled(&mut self, record: AssetRecord) {
        self.assets
            .subtitled
            .retain(|a| a.episode_key != record.episode_key);
        self.assets.subtitled.push(record);
    }

    /// Store a generation record under
    /// `attributes.subtitle_generation_results`, keyed by episode.
    pub fn record_generation(&mut self, record: &GenerationRecord) {
        let entry = self
            .attributes
            .entry("subtitle_generation_results".to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = entry {
            if let Ok(value) = serde_json::to_value(record) {
                map.insert(record.episode_key.clone(), value);
            }
        }
    }

    /// Store the stage summary under
    /// `attributes.subtitle_generation_summary`.
    pub fn record_summary(&mut self, summary: Value) {
        self.attributes
            .insert("subtitle_generation_summary".to_string(), summary);
    }
}

/// One queue item as this stage sees it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Queue item id.
    pub id: String,
    /// Identification metadata, immutable for the item's lifetime.
    pub context: IdContext,
    /// Scratch root for this item.
    pub work_dir: PathBuf,
    /// Where finished sidecars go.
    pub output_dir: PathBuf,
    /// The item's primary encoded file (movies, or single-file items).
    pub primary_file: PathBuf,
    /// Per-episode encoded files; empty for movies.
    pub encoded_files: Vec<EncodedFile>,
    /// Stored manifest, re-persisted after each episode.
    pub manifest: Manifest,
}

impl WorkItem {
    /// Derive the subtitle targets: one per encoded file, or the
    /// primary file when there are none.
    pub fn targets(&self) -> Vec<SubtitleTarget> {
        if self.encoded_files.is_empty() {
            return vec![SubtitleTarget {
                video_path: self.primary_file.clone(),
                work_dir: self.work_dir.clone(),
                output_dir: self.output_dir.clone(),
                base_name: file_stem(&self.primary_file),
                episode_key: PRIMARY_EPISODE_KEY.to_string(),
                episode_title: String::new(),
                title_id: String::new(),
                season: 0,
                episode: 0,
            }];
        }

        self.encoded_files
            .iter()
            .map(|f| {
                let episode_key = if f.episode_key.is_empty() {
                    PRIMARY_EPISODE_KEY.to_string()
                } else {
                    f.episode_key.to_lowercase()
                };
                SubtitleTarget {
                    video_path: f.path.clone(),
                    work_dir: self.work_dir.join(&episode_key),
                    output_dir: self.output_dir.clone(),
                    base_name: file_stem(&f.path),
                    episode_key,
                    episode_title: f.episode_title.clone(),
                    title_id: f.title_id.clone(),
                    season: f.season,
                    episode: f.episode,
                }
            })
            .collect()
    }
}

fn file_stem(path: &PathBuf) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string())
}
