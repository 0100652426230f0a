use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::align::{AlignmentGuardConfig, ForcedAlignConfig};
use crate::duration::DurationConfig;
use crate::provider::ProviderConfig;

/// Root configuration for the subtitle stage.
///
/// Module-owned tunables (`ProviderConfig`, `AlignmentGuardConfig`,
/// `ForcedAlignConfig`, `DurationConfig`) compose here with the
/// stage-level switches so operators retune thresholds without code
/// changes.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
    #[serde(default)]
    pub alignment: AlignmentGuardConfig,
    #[serde(default)]
    pub forced: ForcedAlignConfig,
    #[serde(default)]
    pub duration: DurationConfig,
    #[serde(default)]
    pub stage: StageConfig,
}

/// Cache directory layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Downloaded subtitle payloads.
    #[serde(default = "default_payload_dir")]
    pub payload_dir: PathBuf,
    /// Generated transcripts.
    #[serde(default = "default_transcript_dir")]
    pub transcript_dir: PathBuf,
}

fn default_payload_dir() -> PathBuf {
    PathBuf::from("cache/subtitles")
}

fn default_transcript_dir() -> PathBuf {
    PathBuf::from("cache/transcripts")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            payload_dir: default_payload_dir(),
            transcript_dir: default_transcript_dir(),
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Where per-invocation failure logs go.
    #[serde(default = "default_tool_log_dir")]
    pub log_dir: PathBuf,
}

fn default_tool_log_dir() -> PathBuf {
    PathBuf::from("logs/tools")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_tool_log_dir(),
        }
    }
}

/// Voice-activity-detection backend for the transcription engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VadMethod {
    /// No-auth default.
    #[default]
    Silero,
    /// Requires a validated HuggingFace token.
    Pyannote,
}

impl VadMethod {
    /// Wire value passed to the transcription engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silero => "silero",
            Self::Pyannote => "pyannote",
        }
    }
}

/// Transcription engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    /// Run the engine on CUDA.
    #[serde(default)]
    pub cuda: bool,
    /// VAD backend.
    #[serde(default)]
    pub vad_method: VadMethod,
    /// HuggingFace token for pyannote VAD.
    #[serde(default)]
    pub hf_token: String,
    /// Token validation endpoint.
    #[serde(default = "default_hf_endpoint")]
    pub hf_endpoint: String,
}

fn default_hf_endpoint() -> String {
    "https://huggingface.co/api/whoami-v2".to_string()
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            cuda: false,
            vad_method: VadMethod::default(),
            hf_token: String::new(),
            hf_endpoint: default_hf_endpoint(),
        }
    }
}

/// Stage-level switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    /// Use the remote provider at all.
    #[serde(default = "default_true")]
    pub remote_enabled: bool,
    /// Skip the provider and always transcribe.
    #[serde(default)]
    pub force_ai: bool,
    /// Embed finished tracks into the container.
    #[serde(default)]
    pub mux: bool,
    /// Strip pre-existing subtitle tracks when muxing.
    #[serde(default)]
    pub strip_existing_subs: bool,
    /// Run the audio-sync pre-pass before alignment.
    #[serde(default = "default_true")]
    pub sync_prepass: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            force_ai: false,
            mux: false,
            strip_existing_subs: false,
            sync_prepass: true,
        }
    }
}

/// Sanitized config for logs and API responses (secrets redacted).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider_api_url: String,
    pub provider_api_key: String,
    pub provider_user_token: String,
    pub cache: CacheConfig,
    pub stage: StageConfig,
    pub vad_method: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            provider_api_url: config.provider.api_url.clone(),
            provider_api_key: redact(&config.provider.api_key),
            provider_user_token: redact(&config.provider.user_token),
            cache: config.cache.clone(),
            stage: config.stage.clone(),
            vad_method: config.transcribe.vad_method.as_str().to_string(),
        }
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
