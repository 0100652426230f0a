//! Stage error taxonomy.
//!
//! Candidate-level rejections ([`SoftReject`]) are deliberately a
//! separate type: they drive "try the next candidate" inside a target
//! and must never escape to the caller as failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::align::AlignError;
use crate::cache::CacheError;
use crate::mux::MuxError;
use crate::provider::ProviderError;
use crate::srt::SrtError;
use crate::tools::ToolError;
use crate::transcribe::TranscribeError;

use super::queue::QueueError;

/// Why a candidate was rejected without failing the episode.
#[derive(Debug, Clone)]
pub enum SoftReject {
    /// Subtitle-vs-video duration outside tolerance; carries the
    /// signed delta for mis-identification detection.
    DurationMismatch { reason: String, delta: f64 },
    /// The alignment quality guard rejected the result.
    AlignmentRejected { reason: String },
    /// The downloaded payload was empty or unparseable.
    UnusablePayload { reason: String },
}

impl SoftReject {
    /// Human-readable rejection reason.
    pub fn reason(&self) -> &str {
        match self {
            Self::DurationMismatch { reason, .. } => reason,
            Self::AlignmentRejected { reason } => reason,
            Self::UnusablePayload { reason } => reason,
        }
    }
}

/// Errors surfaced by the stage, classified for the caller's retry
/// policy.
#[derive(Debug, Error)]
pub enum StageError {
    /// Bad inputs. Not retriable.
    #[error("validation: {0}")]
    Validation(String),

    /// Missing binary, API key, or token. Not retriable.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Source file missing on disk.
    #[error("not found: {0}")]
    NotFound(String),

    /// A subprocess failed; stderr is in the log file.
    #[error("external tool {tool} failed, log at {log_path}")]
    ExternalTool { tool: String, log_path: PathBuf },

    /// Retriable at the stage level.
    #[error("transient: {0}")]
    Transient(String),

    /// Every candidate soft-rejected on duration with large,
    /// consistent offsets: the source media is probably not what the
    /// identification stage claims.
    #[error("suspect mis-identification from subtitle offsets")]
    SuspectMisId { deltas: Vec<f64> },

    /// The caller's cancellation signal fired.
    #[error("cancelled")]
    Cancelled,
}

impl From<ToolError> for StageError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Launch { tool, source } => {
                Self::Configuration(format!("cannot launch {}: {}", tool, source))
            }
            ToolError::Failed { tool, log_path } => Self::ExternalTool { tool, log_path },
            ToolError::Cancelled { .. } => Self::Cancelled,
            ToolError::Io(e) => Self::Transient(e.to_string()),
        }
    }
}

impl From<ProviderError> for StageError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Configuration(msg) => Self::Configuration(msg),
            ProviderError::Cancelled => Self::Cancelled,
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<TranscribeError> for StageError {
    fn from(e: TranscribeError) -> Self {
        match e {
            TranscribeError::Validation(msg) => Self::Validation(msg),
            TranscribeError::NotFound(path) => Self::NotFound(path.display().to_string()),
            TranscribeError::Tool(tool) => tool.into(),
            TranscribeError::Token(t) => Self::Transient(t.to_string()),
            TranscribeError::EmptyOutput(path) => {
                Self::Transient(format!("empty transcription output at {}", path.display()))
            }
            TranscribeError::Io(e) => Self::Transient(e.to_string()),
        }
    }
}

impl From<AlignError> for StageError {
    fn from(e: AlignError) -> Self {
        match e {
            AlignError::Tool(tool) => tool.into(),
            AlignError::QualityRejected { reason } => {
                // Quality rejections are normally handled as soft
                // rejects inside the candidate loop; one escaping here
                // means the AI path produced an unusable alignment.
                Self::Transient(format!("alignment rejected: {}", reason))
            }
            AlignError::Srt(e) => Self::Transient(e.to_string()),
            AlignError::MissingOutput(path) => {
                Self::Transient(format!("aligner wrote no output at {}", path.display()))
            }
        }
    }
}

impl From<MuxError> for StageError {
    fn from(e: MuxError) -> Self {
        match e {
            MuxError::NotFound(path) => Self::NotFound(path.display().to_string()),
            MuxError::NoTracks => Self::Validation("nothing to mux".to_string()),
            MuxError::Tool(tool) => tool.into(),
            MuxError::Io(e) => Self::Transient(e.to_string()),
        }
    }
}

impl From<CacheError> for StageError {
    fn from(e: CacheError) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<QueueError> for StageError {
    fn from(e: QueueError) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<SrtError> for StageError {
    fn from(e: SrtError) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_classification() {
        let launch = ToolError::Launch {
            tool: "mkvmerge".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(matches!(StageError::from(launch), StageError::Configuration(_)));

        let failed = ToolError::Failed {
            tool: "ffmpeg".to_string(),
            log_path: PathBuf::from("/logs/x.log"),
        };
        assert!(matches!(
            StageError::from(failed),
            StageError::ExternalTool { .. }
        ));
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(matches!(
            StageError::from(ProviderError::Configuration("no key".to_string())),
            StageError::Configuration(_)
        ));
        assert!(matches!(
            StageError::from(ProviderError::Transport("reset".to_string())),
            StageError::Transient(_)
        ));
        assert!(matches!(
            StageError::from(ProviderError::Cancelled),
            StageError::Cancelled
        ));
    }

    #[test]
    fn test_suspect_misid_message() {
        let err = StageError::SuspectMisId {
            deltas: vec![-120.0, 130.0],
        };
        assert_eq!(
            err.to_string(),
            "suspect mis-identification from subtitle offsets"
        );
    }

    #[test]
    fn test_soft_reject_reasons() {
        let r = SoftReject::DurationMismatch {
            reason: "subtitle ends 900s before the video ends".to_string(),
            delta: 900.0,
        };
        assert!(r.reason().contains("900"));
    }
}
