//! Neural transcription: per-target planning, audio extraction, the
//! whisperx driver with its sentence-shaping post-pass,
//! commentary-snippet transcription, and HuggingFace token validation
//! for the pyannote VAD backend.

mod driver;
mod plan;
mod snippet;
mod token;

pub use driver::{extract_audio, transcribe, TranscribeError};
pub use plan::{TranscriptionPlan, SCRATCH_DIR_NAME};
pub use snippet::{transcribe_snippet, SnippetRequest};
pub use token::TokenValidator;
