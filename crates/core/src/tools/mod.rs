//! External tool invocation.
//!
//! Everything the stage shells out to (ffmpeg, ffprobe, whisperx, the
//! sentence shaper, ffsubsync, mkvmerge) goes through the [`ToolRunner`]
//! trait so tests can substitute scripted behavior for real binaries.

mod probe;
mod runner;

pub use probe::{pick_audio_stream, probe_media, MediaInfo, StreamInfo};
pub use runner::{SystemRunner, ToolError, ToolOutput, ToolRunner, ToolSpec};
