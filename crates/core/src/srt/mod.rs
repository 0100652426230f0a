//! SubRip (.srt) codec and validation.
//!
//! This module provides lenient parsing, normalized emission, cheap
//! file scans, advertisement-cue cleanup, and structural validation
//! for SubRip subtitle payloads.

mod cleaner;
mod codec;
mod types;

pub use cleaner::{clean, plain_text};
pub use codec::{bounds, count_cues, emit, last_timestamp, parse, validate};
pub use types::{format_timestamp, parse_timing_line, Cue, SrtError};
