//! Content-addressed on-disk caches for subtitle payloads and
//! generated transcripts.
//!
//! Keys are hashed (SHA-256 of the lowercased key) into flat file
//! names: `<hash>.srt` for the payload and `<hash>.json` for the
//! metadata sidecar. Writes stage to `.tmp` files and rename so a
//! concurrent reader never observes a truncated entry. Read errors are
//! logged and degrade to a cache miss.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from cache writes. Reads never fail; they miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization failed: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Metadata stored next to each cached payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMeta {
    /// The original (un-hashed) key.
    pub key: String,
    /// Two-letter subtitle language.
    pub language: String,
    /// Number of cues in the payload.
    pub segments: usize,
    /// When the entry was last written.
    pub updated: DateTime<Utc>,
}

/// One cache directory holding `.srt` payloads and `.json` sidecars.
#[derive(Debug, Clone)]
pub struct CacheDir {
    dir: PathBuf,
}

impl CacheDir {
    /// Open (and create) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn stem(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.srt", Self::stem(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::stem(key)))
    }

    /// Load an entry. Returns `None` on a miss or any read error.
    pub async fn load(&self, key: &str) -> Option<(Vec<u8>, CacheMeta)> {
        let payload_path = self.payload_path(key);
        let meta_path = self.meta_path(key);

        let bytes = match tokio::fs::read(&payload_path).await {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => return None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %payload_path.display(), error = %e, "Cache payload unreadable, treating as miss");
                return None;
            }
        };

        let meta = match tokio::fs::read(&meta_path).await {
            Ok(raw) => match serde_json::from_slice::<CacheMeta>(&raw) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %meta_path.display(), error = %e, "Cache metadata corrupt, treating as miss");
                    return None;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "Cache metadata unreadable, treating as miss");
                return None;
            }
        };

        debug!(key = key, segments = meta.segments, "Cache hit");
        Some((bytes, meta))
    }

    /// Store an entry atomically. Returns the payload path.
    pub async fn store(
        &self,
        key: &str,
        language: &str,
        segments: usize,
        bytes: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let payload_path = self.payload_path(key);
        let meta_path = self.meta_path(key);

        let meta = CacheMeta {
            key: key.to_string(),
            language: language.to_string(),
            segments,
            updated: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        write_atomic(&payload_path, bytes).await?;
        write_atomic(&meta_path, &meta_json).await?;

        debug!(key = key, path = %payload_path.display(), "Cache store");
        Ok(payload_path)
    }
}

/// Stage to a `.tmp` sibling and rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// The two stores this stage maintains: downloaded subtitle payloads
/// keyed by provider file id, and generated transcripts keyed by a
/// composite transcript key.
#[derive(Debug, Clone)]
pub struct SubtitleCache {
    payloads: CacheDir,
    transcripts: CacheDir,
}

impl SubtitleCache {
    /// Open both cache directories, creating them as needed.
    pub async fn open(
        payload_dir: impl Into<PathBuf>,
        transcript_dir: impl Into<PathBuf>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            payloads: CacheDir::open(payload_dir).await?,
            transcripts: CacheDir::open(transcript_dir).await?,
        })
    }

    /// Downloaded-payload store, keyed by provider file id.
    pub fn payloads(&self) -> &CacheDir {
        &self.payloads
    }

    /// Generated-transcript store, keyed by transcript key.
    pub fn transcripts(&self) -> &CacheDir {
        &self.transcripts
    }

    /// Key for a downloaded payload.
    pub fn file_id_key(file_id: u64) -> String {
        file_id.to_string()
    }
}

/// Build the cache key for a commentary-snippet transcript from the
/// identifying facts of the extraction.
#[allow(clippy::too_many_arguments)]
pub fn snippet_transcript_key(
    path: &Path,
    size: u64,
    mtime_secs: i64,
    audio_index: usize,
    start_ms: u64,
    duration_ms: u64,
    language: &str,
) -> String {
    let raw = format!(
        "commentary_snippet_v1|{}|{}|{}|{}|{}|{}|{}",
        path.display(),
        size,
        mtime_secs,
        audio_index,
        start_ms,
        duration_ms,
        language
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}
