//! Per-item orchestration: work items, the manifest attribute bag,
//! the queue-store seam, the stage error taxonomy, and the subtitle
//! stage itself.

mod error;
mod queue;
mod stage;
mod types;

pub use error::{SoftReject, StageError};
pub use queue::{QueueError, QueueStore};
pub use stage::{ItemSummary, SubtitleStage};
pub use types::{
    AssetRecord, AssetStatus, Assets, EncodedFile, GenerationRecord, Manifest, SubtitleTarget,
    WorkItem, PRIMARY_EPISODE_KEY,
};
