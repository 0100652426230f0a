//! Queue-store seam.
//!
//! The queue store itself lives outside this stage; only the update
//! operations the stage performs are modeled here. Manifest writes are
//! serialized by the store implementation.

use async_trait::async_trait;
use thiserror::Error;

use super::types::Manifest;

/// Errors from queue-store updates. All of them are transient from
/// the stage's point of view.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Storage(String),
}

/// Update operations against the queue store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Update the item's progress display.
    async fn update_progress(
        &self,
        item_id: &str,
        stage: &str,
        message: &str,
        percent: f32,
    ) -> Result<(), QueueError>;

    /// Persist the manifest (assets + attributes) for the item.
    async fn save_manifest(&self, item_id: &str, manifest: &Manifest) -> Result<(), QueueError>;

    /// Flag the item for human review with a reason.
    async fn flag_review(&self, item_id: &str, reason: &str) -> Result<(), QueueError>;

    /// Record which episode the stage is currently working on.
    async fn set_active_episode(&self, item_id: &str, episode_key: &str) -> Result<(), QueueError>;

    /// Record the item-level error message (empty clears it).
    async fn set_error_message(&self, item_id: &str, message: &str) -> Result<(), QueueError>;
}
