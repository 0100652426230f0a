//! Mock queue store for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::pipeline::{Manifest, QueueError, QueueStore};

/// Mock implementation of the `QueueStore` trait.
///
/// Keeps the last saved manifest per item plus append-only logs of
/// every update, so tests can assert both final state and the order
/// of writes.
pub struct MockQueueStore {
    manifests: Mutex<HashMap<String, Manifest>>,
    manifest_saves: Mutex<Vec<String>>,
    progress: Mutex<Vec<(String, String, f32)>>,
    reviews: Mutex<Vec<(String, String)>>,
    active_episodes: Mutex<Vec<(String, String)>>,
    error_messages: Mutex<Vec<(String, String)>>,
    fail_saves: Mutex<bool>,
}

impl std::fmt::Debug for MockQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockQueueStore").finish_non_exhaustive()
    }
}

impl Default for MockQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQueueStore {
    pub fn new() -> Self {
        Self {
            manifests: Mutex::new(HashMap::new()),
            manifest_saves: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            reviews: Mutex::new(Vec::new()),
            active_episodes: Mutex::new(Vec::new()),
            error_messages: Mutex::new(Vec::new()),
            fail_saves: Mutex::new(false),
        }
    }

    /// Make every manifest save fail (simulates a dead store).
    pub fn fail_saves(&self) {
        *self.fail_saves.lock().unwrap() = true;
    }

    /// The last manifest saved for an item.
    pub fn last_manifest(&self, item_id: &str) -> Option<Manifest> {
        self.manifests.lock().unwrap().get(item_id).cloned()
    }

    /// Number of manifest saves for an item.
    pub fn manifest_save_count(&self, item_id: &str) -> usize {
        self.manifest_saves
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == item_id)
            .count()
    }

    /// Every progress update: (message, percent) in call order.
    pub fn progress_log(&self) -> Vec<(String, f32)> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message, percent)| (message.clone(), *percent))
            .collect()
    }

    /// Every review flag: (item, reason) in call order.
    pub fn review_log(&self) -> Vec<(String, String)> {
        self.reviews.lock().unwrap().clone()
    }

    /// Every active-episode update, in call order.
    pub fn active_episode_log(&self) -> Vec<String> {
        self.active_episodes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl QueueStore for MockQueueStore {
    async fn update_progress(
        &self,
        item_id: &str,
        _stage: &str,
        message: &str,
        percent: f32,
    ) -> Result<(), QueueError> {
        self.progress
            .lock()
            .unwrap()
            .push((item_id.to_string(), message.to_string(), percent));
        Ok(())
    }

    async fn save_manifest(&self, item_id: &str, manifest: &Manifest) -> Result<(), QueueError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(QueueError::Storage("save failed (scripted)".to_string()));
        }
        self.manifests
            .lock()
            .unwrap()
            .insert(item_id.to_string(), manifest.clone());
        self.manifest_saves.lock().unwrap().push(item_id.to_string());
        Ok(())
    }

    async fn flag_review(&self, item_id: &str, reason: &str) -> Result<(), QueueError> {
        self.reviews
            .lock()
            .unwrap()
            .push((item_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn set_active_episode(&self, item_id: &str, episode_key: &str) -> Result<(), QueueError> {
        self.active_episodes
            .lock()
            .unwrap()
            .push((item_id.to_string(), episode_key.to_string()));
        Ok(())
    }

    async fn set_error_message(&self, item_id: &str, message: &str) -> Result<(), QueueError> {
        self.error_messages
            .lock()
            .unwrap()
            .push((item_id.to_string(), message.to_string()));
        Ok(())
    }
}
