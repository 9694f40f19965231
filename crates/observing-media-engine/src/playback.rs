//! Single-active-playback registry
//!
//! Starting playback on one target pauses every other registered target
//! first. The registry lock is held for the whole exclusion pass, so two
//! concurrent `play` calls cannot interleave their sweeps.

use crate::error::PlaybackError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Something that can play media, typically a video element in the feed
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    async fn play(&self) -> std::result::Result<(), String>;
    async fn pause(&self);
    fn is_paused(&self) -> bool;

    /// Whether enough media is loaded to start
    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Paused,
    Playing,
}

struct Registered {
    target: Arc<dyn PlaybackTarget>,
    state: PlaybackState,
}

#[derive(Default)]
pub struct PlaybackController {
    registry: Mutex<HashMap<String, Registered>>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` as paused, replacing any target already under `id`
    pub async fn register(&self, id: &str, target: Arc<dyn PlaybackTarget>) {
        let previous = self.registry.lock().await.insert(
            id.to_string(),
            Registered {
                target,
                state: PlaybackState::Paused,
            },
        );

        if previous.is_some() {
            debug!(id, "Replaced playback target");
        }
    }

    pub async fn unregister(&self, id: &str) -> bool {
        self.registry.lock().await.remove(id).is_some()
    }

    /// Pause every other target, then start `id`.
    ///
    /// On failure `id` stays paused and the error is returned.
    pub async fn play(&self, id: &str) -> Result<(), PlaybackError> {
        let mut registry = self.registry.lock().await;

        let target = match registry.get(id) {
            Some(entry) => Arc::clone(&entry.target),
            None => return Err(PlaybackError::UnknownHandle(id.to_string())),
        };

        if !target.is_ready() {
            return Err(PlaybackError::NotReady(id.to_string()));
        }

        for (other_id, entry) in registry.iter_mut() {
            if other_id == id {
                continue;
            }
            if entry.state == PlaybackState::Playing || !entry.target.is_paused() {
                entry.target.pause().await;
                entry.state = PlaybackState::Paused;
                debug!(id = %other_id, "Paused for exclusive playback");
            }
        }

        match target.play().await {
            Ok(()) => {
                if let Some(entry) = registry.get_mut(id) {
                    entry.state = PlaybackState::Playing;
                }
                debug!(id, "Playing");
                Ok(())
            }
            Err(reason) => {
                warn!(id, reason = %reason, "Playback failed");
                if let Some(entry) = registry.get_mut(id) {
                    entry.state = PlaybackState::Paused;
                }
                Err(PlaybackError::UnderlyingPlayFailed {
                    id: id.to_string(),
                    reason,
                })
            }
        }
    }

    pub async fn pause_all(&self) {
        let mut registry = self.registry.lock().await;

        for (id, entry) in registry.iter_mut() {
            if entry.state == PlaybackState::Playing || !entry.target.is_paused() {
                entry.target.pause().await;
                entry.state = PlaybackState::Paused;
                debug!(id = %id, "Paused");
            }
        }
    }

    /// True iff `id` is the one playing target
    pub async fn is_active(&self, id: &str) -> bool {
        self.registry
            .lock()
            .await
            .get(id)
            .map(|entry| entry.state == PlaybackState::Playing)
            .unwrap_or(false)
    }

    pub async fn active(&self) -> Option<String> {
        self.registry
            .lock()
            .await
            .iter()
            .find(|(_, entry)| entry.state == PlaybackState::Playing)
            .map(|(id, _)| id.clone())
    }

    pub async fn state(&self, id: &str) -> Option<PlaybackState> {
        self.registry.lock().await.get(id).map(|entry| entry.state)
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }
}
