//! In-memory collaborators for tests

use crate::error::{FetchError, Result};
use crate::source::MediaSource;
use crate::types::{FetchedMedia, MediaHandle};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A [`MediaSource`] serving canned responses and counting fetches per URL
#[derive(Default)]
pub struct StaticSource {
    responses: Mutex<HashMap<String, Result<FetchedMedia>>>,
    unplayable: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
    latency: Duration,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `latency` before answering
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Serve `size` bytes of `video/mp4` at `url`
    pub fn insert(&self, url: &str, size: usize) {
        self.insert_media(url, FetchedMedia::new(vec![0u8; size], "video/mp4"));
    }

    pub fn insert_media(&self, url: &str, media: FetchedMedia) {
        locked(&self.responses).insert(url.to_string(), Ok(media));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        locked(&self.responses).insert(url.to_string(), Err(error));
    }

    /// Fetches of `url` succeed but the playability probe rejects them
    pub fn mark_unplayable(&self, url: &str) {
        locked(&self.unplayable).insert(url.to_string());
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        locked(&self.fetches).get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        locked(&self.fetches).values().sum()
    }
}

#[async_trait]
impl MediaSource for StaticSource {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        *locked(&self.fetches).entry(url.to_string()).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        locked(&self.responses)
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NetworkFailure(format!("404 for {}", url))))
    }

    async fn probe(&self, media: &MediaHandle) -> Result<()> {
        if locked(&self.unplayable).contains(media.url()) {
            return Err(FetchError::Unsupported(format!(
                "{} cannot play through",
                media.url()
            )));
        }
        Ok(())
    }
}
