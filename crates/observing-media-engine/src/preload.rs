//! Priority-ordered background preloading
//!
//! URLs are queued by priority (FIFO within a priority), drained one at a
//! time through the blob cache, probed for play-through, and kept in a
//! bounded [`WarmSet`]. Explicit (user-driven) outcomes are broadcast so a
//! feed tile can show an error state; speculative failures are only logged.

use crate::config::{EngineConfig, PreloadWindow};
use crate::warm_set::{PlayableMedia, WarmSet};
use media_blob_cache::{BlobCache, FetchError, MediaHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, info, warn};

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Who asked for a preload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOrigin {
    /// A consumer acting on direct user intent; outcomes are reported
    Explicit,
    /// The anticipatory prefetcher; failures are swallowed
    Speculative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadQueueItem {
    pub url: String,
    pub priority: Priority,
    pub origin: RequestOrigin,
    /// Enqueue sequence number; breaks ties within a priority
    pub enqueued_at: u64,
}

#[derive(Debug, Clone)]
pub enum WarmOutcome {
    Warmed { url: String, media: PlayableMedia },
    Failed { url: String, error: FetchError },
    /// Cancelled before it was kept warm, whatever its fetch returned
    Discarded { url: String },
}

impl WarmOutcome {
    pub fn url(&self) -> &str {
        match self {
            WarmOutcome::Warmed { url, .. }
            | WarmOutcome::Failed { url, .. }
            | WarmOutcome::Discarded { url } => url,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    url: String,
    origin: RequestOrigin,
    cancelled: bool,
}

#[derive(Debug)]
struct SchedulerState {
    /// Kept sorted: higher priority first, then enqueue order
    queue: Vec<PreloadQueueItem>,
    warm: WarmSet,
    in_flight: Option<InFlight>,
    seq: u64,
}

struct SchedulerInner {
    cache: BlobCache,
    state: Mutex<SchedulerState>,
    wake: Notify,
    outcomes: broadcast::Sender<WarmOutcome>,
    window: PreloadWindow,
    warm_timeout: Duration,
    drain_delay: Duration,
}

/// Process-wide preload queue and warm set.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct PreloadScheduler {
    inner: Arc<SchedulerInner>,
}

impl PreloadScheduler {
    pub fn new(cache: BlobCache, config: &EngineConfig) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                state: Mutex::new(SchedulerState {
                    queue: Vec::new(),
                    warm: WarmSet::new(config.warm_set_capacity),
                    in_flight: None,
                    seq: 0,
                }),
                wake: Notify::new(),
                outcomes,
                window: config.preload_window,
                warm_timeout: config.warm_timeout(),
                drain_delay: config.drain_delay(),
            }),
        }
    }

    /// Queue an explicit preload. Returns false if the URL is already warm,
    /// queued or in flight.
    pub async fn request(&self, url: &str, priority: Priority) -> bool {
        self.request_with_origin(url, priority, RequestOrigin::Explicit)
            .await
    }

    /// Queue a preload on behalf of `origin`.
    ///
    /// An explicit request for something already pending speculatively
    /// upgrades its origin so the outcome is reported; its place in the
    /// queue does not change.
    pub async fn request_with_origin(
        &self,
        url: &str,
        priority: Priority,
        origin: RequestOrigin,
    ) -> bool {
        let mut state = self.inner.state.lock().await;

        if state.warm.contains(url) {
            return false;
        }

        if let Some(in_flight) = state.in_flight.as_mut().filter(|f| f.url == url) {
            if origin == RequestOrigin::Explicit {
                in_flight.origin = origin;
            }
            in_flight.cancelled = false;
            return false;
        }

        if let Some(item) = state.queue.iter_mut().find(|item| item.url == url) {
            if origin == RequestOrigin::Explicit {
                item.origin = origin;
            }
            return false;
        }

        state.seq += 1;
        let item = PreloadQueueItem {
            url: url.to_string(),
            priority,
            origin,
            enqueued_at: state.seq,
        };

        let position = state
            .queue
            .iter()
            .position(|queued| queued.priority < priority)
            .unwrap_or(state.queue.len());
        state.queue.insert(position, item);

        debug!(url, ?priority, ?origin, position, "Queued preload");
        drop(state);

        self.inner.wake.notify_one();
        true
    }

    /// Preload the window around `current_index` in a feed.
    ///
    /// The next item is `High`; everything else in the window is `Medium`.
    /// Forward items are issued before backward ones so they drain first.
    pub async fn preload_nearby(
        &self,
        current_index: usize,
        ordered_urls: &[String],
    ) -> Vec<(usize, Priority)> {
        if current_index >= ordered_urls.len() {
            return Vec::new();
        }

        let last = ordered_urls.len() - 1;
        let furthest = current_index
            .saturating_add(self.inner.window.ahead)
            .min(last);
        let ahead = (current_index + 1)..=furthest;
        let behind = (current_index.saturating_sub(self.inner.window.behind)..current_index).rev();

        let mut issued = Vec::new();
        for index in ahead.chain(behind) {
            let priority = if index == current_index + 1 {
                Priority::High
            } else {
                Priority::Medium
            };
            self.request(&ordered_urls[index], priority).await;
            issued.push((index, priority));
        }

        issued
    }

    /// Withdraw interest in `url`.
    ///
    /// A queued item is dropped; an in-flight one finishes its fetch but is
    /// not kept warm.
    pub async fn cancel(&self, url: &str) -> bool {
        let mut state = self.inner.state.lock().await;

        if let Some(position) = state.queue.iter().position(|item| item.url == url) {
            let item = state.queue.remove(position);
            debug!(url, "Cancelled queued preload");
            if item.origin == RequestOrigin::Explicit {
                let _ = self
                    .inner
                    .outcomes
                    .send(WarmOutcome::Discarded { url: item.url });
            }
            return true;
        }

        match state.in_flight.as_mut().filter(|f| f.url == url) {
            Some(in_flight) => {
                in_flight.cancelled = true;
                debug!(url, "Cancelled in-flight preload");
                true
            }
            None => false,
        }
    }

    pub async fn is_warm(&self, url: &str) -> bool {
        self.inner.state.lock().await.warm.contains(url)
    }

    pub async fn warm_handle(&self, url: &str) -> Option<PlayableMedia> {
        self.inner.state.lock().await.warm.get(url).cloned()
    }

    /// Warm URLs from least to most recently warmed
    pub async fn warm_urls(&self) -> Vec<String> {
        self.inner.state.lock().await.warm.urls()
    }

    /// Snapshot of the queue in drain order
    pub async fn queued(&self) -> Vec<PreloadQueueItem> {
        self.inner.state.lock().await.queue.clone()
    }

    /// Nothing queued and nothing in flight
    pub async fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.queue.is_empty() && state.in_flight.is_none()
    }

    /// Outcomes of explicit requests, for user-visible feedback
    pub fn subscribe(&self) -> broadcast::Receiver<WarmOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Explicitly request `url` and wait for its outcome.
    ///
    /// A new request is queued at high priority. If `url` is already queued
    /// it keeps its place and priority and only becomes explicit.
    ///
    /// Resolves through the drain loop, so [`run`](Self::run) must be active.
    pub async fn ensure_warm(&self, url: &str) -> Result<PlayableMedia, FetchError> {
        let mut outcomes = self.subscribe();

        self.request(url, Priority::High).await;
        if let Some(media) = self.warm_handle(url).await {
            return Ok(media);
        }

        loop {
            match outcomes.recv().await {
                Ok(outcome) if outcome.url() == url => {
                    return match outcome {
                        WarmOutcome::Warmed { media, .. } => Ok(media),
                        WarmOutcome::Failed { error, .. } => Err(error),
                        WarmOutcome::Discarded { .. } => Err(FetchError::Cancelled),
                    };
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(url, skipped, "Outcome receiver lagged");
                    if let Some(media) = self.warm_handle(url).await {
                        return Ok(media);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(FetchError::NetworkFailure(
                        "preload scheduler shut down".to_string(),
                    ));
                }
            }
        }
    }

    /// Drain a single queue item: fetch, probe, and keep it warm.
    ///
    /// Returns `None` when the queue is empty.
    pub async fn process_next(&self) -> Option<WarmOutcome> {
        let item = {
            let mut state = self.inner.state.lock().await;
            if state.queue.is_empty() {
                return None;
            }
            let item = state.queue.remove(0);
            state.in_flight = Some(InFlight {
                url: item.url.clone(),
                origin: item.origin,
                cancelled: false,
            });
            item
        };

        debug!(url = %item.url, priority = ?item.priority, "Warming");

        let result = tokio::time::timeout(self.inner.warm_timeout, self.warm(&item.url))
            .await
            .map_err(FetchError::from)
            .and_then(|result| result);

        let (outcome, origin) = {
            let mut state = self.inner.state.lock().await;
            let (origin, cancelled) = state
                .in_flight
                .take()
                .map(|f| (f.origin, f.cancelled))
                .unwrap_or((item.origin, false));

            let outcome = match result {
                Ok(_) if cancelled => WarmOutcome::Discarded { url: item.url },
                Err(error) if cancelled => {
                    debug!(url = %item.url, error = %error, "Cancelled preload failed");
                    WarmOutcome::Discarded { url: item.url }
                }
                Ok(media) => {
                    let playable = PlayableMedia::new(media);
                    for evicted in state.warm.insert(playable.clone()) {
                        debug!(url = %evicted.url(), "Evicted from warm set");
                    }
                    WarmOutcome::Warmed {
                        url: item.url,
                        media: playable,
                    }
                }
                Err(error) => WarmOutcome::Failed {
                    url: item.url,
                    error,
                },
            };
            (outcome, origin)
        };

        match (&outcome, origin) {
            (WarmOutcome::Failed { url, error }, RequestOrigin::Explicit) => {
                warn!(url = %url, error = %error, "Preload failed");
            }
            (WarmOutcome::Failed { url, error }, RequestOrigin::Speculative) => {
                debug!(url = %url, error = %error, "Speculative preload failed");
            }
            (WarmOutcome::Warmed { url, .. }, _) => debug!(url = %url, "Warmed"),
            (WarmOutcome::Discarded { url }, _) => debug!(url = %url, "Discarded cancelled preload"),
        }

        if origin == RequestOrigin::Explicit {
            // No receivers is fine
            let _ = self.inner.outcomes.send(outcome.clone());
        }

        Some(outcome)
    }

    async fn warm(&self, url: &str) -> Result<MediaHandle, FetchError> {
        let media = self.inner.cache.fetch_and_cache(url).await?;
        self.inner.cache.source().probe(&media).await?;
        Ok(media)
    }

    /// Background drain loop; runs until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Preload scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.process_next().await.is_some() {
                tokio::select! {
                    _ = tokio::time::sleep(self.inner.drain_delay) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            tokio::select! {
                _ = self.inner.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Preload scheduler stopped");
    }
}
