//! Wiring for the four media units
//!
//! One [`MediaEngine`] is built per process and shared by reference. Its
//! blob cache is the single owner of downloaded bytes; the scheduler and
//! prefetcher sit on top of it.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::playback::PlaybackController;
use crate::prefetch::{AnticipatoryPrefetcher, PrefetchSignal};
use crate::preload::PreloadScheduler;
use media_blob_cache::{BlobCache, MediaSource};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SIGNAL_CHANNEL_CAPACITY: usize = 256;

pub struct MediaEngine {
    config: EngineConfig,
    cache: BlobCache,
    scheduler: PreloadScheduler,
    playback: Arc<PlaybackController>,
    prefetcher: Arc<AnticipatoryPrefetcher>,
    signal_tx: mpsc::Sender<PrefetchSignal>,
    signal_rx: Mutex<Option<mpsc::Receiver<PrefetchSignal>>>,
}

impl MediaEngine {
    pub fn new(config: EngineConfig, source: Arc<dyn MediaSource>) -> Self {
        let cache = BlobCache::new(source, config.byte_budget, config.fetch_timeout());
        let scheduler = PreloadScheduler::new(cache.clone(), &config);
        let prefetcher = Arc::new(AnticipatoryPrefetcher::new(
            scheduler.clone(),
            config.scroll_margin,
        ));
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        info!(
            byte_budget = config.byte_budget,
            warm_set_capacity = config.warm_set_capacity,
            "Media engine configured"
        );

        Self {
            config,
            cache,
            scheduler,
            playback: Arc::new(PlaybackController::new()),
            prefetcher,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        }
    }

    /// Spawn the preload drain loop and the prefetch signal loop.
    ///
    /// Can only be called once per engine.
    pub fn start(&self) -> Result<EngineTasks> {
        let signal_rx = self
            .signal_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(EngineError::AlreadyStarted)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = self.scheduler.clone();
        let drain_shutdown = shutdown_rx.clone();
        let drain = tokio::spawn(async move { scheduler.run(drain_shutdown).await });

        let prefetcher = Arc::clone(&self.prefetcher);
        let prefetch = tokio::spawn(async move { prefetcher.run(signal_rx, shutdown_rx).await });

        info!("Media engine started");

        Ok(EngineTasks {
            shutdown: shutdown_tx,
            handles: vec![drain, prefetch],
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &PreloadScheduler {
        &self.scheduler
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    pub fn prefetcher(&self) -> &Arc<AnticipatoryPrefetcher> {
        &self.prefetcher
    }

    /// Sender for UI signals consumed by the prefetch loop
    pub fn signals(&self) -> mpsc::Sender<PrefetchSignal> {
        self.signal_tx.clone()
    }
}

/// Handles to the engine's background loops
pub struct EngineTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl EngineTasks {
    /// Signal both loops to stop and wait for them
    pub async fn shutdown(self) {
        // Receivers may already be gone if a loop exited on its own
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }

        info!("Media engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preload::Priority;
    use media_blob_cache::testing::StaticSource;
    use std::time::Duration;

    fn engine_with(urls: &[&str]) -> MediaEngine {
        let source = Arc::new(StaticSource::new());
        for url in urls {
            source.insert(url, 256);
        }
        MediaEngine::new(EngineConfig::default(), source)
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = engine_with(&[]);
        let tasks = engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_flow_into_warm_set() {
        let engine = engine_with(&["https://cdn.test/a.mp4"]);
        let tasks = engine.start().unwrap();

        engine
            .signals()
            .send(PrefetchSignal::Hover(vec!["https://cdn.test/a.mp4".to_string()]))
            .await
            .unwrap();

        while !engine.scheduler().is_warm("https://cdn.test/a.mp4").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(engine.cache().contains("https://cdn.test/a.mp4").await);
        assert!(engine.prefetcher().is_prefetched("https://cdn.test/a.mp4").await);
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_and_speculative_share_cache() {
        let engine = engine_with(&["https://cdn.test/a.mp4", "https://cdn.test/b.mp4"]);
        let tasks = engine.start().unwrap();

        engine
            .prefetcher()
            .on_hover(&["https://cdn.test/b.mp4".to_string()])
            .await;
        let media = engine
            .scheduler()
            .ensure_warm("https://cdn.test/a.mp4")
            .await
            .unwrap();
        assert_eq!(media.media().byte_size(), 256);

        while !engine.scheduler().is_idle().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.cache().stats().await.entries, 2);
        assert!(!engine.scheduler().request("https://cdn.test/b.mp4", Priority::High).await);

        tasks.shutdown().await;
    }
}
