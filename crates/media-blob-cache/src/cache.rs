//! In-memory blob storage with LRU eviction and fetch coalescing

use crate::error::{CacheError, FetchError, Result};
use crate::source::MediaSource;
use crate::types::{CacheStats, FetchedMedia, MediaHandle, ReleaseSignal};
use chrono::{DateTime, Utc};
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type FetchChannel = Shared<oneshot::Receiver<Result<MediaHandle>>>;

/// A cached blob and its bookkeeping
#[derive(Debug)]
struct CacheEntry {
    media: FetchedMedia,
    byte_size: u64,
    /// Logical clock tick of the most recent insert or read
    last_access: u64,
    fetched_at: DateTime<Utc>,
    release: ReleaseSignal,
}

impl CacheEntry {
    fn handle(&self, url: &str) -> MediaHandle {
        MediaHandle::cached(url, &self.media, self.release.clone())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, url: &str) -> Option<MediaHandle> {
        let tick = self.tick();
        let entry = self.entries.get_mut(url)?;
        entry.last_access = tick;
        Some(entry.handle(url))
    }

    fn remove(&mut self, url: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(url)?;
        self.total_bytes -= entry.byte_size;
        entry.release.release();
        Some(entry)
    }

    /// Evict least-recently-used entries until `incoming` more bytes fit
    fn make_room(&mut self, incoming: u64, budget: u64) -> Vec<(String, u64)> {
        let mut evicted = Vec::new();

        while self.total_bytes + incoming > budget {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());

            let Some(url) = oldest else { break };
            if let Some(entry) = self.remove(&url) {
                evicted.push((url, entry.byte_size));
            }
        }

        evicted
    }
}

struct Inner {
    source: Arc<dyn MediaSource>,
    state: Mutex<CacheState>,
    /// Fetches currently on the wire, shared with concurrent callers
    in_flight: Mutex<HashMap<String, FetchChannel>>,
    byte_budget: u64,
    fetch_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced: AtomicU64,
}

/// A byte-bounded media cache keyed by URL.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct BlobCache {
    inner: Arc<Inner>,
}

impl BlobCache {
    /// Create a new blob cache backed by `source`
    pub fn new(source: Arc<dyn MediaSource>, byte_budget: u64, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                state: Mutex::new(CacheState::default()),
                in_flight: Mutex::new(HashMap::new()),
                byte_budget,
                fetch_timeout,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    pub fn source(&self) -> &Arc<dyn MediaSource> {
        &self.inner.source
    }

    pub fn byte_budget(&self) -> u64 {
        self.inner.byte_budget
    }

    /// Return the cached entry for `url`, fetching and storing it on a miss.
    ///
    /// Concurrent calls for the same uncached URL share one fetch. Items
    /// larger than the whole budget come back as uncached handles.
    pub async fn fetch_and_cache(&self, url: &str) -> Result<MediaHandle> {
        let channel = {
            // Holding the in-flight map across the lookup means a finishing
            // fetch is either still in the map or already in the entries.
            let mut in_flight = self.inner.in_flight.lock().await;

            if let Some(handle) = self.lookup(url).await {
                return Ok(handle);
            }

            match in_flight.get(url) {
                Some(channel) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(url, "Joined in-flight fetch");
                    channel.clone()
                }
                None => {
                    let channel = self.spawn_fetch(url);
                    in_flight.insert(url.to_string(), channel.clone());
                    channel
                }
            }
        };

        channel.await.unwrap_or_else(|_cancelled| {
            Err(FetchError::NetworkFailure(format!(
                "fetch task for {} was dropped",
                url
            )))
        })
    }

    /// Run the fetch as its own task so it completes even if every caller
    /// stops waiting.
    fn spawn_fetch(&self, url: &str) -> FetchChannel {
        let (sender, receiver) = oneshot::channel();
        let cache = self.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let result = cache.fetch_uncoalesced(&url).await;
            cache.inner.in_flight.lock().await.remove(&url);
            sender.send(result).ok();
        });

        receiver.shared()
    }

    async fn fetch_uncoalesced(&self, url: &str) -> Result<MediaHandle> {
        debug!(url, "Fetching media");

        let fetched = tokio::time::timeout(self.inner.fetch_timeout, self.inner.source.fetch(url))
            .await
            .map_err(FetchError::from)
            .and_then(|result| result);

        let media = match fetched {
            Ok(media) => media,
            Err(e) => {
                debug!(url, error = %e, "Fetch failed, nothing cached");
                return Err(e);
            }
        };

        match self.put(url, media.clone()).await {
            Ok(handle) => Ok(handle),
            Err(CacheError::ItemTooLarge { size, budget }) => {
                warn!(url, size, budget, "Media exceeds cache budget, returning uncached");
                Ok(MediaHandle::uncached(url, media))
            }
        }
    }

    /// Non-blocking lookup; refreshes recency on a hit
    pub async fn get(&self, url: &str) -> Option<MediaHandle> {
        self.lookup(url).await
    }

    async fn lookup(&self, url: &str) -> Option<MediaHandle> {
        let handle = self.inner.state.lock().await.touch(url);

        if handle.is_some() {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(url, "Cache hit");
        } else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
        }

        handle
    }

    /// Store a blob, evicting least-recently-used entries to make room
    pub async fn put(
        &self,
        url: &str,
        media: FetchedMedia,
    ) -> std::result::Result<MediaHandle, CacheError> {
        let size = media.payload.len() as u64;
        let budget = self.inner.byte_budget;

        if size > budget {
            return Err(CacheError::ItemTooLarge { size, budget });
        }

        let mut state = self.inner.state.lock().await;

        // A re-fetch replaces the old entry rather than adding to it
        state.remove(url);

        let evicted = state.make_room(size, budget);
        if !evicted.is_empty() {
            let freed: u64 = evicted.iter().map(|(_, size)| size).sum();
            self.inner
                .evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!(url, evicted = evicted.len(), freed, "Evicted least recently used entries");
        }

        let entry = CacheEntry {
            media,
            byte_size: size,
            last_access: state.tick(),
            fetched_at: Utc::now(),
            release: ReleaseSignal::new(),
        };
        let handle = entry.handle(url);

        state.entries.insert(url.to_string(), entry);
        state.total_bytes += size;

        debug_assert_eq!(
            state.total_bytes,
            state.entries.values().map(|e| e.byte_size).sum::<u64>()
        );
        debug!(url, size, total = state.total_bytes, "Cached media");

        Ok(handle)
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.inner.state.lock().await.entries.contains_key(url)
    }

    /// Drop a single entry, releasing its handles
    pub async fn remove(&self, url: &str) -> bool {
        self.inner.state.lock().await.remove(url).is_some()
    }

    /// Release every entry and reset the byte count
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        let entries = state.entries.len();
        let bytes = state.total_bytes;

        for (_, entry) in state.entries.drain() {
            entry.release.release();
        }
        state.total_bytes = 0;

        info!(entries, bytes, "Cache cleared");
    }

    pub async fn total_bytes(&self) -> u64 {
        self.inner.state.lock().await.total_bytes
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            total_size: state.total_bytes,
            byte_budget: self.inner.byte_budget,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            oldest_entry: state.entries.values().map(|e| e.fetched_at).min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSource;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn cache_with(source: &Arc<StaticSource>, budget: u64) -> BlobCache {
        BlobCache::new(source.clone(), budget, TIMEOUT)
    }

    #[tokio::test]
    async fn test_fetch_then_get() {
        let source = Arc::new(StaticSource::new());
        source.insert("https://cdn.test/a.mp4", 100);
        let cache = cache_with(&source, 1000);

        let handle = cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        assert!(handle.is_cached());
        assert_eq!(handle.byte_size(), 100);
        assert_eq!(handle.content_type(), "video/mp4");

        let again = cache.get("https://cdn.test/a.mp4").await;
        assert!(again.is_some());

        // Second fetch is served from memory
        cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        assert_eq!(source.fetch_count("https://cdn.test/a.mp4"), 1);
    }

    #[tokio::test]
    async fn test_get_does_not_fetch() {
        let source = Arc::new(StaticSource::new());
        source.insert("https://cdn.test/a.mp4", 100);
        let cache = cache_with(&source, 1000);

        assert!(cache.get("https://cdn.test/a.mp4").await.is_none());
        assert_eq!(source.total_fetches(), 0);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_oldest_entry_evicted_first() {
        let source = Arc::new(StaticSource::new());
        for name in ["a", "b", "c"] {
            source.insert(&format!("https://cdn.test/{name}.mp4"), 400);
        }
        let cache = cache_with(&source, 1000);

        let a = cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        cache.fetch_and_cache("https://cdn.test/b.mp4").await.unwrap();
        cache.fetch_and_cache("https://cdn.test/c.mp4").await.unwrap();

        assert!(!cache.contains("https://cdn.test/a.mp4").await);
        assert!(cache.contains("https://cdn.test/b.mp4").await);
        assert!(cache.contains("https://cdn.test/c.mp4").await);
        assert_eq!(cache.total_bytes().await, 800);
        assert!(a.is_released());
    }

    #[tokio::test]
    async fn test_read_refreshes_recency() {
        let source = Arc::new(StaticSource::new());
        for name in ["a", "b", "c"] {
            source.insert(&format!("https://cdn.test/{name}.mp4"), 400);
        }
        let cache = cache_with(&source, 1000);

        cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        cache.fetch_and_cache("https://cdn.test/b.mp4").await.unwrap();
        cache.get("https://cdn.test/a.mp4").await.unwrap();
        cache.fetch_and_cache("https://cdn.test/c.mp4").await.unwrap();

        assert!(cache.contains("https://cdn.test/a.mp4").await);
        assert!(!cache.contains("https://cdn.test/b.mp4").await);
    }

    #[tokio::test]
    async fn test_eviction_is_minimal() {
        let source = Arc::new(StaticSource::new());
        for name in ["a", "b", "c"] {
            source.insert(&format!("https://cdn.test/{name}.mp4"), 300);
        }
        source.insert("https://cdn.test/d.mp4", 250);
        let cache = cache_with(&source, 1000);

        for name in ["a", "b", "c", "d"] {
            cache
                .fetch_and_cache(&format!("https://cdn.test/{name}.mp4"))
                .await
                .unwrap();
        }

        // 900 + 250 needs 150 freed: only `a` goes
        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.total_size, 850);
        assert!(!cache.contains("https://cdn.test/a.mp4").await);
    }

    #[tokio::test]
    async fn test_budget_holds_after_every_insert() {
        let source = Arc::new(StaticSource::new());
        let sizes = [120usize, 700, 50, 999, 1, 430, 430, 430, 1000, 64];
        for (i, size) in sizes.iter().enumerate() {
            source.insert(&format!("https://cdn.test/{i}.mp4"), *size);
        }
        let cache = cache_with(&source, 1000);

        for i in 0..sizes.len() {
            cache
                .fetch_and_cache(&format!("https://cdn.test/{i}.mp4"))
                .await
                .unwrap();
            assert!(cache.total_bytes().await <= 1000);
        }
    }

    #[tokio::test]
    async fn test_item_larger_than_budget_is_not_cached() {
        let source = Arc::new(StaticSource::new());
        source.insert("https://cdn.test/small.mp4", 200);
        source.insert("https://cdn.test/huge.mp4", 5000);
        let cache = cache_with(&source, 1000);

        cache.fetch_and_cache("https://cdn.test/small.mp4").await.unwrap();
        let huge = cache.fetch_and_cache("https://cdn.test/huge.mp4").await.unwrap();

        assert!(!huge.is_cached());
        assert_eq!(huge.byte_size(), 5000);
        assert!(!cache.contains("https://cdn.test/huge.mp4").await);
        // Nothing was evicted to make room for it
        assert!(cache.contains("https://cdn.test/small.mp4").await);
        assert_eq!(cache.total_bytes().await, 200);
    }

    #[tokio::test]
    async fn test_put_rejects_item_too_large() {
        let cache = cache_with(&Arc::new(StaticSource::new()), 10);
        let result = cache
            .put("https://cdn.test/a.mp4", FetchedMedia::new(vec![0u8; 11], "video/mp4"))
            .await;
        assert_eq!(
            result.unwrap_err(),
            CacheError::ItemTooLarge {
                size: 11,
                budget: 10
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_caches_nothing() {
        let source = Arc::new(StaticSource::new());
        source.fail(
            "https://cdn.test/broken.mp4",
            FetchError::NetworkFailure("connection refused".to_string()),
        );
        let cache = cache_with(&source, 1000);

        let err = cache
            .fetch_and_cache("https://cdn.test/broken.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NetworkFailure(_)));
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_coalesced() {
        let source = Arc::new(StaticSource::with_latency(Duration::from_millis(200)));
        source.insert("https://cdn.test/a.mp4", 100);
        let cache = cache_with(&source, 1000);

        let (first, second) = tokio::join!(
            cache.fetch_and_cache("https://cdn.test/a.mp4"),
            cache.fetch_and_cache("https://cdn.test/a.mp4"),
        );

        assert_eq!(first.unwrap().byte_size(), 100);
        assert_eq!(second.unwrap().byte_size(), 100);
        assert_eq!(source.fetch_count("https://cdn.test/a.mp4"), 1);
        assert_eq!(cache.stats().await.coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_failure_reaches_every_caller() {
        let source = Arc::new(StaticSource::with_latency(Duration::from_millis(200)));
        let cache = cache_with(&source, 1000);

        let (first, second) = tokio::join!(
            cache.fetch_and_cache("https://cdn.test/missing.mp4"),
            cache.fetch_and_cache("https://cdn.test/missing.mp4"),
        );

        let first = first.unwrap_err();
        assert!(matches!(first, FetchError::NetworkFailure(_)));
        assert_eq!(first, second.unwrap_err());
        assert_eq!(source.total_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let source = Arc::new(StaticSource::with_latency(Duration::from_secs(30)));
        source.insert("https://cdn.test/slow.mp4", 100);
        let cache = BlobCache::new(source, 1000, Duration::from_secs(1));

        let err = cache
            .fetch_and_cache("https://cdn.test/slow.mp4")
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
        assert!(!cache.contains("https://cdn.test/slow.mp4").await);
    }

    #[tokio::test]
    async fn test_clear_releases_handles() {
        let source = Arc::new(StaticSource::new());
        source.insert("https://cdn.test/a.mp4", 100);
        source.insert("https://cdn.test/b.mp4", 100);
        let cache = cache_with(&source, 1000);

        let a = cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        let b = cache.fetch_and_cache("https://cdn.test/b.mp4").await.unwrap();

        cache.clear().await;

        assert!(a.is_released());
        assert!(b.is_released());
        b.released().await;
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert!(stats.oldest_entry.is_none());
    }

    #[tokio::test]
    async fn test_remove_single_entry() {
        let source = Arc::new(StaticSource::new());
        source.insert("https://cdn.test/a.mp4", 100);
        let cache = cache_with(&source, 1000);

        let a = cache.fetch_and_cache("https://cdn.test/a.mp4").await.unwrap();
        assert!(cache.remove("https://cdn.test/a.mp4").await);
        assert!(!cache.remove("https://cdn.test/a.mp4").await);
        assert!(a.is_released());
        assert_eq!(cache.total_bytes().await, 0);
    }
}
