//! Bounded set of playable-ready resources

use media_blob_cache::{MediaHandle, ReleaseSignal};
use std::collections::HashMap;

/// A warmed resource ready to hand to a video element.
///
/// Released when it falls out of the warm set; the underlying cache bytes
/// are managed separately by the blob cache.
#[derive(Debug, Clone)]
pub struct PlayableMedia {
    media: MediaHandle,
    release: ReleaseSignal,
}

impl PlayableMedia {
    pub fn new(media: MediaHandle) -> Self {
        Self {
            media,
            release: ReleaseSignal::new(),
        }
    }

    pub fn url(&self) -> &str {
        self.media.url()
    }

    pub fn media(&self) -> &MediaHandle {
        &self.media
    }

    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }

    pub async fn released(&self) {
        self.release.released().await
    }

    fn release(&self) {
        self.release.release();
    }
}

/// URL → playable resource, capped at `capacity` and evicting the
/// least-recently-warmed entry first
#[derive(Debug)]
pub struct WarmSet {
    capacity: usize,
    entries: HashMap<String, (u64, PlayableMedia)>,
    clock: u64,
}

impl WarmSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Lookups do not count as warming, so they leave eviction order alone
    pub fn get(&self, url: &str) -> Option<&PlayableMedia> {
        self.entries.get(url).map(|(_, media)| media)
    }

    /// Insert a freshly warmed resource, returning whatever was evicted
    pub fn insert(&mut self, media: PlayableMedia) -> Vec<PlayableMedia> {
        let mut evicted = Vec::new();

        if let Some(previous) = self.remove(media.url()) {
            evicted.push(previous);
        }

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (warmed_at, _))| *warmed_at)
                .map(|(url, _)| url.clone());

            let Some(url) = oldest else { break };
            if let Some(media) = self.remove(&url) {
                evicted.push(media);
            }
        }

        self.clock += 1;
        self.entries
            .insert(media.url().to_string(), (self.clock, media));

        evicted
    }

    pub fn remove(&mut self, url: &str) -> Option<PlayableMedia> {
        let (_, media) = self.entries.remove(url)?;
        media.release();
        Some(media)
    }

    /// URLs from least to most recently warmed
    pub fn urls(&self) -> Vec<String> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(url, (warmed_at, _))| (*warmed_at, url.clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, url)| url).collect()
    }

    pub fn clear(&mut self) {
        for (_, (_, media)) in self.entries.drain() {
            media.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_blob_cache::testing::StaticSource;
    use media_blob_cache::BlobCache;
    use std::sync::Arc;
    use std::time::Duration;

    async fn playable(cache: &BlobCache, url: &str) -> PlayableMedia {
        PlayableMedia::new(cache.fetch_and_cache(url).await.unwrap())
    }

    fn cache_with(urls: &[&str]) -> BlobCache {
        let source = Arc::new(StaticSource::new());
        for url in urls {
            source.insert(url, 100);
        }
        BlobCache::new(source, 10_000, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_warmed() {
        let cache = cache_with(&["u1", "u2", "u3"]);
        let mut warm = WarmSet::new(2);

        let u1 = playable(&cache, "u1").await;
        assert!(warm.insert(u1.clone()).is_empty());
        assert!(warm.insert(playable(&cache, "u2").await).is_empty());

        let evicted = warm.insert(playable(&cache, "u3").await);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].url(), "u1");
        assert!(u1.is_released());

        assert_eq!(warm.urls(), vec!["u2".to_string(), "u3".to_string()]);
        // Warm-set eviction leaves the cached bytes alone
        assert!(cache.contains("u1").await);
    }

    #[tokio::test]
    async fn test_get_does_not_refresh_order() {
        let cache = cache_with(&["u1", "u2", "u3"]);
        let mut warm = WarmSet::new(2);

        warm.insert(playable(&cache, "u1").await);
        warm.insert(playable(&cache, "u2").await);
        assert!(warm.get("u1").is_some());

        let evicted = warm.insert(playable(&cache, "u3").await);
        assert_eq!(evicted[0].url(), "u1");
    }

    #[tokio::test]
    async fn test_rewarm_replaces_entry() {
        let cache = cache_with(&["u1", "u2"]);
        let mut warm = WarmSet::new(2);

        let first = playable(&cache, "u1").await;
        warm.insert(first.clone());
        warm.insert(playable(&cache, "u2").await);

        let evicted = warm.insert(playable(&cache, "u1").await);
        assert_eq!(evicted.len(), 1);
        assert!(first.is_released());
        assert_eq!(warm.len(), 2);
        assert_eq!(warm.urls(), vec!["u2".to_string(), "u1".to_string()]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let warm = WarmSet::new(0);
        assert_eq!(warm.capacity(), 1);
        assert!(warm.is_empty());
    }

    #[tokio::test]
    async fn test_clear_releases_everything() {
        let cache = cache_with(&["u1"]);
        let mut warm = WarmSet::new(4);
        let u1 = playable(&cache, "u1").await;
        warm.insert(u1.clone());

        warm.clear();
        assert!(warm.is_empty());
        assert!(u1.is_released());
    }
}
