use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How many feed items around the current one get preloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadWindow {
    pub behind: usize,
    pub ahead: usize,
}

impl Default for PreloadWindow {
    fn default() -> Self {
        Self {
            behind: 1,
            ahead: 3,
        }
    }
}

/// Engine configuration, passed at construction time
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub byte_budget: u64,
    pub warm_set_capacity: usize,
    pub preload_window: PreloadWindow,
    pub warm_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Pause between drained queue items so other tasks get a turn
    pub drain_delay_ms: u64,
    /// Look-ahead distance for scroll proximity, in layout units
    pub scroll_margin: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            byte_budget: 100 * 1024 * 1024, // 100 MiB
            warm_set_capacity: 10,
            preload_window: PreloadWindow::default(),
            warm_timeout_ms: 10_000,
            fetch_timeout_ms: 10_000,
            drain_delay_ms: 50,
            scroll_margin: 800.0,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Parse configuration from environment variables, keeping defaults
    /// for anything unset or unparseable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            byte_budget: env_or("MEDIA_BYTE_BUDGET", defaults.byte_budget),
            warm_set_capacity: env_or("MEDIA_WARM_SET_CAPACITY", defaults.warm_set_capacity),
            preload_window: PreloadWindow {
                behind: env_or("MEDIA_PRELOAD_BEHIND", defaults.preload_window.behind),
                ahead: env_or("MEDIA_PRELOAD_AHEAD", defaults.preload_window.ahead),
            },
            warm_timeout_ms: env_or("MEDIA_WARM_TIMEOUT_MS", defaults.warm_timeout_ms),
            fetch_timeout_ms: env_or("MEDIA_FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms),
            drain_delay_ms: env_or("MEDIA_DRAIN_DELAY_MS", defaults.drain_delay_ms),
            scroll_margin: env_or("MEDIA_SCROLL_MARGIN", defaults.scroll_margin),
        }
    }

    pub fn warm_timeout(&self) -> Duration {
        Duration::from_millis(self.warm_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}
