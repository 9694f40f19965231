//! Observ.ing media engine
//!
//! Client-side media acquisition and playback coordination for the video
//! feed: a byte-bounded blob cache, a priority preloader with a bounded warm
//! set, a single-active-playback controller, and a signal-driven prefetcher.

pub mod config;
pub mod engine;
pub mod error;
pub mod playback;
pub mod prefetch;
pub mod preload;
pub mod warm_set;

pub use config::{EngineConfig, PreloadWindow};
pub use engine::{EngineTasks, MediaEngine};
pub use error::{EngineError, PlaybackError, Result};
pub use playback::{PlaybackController, PlaybackState, PlaybackTarget};
pub use prefetch::{AnticipatoryPrefetcher, PrefetchSignal, RouteRule, ScrollDirection, ScrollSignal};
pub use preload::{PreloadQueueItem, PreloadScheduler, Priority, RequestOrigin, WarmOutcome};
pub use warm_set::{PlayableMedia, WarmSet};
