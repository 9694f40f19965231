//! Speculative preloading driven by UI signals
//!
//! Hover, focus, scroll and navigation events are turned into low-stakes
//! preload requests. Every URL the prefetcher issues goes into a ledger
//! that lives as long as the process, so a URL is speculatively requested
//! at most once. Explicit requests go straight to the scheduler and are
//! unaffected by the ledger.

use crate::preload::{PreloadScheduler, Priority, RequestOrigin};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Viewport position after a scroll, in layout units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollSignal {
    pub direction: ScrollDirection,
    pub viewport_start: f64,
    pub viewport_len: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchSignal {
    Hover(Vec<String>),
    Focus(Vec<String>),
    Scroll(ScrollSignal),
    RouteChange(String),
}

type RoutePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Media worth preloading when navigating to a matching route
pub struct RouteRule {
    name: String,
    predicate: RoutePredicate,
    candidates: Vec<String>,
    priority: Priority,
}

impl RouteRule {
    pub fn new<F>(name: &str, predicate: F, candidates: Vec<String>, priority: Priority) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            predicate: Box::new(predicate),
            candidates,
            priority,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, route: &str) -> bool {
        (self.predicate)(route)
    }
}

impl fmt::Debug for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRule")
            .field("name", &self.name)
            .field("candidates", &self.candidates)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A media element's position in the scrollable layout
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackedElement {
    offset: f64,
    extent: f64,
}

pub struct AnticipatoryPrefetcher {
    scheduler: PreloadScheduler,
    ledger: Mutex<HashSet<String>>,
    tracked: Mutex<HashMap<String, TrackedElement>>,
    rules: Mutex<Vec<RouteRule>>,
    scroll_margin: f64,
}

impl AnticipatoryPrefetcher {
    pub fn new(scheduler: PreloadScheduler, scroll_margin: f64) -> Self {
        Self {
            scheduler,
            ledger: Mutex::new(HashSet::new()),
            tracked: Mutex::new(HashMap::new()),
            rules: Mutex::new(Vec::new()),
            scroll_margin: scroll_margin.max(0.0),
        }
    }

    /// Apply one signal, returning the URLs newly sent to the scheduler
    pub async fn handle(&self, signal: PrefetchSignal) -> Vec<String> {
        match signal {
            PrefetchSignal::Hover(urls) | PrefetchSignal::Focus(urls) => {
                self.issue(urls, Priority::High).await
            }
            PrefetchSignal::Scroll(scroll) => self.on_scroll(scroll).await,
            PrefetchSignal::RouteChange(route) => self.on_route_change(&route).await,
        }
    }

    pub async fn on_hover(&self, urls: &[String]) -> Vec<String> {
        self.issue(urls.to_vec(), Priority::High).await
    }

    pub async fn on_focus(&self, urls: &[String]) -> Vec<String> {
        self.issue(urls.to_vec(), Priority::High).await
    }

    /// Request tracked elements within `scroll_margin` of the viewport in
    /// the scroll direction
    pub async fn on_scroll(&self, scroll: ScrollSignal) -> Vec<String> {
        let viewport_end = scroll.viewport_start + scroll.viewport_len.max(0.0);
        let (lookahead_start, lookahead_end) = match scroll.direction {
            ScrollDirection::Down => (scroll.viewport_start, viewport_end + self.scroll_margin),
            ScrollDirection::Up => (scroll.viewport_start - self.scroll_margin, viewport_end),
        };

        let mut nearby: Vec<(f64, String)> = self
            .tracked
            .lock()
            .await
            .iter()
            .filter(|(_, el)| el.offset < lookahead_end && el.offset + el.extent > lookahead_start)
            .map(|(url, el)| (el.offset, url.clone()))
            .collect();

        // Closest to the direction of travel first
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        if scroll.direction == ScrollDirection::Up {
            nearby.reverse();
        }

        let urls = nearby.into_iter().map(|(_, url)| url).collect();
        self.issue(urls, Priority::Medium).await
    }

    pub async fn on_route_change(&self, route: &str) -> Vec<String> {
        let matched: Vec<(Vec<String>, Priority)> = self
            .rules
            .lock()
            .await
            .iter()
            .filter(|rule| rule.matches(route))
            .map(|rule| {
                debug!(route, rule = %rule.name, "Route rule matched");
                (rule.candidates.clone(), rule.priority)
            })
            .collect();

        let mut issued = Vec::new();
        for (candidates, priority) in matched {
            issued.extend(self.issue(candidates, priority).await);
        }
        issued
    }

    /// Make an element known for scroll proximity checks
    pub async fn track(&self, url: &str, offset: f64, extent: f64) {
        self.tracked.lock().await.insert(
            url.to_string(),
            TrackedElement {
                offset,
                extent: extent.max(0.0),
            },
        );
    }

    pub async fn untrack(&self, url: &str) -> bool {
        self.tracked.lock().await.remove(url).is_some()
    }

    pub async fn add_route_rule(&self, rule: RouteRule) {
        self.rules.lock().await.push(rule);
    }

    pub async fn is_prefetched(&self, url: &str) -> bool {
        self.ledger.lock().await.contains(url)
    }

    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    async fn issue(&self, urls: Vec<String>, priority: Priority) -> Vec<String> {
        let fresh: Vec<String> = {
            let mut ledger = self.ledger.lock().await;
            urls.into_iter()
                .filter(|url| ledger.insert(url.clone()))
                .collect()
        };

        for url in &fresh {
            self.scheduler
                .request_with_origin(url, priority, RequestOrigin::Speculative)
                .await;
        }

        if !fresh.is_empty() {
            debug!(count = fresh.len(), ?priority, "Issued speculative preloads");
        }
        fresh
    }

    /// Consume signals until the channel closes or `shutdown` flips to true
    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<PrefetchSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Prefetcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        self.handle(signal).await;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Prefetcher stopped");
    }
}
