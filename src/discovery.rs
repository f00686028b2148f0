//! Periodic live-match discovery.
//!
//! Each cycle picks the first N live matches in the origin's own order,
//! publishes the selection to the fast tier and hands it to the
//! subscription manager.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{keys, TieredCache};
use crate::models::{EventStatus, EventSummary, SelectionSet};
use crate::origin::OriginClient;
use crate::subscriptions::SubscriptionManager;

pub const DEFAULT_SELECTION_SIZE: usize = 5;
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);

/// First `n` distinct live keys, upstream order preserved.
pub fn select_live(candidates: &[EventSummary], n: usize) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(n);
    for event in candidates {
        if keys.len() >= n {
            break;
        }
        if event.status == EventStatus::Live && !keys.contains(&event.key) {
            keys.push(event.key.clone());
        }
    }
    keys
}

pub struct Discovery {
    origin: Arc<dyn OriginClient>,
    cache: TieredCache,
    subscriptions: Arc<SubscriptionManager>,
    selection: ArcSwap<SelectionSet>,
    size: usize,
    interval: Duration,
}

impl Discovery {
    pub fn new(
        origin: Arc<dyn OriginClient>,
        cache: TieredCache,
        subscriptions: Arc<SubscriptionManager>,
        size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            origin,
            cache,
            subscriptions,
            selection: ArcSwap::from_pointee(SelectionSet::default()),
            size,
            interval,
        }
    }

    /// Selection from the last successful cycle.
    pub fn current(&self) -> Arc<SelectionSet> {
        self.selection.load_full()
    }

    /// Kept in the fast tier across a couple of missed cycles.
    fn selection_ttl(&self) -> Duration {
        self.interval.saturating_mul(3)
    }

    /// Runs one cycle. Returns `None` when the origin call failed and the
    /// previous selection was kept.
    pub async fn run_cycle(&self) -> Option<Arc<SelectionSet>> {
        let candidates = match self.origin.list_candidate_events().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "discovery skipped, keeping previous selection");
                return None;
            }
        };

        let keys = select_live(&candidates, self.size);
        let selection = Arc::new(SelectionSet::new(keys, chrono::Utc::now().timestamp()));

        let previous = self.selection.swap(selection.clone());
        if previous.keys != selection.keys {
            info!(
                "🎯 Selection changed: {:?} -> {:?} ({} candidates)",
                previous.keys,
                selection.keys,
                candidates.len()
            );
        } else {
            debug!(selected = selection.len(), "selection unchanged");
        }

        self.cache
            .set_json(keys::SELECTION, selection.as_ref(), self.selection_ttl())
            .await;
        self.subscriptions.apply_selection(&selection).await;
        Some(selection)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "🔭 Discovery loop started (every {}s, top {})",
            self.interval.as_secs(),
            self.size
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Discovery loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // An in-flight cycle is abandoned on shutdown.
                    let cancelled = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = self.run_cycle() => false,
                    };
                    if cancelled {
                        info!("Discovery cycle cancelled");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryFastStore;
    use crate::error::OriginError;
    use crate::origin::{EventDetails, OriginResult};
    use crate::subscriptions::PollRegistrar;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn summary(key: &str, status: EventStatus) -> EventSummary {
        EventSummary {
            key: key.to_string(),
            status,
            name: None,
            start_at: None,
        }
    }

    struct ListOrigin {
        list: Mutex<OriginResult<Vec<EventSummary>>>,
    }

    #[async_trait]
    impl OriginClient for ListOrigin {
        async fn list_candidate_events(&self) -> OriginResult<Vec<EventSummary>> {
            self.list.lock().clone()
        }
        async fn get_event_details(&self, _key: &str) -> OriginResult<EventDetails> {
            Err(OriginError::NotFound)
        }
        async fn subscribe(&self, _key: &str) -> OriginResult<()> {
            Ok(())
        }
        async fn unsubscribe(&self, _key: &str) -> OriginResult<()> {
            Ok(())
        }
    }

    fn discovery(
        list: OriginResult<Vec<EventSummary>>,
    ) -> (Discovery, Arc<ListOrigin>, Arc<PollRegistrar>, TieredCache) {
        let origin = Arc::new(ListOrigin {
            list: Mutex::new(list),
        });
        let registrar = Arc::new(PollRegistrar::new());
        let subscriptions = Arc::new(SubscriptionManager::new(registrar.clone()));
        let cache = TieredCache::new(Arc::new(MemoryFastStore::default()));
        let d = Discovery::new(
            origin.clone(),
            cache.clone(),
            subscriptions,
            DEFAULT_SELECTION_SIZE,
            DEFAULT_DISCOVERY_INTERVAL,
        );
        (d, origin, registrar, cache)
    }

    #[test]
    fn test_select_live_keeps_upstream_order() {
        let candidates: Vec<_> = ["g", "c", "a", "f", "b", "e", "d"]
            .iter()
            .map(|k| summary(k, EventStatus::Live))
            .collect();
        assert_eq!(select_live(&candidates, 5), vec!["g", "c", "a", "f", "b"]);
    }

    #[test]
    fn test_select_live_filters_and_dedups() {
        let candidates = vec![
            summary("a", EventStatus::Completed),
            summary("b", EventStatus::Live),
            summary("c", EventStatus::NotStarted),
            summary("b", EventStatus::Live),
            summary("d", EventStatus::Live),
        ];
        assert_eq!(select_live(&candidates, 5), vec!["b", "d"]);
        assert!(select_live(&[], 5).is_empty());
    }

    #[tokio::test]
    async fn test_cycle_publishes_selection() {
        let (d, _origin, registrar, cache) = discovery(Ok(vec![
            summary("a", EventStatus::Live),
            summary("b", EventStatus::Live),
        ]));
        let selection = d.run_cycle().await.unwrap();
        assert_eq!(selection.keys, vec!["a", "b"]);
        assert_eq!(registrar.watched(), vec!["a", "b"]);

        let cached: SelectionSet = cache.get_json(keys::SELECTION).await.unwrap();
        assert_eq!(cached.keys, vec!["a", "b"]);
        assert_eq!(d.current().keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_origin_failure_keeps_previous_selection() {
        let (d, origin, registrar, _cache) =
            discovery(Ok(vec![summary("a", EventStatus::Live)]));
        d.run_cycle().await.unwrap();

        *origin.list.lock() = Err(OriginError::unavailable("rate limited"));
        assert!(d.run_cycle().await.is_none());
        assert_eq!(d.current().keys, vec!["a"]);
        assert_eq!(registrar.watched(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_list_unsubscribes_everything() {
        let (d, origin, registrar, _cache) =
            discovery(Ok(vec![summary("a", EventStatus::Live)]));
        d.run_cycle().await.unwrap();

        *origin.list.lock() = Ok(Vec::new());
        let selection = d.run_cycle().await.unwrap();
        assert!(selection.is_empty());
        assert!(registrar.watched().is_empty());
    }
}
