//! Wires the pipeline components together.
//!
//! `LiveFeed` owns one instance of every service and hands out the shared
//! `AppState` for the HTTP layer. Background loops are started separately
//! so tests can drive cycles by hand.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::AppState;
use crate::cache::{MemoryFastStore, TieredCache};
use crate::config::FeedSettings;
use crate::discovery::Discovery;
use crate::hub::FanOutHub;
use crate::ingestion::IngestionService;
use crate::live_data::LiveDataService;
use crate::origin::OriginClient;
use crate::store::DurableStore;
use crate::subscriptions::{
    LivePoller, OriginPushRegistrar, PollRegistrar, PushRegistrar, SubscriptionManager,
    SubscriptionMode,
};
use crate::writer::UpdateWriter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct LiveFeed {
    pub settings: FeedSettings,
    pub fast: Arc<MemoryFastStore>,
    pub cache: TieredCache,
    pub writer: UpdateWriter,
    pub hub: Arc<FanOutHub>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub discovery: Arc<Discovery>,
    pub ingestion: Arc<IngestionService>,
    pub live_data: Arc<LiveDataService>,
    /// Present in poll mode only.
    pub poller: Option<Arc<LivePoller>>,
}

impl LiveFeed {
    pub fn new(
        settings: FeedSettings,
        origin: Arc<dyn OriginClient>,
        store: Arc<dyn DurableStore>,
        fast: Arc<MemoryFastStore>,
    ) -> Self {
        let cache = TieredCache::new(fast.clone());
        let writer = UpdateWriter::new(cache.clone(), store.clone(), settings.ttl);
        let hub = Arc::new(FanOutHub::new());

        let (registrar, poller): (Arc<dyn PushRegistrar>, Option<Arc<LivePoller>>) =
            match settings.mode {
                SubscriptionMode::Push => {
                    let push: Arc<dyn PushRegistrar> =
                        Arc::new(OriginPushRegistrar::new(origin.clone()));
                    (push, None)
                }
                SubscriptionMode::Poll => {
                    let watch = Arc::new(PollRegistrar::new());
                    let poller = LivePoller::new(
                        watch.clone(),
                        origin.clone(),
                        writer.clone(),
                        hub.clone(),
                        settings.poll_interval,
                    );
                    let registrar: Arc<dyn PushRegistrar> = watch;
                    (registrar, Some(Arc::new(poller)))
                }
            };

        let subscriptions = Arc::new(SubscriptionManager::new(registrar));
        let discovery = Arc::new(Discovery::new(
            origin.clone(),
            cache.clone(),
            subscriptions.clone(),
            settings.selection_size,
            settings.discovery_interval,
        ));
        let ingestion = Arc::new(IngestionService::new(
            settings.webhook_secret.clone(),
            writer.clone(),
            hub.clone(),
        ));
        let live_data = Arc::new(LiveDataService::new(
            cache.clone(),
            store,
            origin,
            writer.clone(),
        ));

        Self {
            settings,
            fast,
            cache,
            writer,
            hub,
            subscriptions,
            discovery,
            ingestion,
            live_data,
            poller,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            ingestion: self.ingestion.clone(),
            live_data: self.live_data.clone(),
            hub: self.hub.clone(),
            cache: self.cache.clone(),
            discovery: self.discovery.clone(),
            subscriptions: self.subscriptions.clone(),
            secret_header: self.settings.webhook_secret_header.clone(),
        }
    }

    /// Starts discovery, the poller (poll mode) and the fast-tier sweep.
    pub fn spawn_background(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![tokio::spawn(
            self.discovery.clone().run(cancel.child_token()),
        )];
        if let Some(poller) = &self.poller {
            handles.push(tokio::spawn(poller.clone().run(cancel.child_token())));
        }
        handles.push(tokio::spawn(purge_loop(
            self.fast.clone(),
            PURGE_INTERVAL,
            cancel.child_token(),
        )));
        handles
    }

    /// Unregisters every tracked match at the origin.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.subscriptions.shutdown(timeout).await
    }
}

async fn purge_loop(fast: Arc<MemoryFastStore>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Fast-tier sweep shutting down");
                break;
            }
            _ = ticker.tick() => {
                let purged = fast.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = fast.len(), "expired cache entries purged");
                }
            }
        }
    }
}
