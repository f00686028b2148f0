//! Registration capabilities injected into `SubscriptionManager`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::SubscriptionMode;
use crate::origin::{OriginClient, OriginResult};

#[async_trait]
pub trait PushRegistrar: Send + Sync {
    async fn register(&self, key: &str) -> OriginResult<()>;

    async fn unregister(&self, key: &str) -> OriginResult<()>;

    fn mode(&self) -> SubscriptionMode;
}

/// Webhook registration at the origin.
pub struct OriginPushRegistrar {
    origin: Arc<dyn OriginClient>,
}

impl OriginPushRegistrar {
    pub fn new(origin: Arc<dyn OriginClient>) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl PushRegistrar for OriginPushRegistrar {
    async fn register(&self, key: &str) -> OriginResult<()> {
        self.origin.subscribe(key).await
    }

    async fn unregister(&self, key: &str) -> OriginResult<()> {
        self.origin.unsubscribe(key).await
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Push
    }
}

/// In-process watch set read by `LivePoller`. Registration never fails.
#[derive(Default)]
pub struct PollRegistrar {
    watched: RwLock<BTreeSet<String>>,
}

impl PollRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched(&self) -> Vec<String> {
        self.watched.read().iter().cloned().collect()
    }

    pub fn is_watched(&self, key: &str) -> bool {
        self.watched.read().contains(key)
    }

    /// Stops polling a match that reached a final state.
    pub fn retire(&self, key: &str) -> bool {
        let removed = self.watched.write().remove(key);
        if removed {
            debug!(event_key = %key, "retired from poll set");
        }
        removed
    }
}

#[async_trait]
impl PushRegistrar for PollRegistrar {
    async fn register(&self, key: &str) -> OriginResult<()> {
        self.watched.write().insert(key.to_string());
        Ok(())
    }

    async fn unregister(&self, key: &str) -> OriginResult<()> {
        self.watched.write().remove(key);
        Ok(())
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_registrar_tracks_watch_set() {
        let reg = PollRegistrar::new();
        reg.register("b").await.unwrap();
        reg.register("a").await.unwrap();
        reg.register("a").await.unwrap();
        assert_eq!(reg.watched(), vec!["a", "b"]);

        reg.unregister("a").await.unwrap();
        assert!(!reg.is_watched("a"));
        assert!(reg.retire("b"));
        assert!(!reg.retire("b"));
        assert!(reg.watched().is_empty());
    }
}
