//! Fail-soft wrapper over the fast tier.
//!
//! The fast tier is advisory: an unreachable backend reads as a miss and
//! writes report `false`, nothing is raised to the caller.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::fast_store::FastStore;

/// Well-known fast-tier keys.
pub mod keys {
    pub const SELECTION: &str = "selection:current";

    pub fn event(event_key: &str) -> String {
        format!("match:{}", event_key)
    }

    pub fn detailed(event_key: &str) -> String {
        format!("detailed:{}", event_key)
    }
}

#[derive(Clone)]
pub struct TieredCache {
    fast: Arc<dyn FastStore>,
}

impl TieredCache {
    pub fn new(fast: Arc<dyn FastStore>) -> Self {
        Self { fast }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.fast.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "fast cache get failed, treating as miss");
                None
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(key, error = %e, "fast cache entry has unexpected shape, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        match self.fast.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "fast cache set failed");
                false
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl).await,
            Err(e) => {
                warn!(key, error = %e, "failed to encode fast cache value");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.fast.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "fast cache delete failed");
                false
            }
        }
    }

    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.fast.ttl(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "fast cache ttl lookup failed");
            None
        })
    }

    /// Returns the cached value, or runs `compute` on a miss and caches its result.
    ///
    /// No cross-process exclusion: concurrent misses may each run `compute`,
    /// and the last writer wins. A failed `compute` caches nothing.
    pub async fn fetch_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_json::<T>(key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set_json(key, &value, ttl).await;
        Ok(value)
    }
}
