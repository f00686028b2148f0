//! Tier A: fast ephemeral key-value store with per-entry TTL.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::FastStoreError;

pub type FastResult<T> = std::result::Result<T, FastStoreError>;

/// Longest lifetime any entry may have.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Backend contract for the fast tier. Callers go through `TieredCache`,
/// which turns every error into a miss.
#[async_trait]
pub trait FastStore: Send + Sync {
    async fn get(&self, key: &str) -> FastResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> FastResult<()>;

    async fn delete(&self, key: &str) -> FastResult<bool>;

    /// Remaining lifetime of a live entry.
    async fn ttl(&self, key: &str) -> FastResult<Option<Duration>>;
}

struct FastEntry {
    value: Value,
    expires_at: Instant,
}

impl FastEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process backend. Whole values are swapped under the write lock, so
/// concurrent `set`s on one key are last-write-wins with no torn reads.
pub struct MemoryFastStore {
    entries: RwLock<HashMap<String, FastEntry>>,
    max_entries: usize,
}

impl MemoryFastStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(max_entries.min(1024))),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Evicts the entry closest to expiry. Caller holds the write lock.
    fn evict_one(entries: &mut HashMap<String, FastEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone());
        if let Some(k) = victim {
            debug!(key = %k, "fast store full, evicting soonest-expiring entry");
            entries.remove(&k);
        }
    }
}

impl Default for MemoryFastStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn get(&self, key: &str) -> FastResult<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(e) if !e.is_expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: evict lazily.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> FastResult<()> {
        let expires_at = Instant::now()
            .checked_add(ttl.min(MAX_ENTRY_TTL))
            .ok_or_else(|| FastStoreError::InvalidTtl(ttl.as_secs()))?;
        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let now = Instant::now();
            entries.retain(|_, e| !e.is_expired(now));
            if entries.len() >= self.max_entries {
                Self::evict_one(&mut entries);
            }
        }
        entries.insert(key.to_string(), FastEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> FastResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn ttl(&self, key: &str) -> FastResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }
}
