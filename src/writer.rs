//! Write-through of one match payload into both tiers.
//!
//! Shared by webhook ingestion, the live poller and the read path so the
//! terminal-write rule and TTL choice live in one place.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{keys, CacheHint, TieredCache, TtlPolicy};
use crate::models::{DetailedUpdate, EventDocument, EventStatus};
use crate::normalizer;
use crate::store::DurableStore;

#[derive(Debug)]
pub enum WriteOutcome {
    /// Tier A updated; `durable` completes when the background upsert lands.
    Applied {
        document: EventDocument,
        durable: JoinHandle<()>,
    },
    /// Non-terminal payload for a match already finished.
    IgnoredTerminal,
    /// Finished match re-delivered with an identical scorecard.
    AlreadyFinal,
}

impl WriteOutcome {
    pub fn detailed(&self) -> Option<&DetailedUpdate> {
        match self {
            WriteOutcome::Applied { document, .. } => Some(&document.detailed),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct UpdateWriter {
    cache: TieredCache,
    store: Arc<dyn DurableStore>,
    ttl: TtlPolicy,
}

impl UpdateWriter {
    pub fn new(cache: TieredCache, store: Arc<dyn DurableStore>, ttl: TtlPolicy) -> Self {
        Self { cache, store, ttl }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Normalizes `raw` and writes it through. Tier A is written before this
    /// returns; the durable upsert is spawned and never awaited here.
    pub async fn apply(&self, key: &str, raw: Value, hint: Option<&CacheHint>) -> WriteOutcome {
        let status = EventStatus::from_payload(&raw);
        let detailed = normalizer::normalize(&raw);

        if let Some(previous) = self.last_written(key).await {
            if previous.status.is_terminal() {
                if !status.is_terminal() {
                    info!(event_key = %key, status = status.as_str(), "ignoring update for finished match");
                    return WriteOutcome::IgnoredTerminal;
                }
                if previous.detailed == detailed {
                    debug!(event_key = %key, "final scorecard unchanged, skipping write");
                    return WriteOutcome::AlreadyFinal;
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        let document = EventDocument {
            key: key.to_string(),
            status,
            raw,
            detailed,
            updated_at: now,
        };
        let ttl = self.ttl.resolve(status, hint, now);
        self.write_fast(&document, ttl).await;

        if status.is_terminal() {
            info!(event_key = %key, status = status.as_str(), "🏁 final write for match");
        }

        let durable = self.spawn_upsert(&document);
        WriteOutcome::Applied { document, durable }
    }

    /// Re-populates Tier A from a durable document for the rest of its
    /// status lifetime.
    pub async fn warm(&self, document: &EventDocument) {
        let now = chrono::Utc::now().timestamp();
        let ttl = self
            .ttl
            .remaining(document.status, document.updated_at, now);
        if ttl.is_zero() {
            return;
        }
        self.write_fast(document, ttl).await;
    }

    async fn write_fast(&self, document: &EventDocument, ttl: Duration) {
        let key = &document.key;
        self.cache
            .set(&keys::event(key), document.to_value(), ttl)
            .await;
        self.cache
            .set_json(&keys::detailed(key), &document.detailed, ttl)
            .await;
    }

    fn spawn_upsert(&self, document: &EventDocument) -> JoinHandle<()> {
        let store = self.store.clone();
        let key = document.key.clone();
        let value = document.to_value();
        tokio::spawn(async move {
            if let Err(e) = store.upsert(&key, value).await {
                warn!(event_key = %key, error = %e, "durable upsert failed");
            }
        })
    }

    /// Most recent record: Tier A first, then the durable store.
    async fn last_written(&self, key: &str) -> Option<EventDocument> {
        if let Some(doc) = self.cache.get_json::<EventDocument>(&keys::event(key)).await {
            return Some(doc);
        }
        match self.store.find_by_key(key).await {
            Ok(found) => found.and_then(EventDocument::from_value),
            Err(e) => {
                warn!(event_key = %key, error = %e, "durable lookup failed during write");
                None
            }
        }
    }
}
