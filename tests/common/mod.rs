//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use livefeed_backend::{
    cache::MemoryFastStore,
    error::OriginError,
    models::{EventStatus, EventSummary},
    origin::{EventDetails, OriginClient, OriginResult},
    store::{DurableStore, SqliteDocumentStore},
    FeedSettings, LiveFeed,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const SECRET: &str = "integration-secret";

/// Origin double with scripted candidates and payloads plus call logs.
#[derive(Default)]
pub struct ScriptedOrigin {
    candidates: Mutex<Vec<EventSummary>>,
    details: Mutex<HashMap<String, Value>>,
    pub detail_calls: Mutex<HashMap<String, usize>>,
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<Vec<String>>,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_candidates(&self, events: Vec<EventSummary>) {
        *self.candidates.lock() = events;
    }

    pub fn set_details(&self, key: &str, payload: Value) {
        self.details.lock().insert(key.to_string(), payload);
    }

    pub fn fetches(&self, key: &str) -> usize {
        self.detail_calls.lock().get(key).copied().unwrap_or(0)
    }

    pub fn take_calls(&self) -> (Vec<String>, Vec<String>) {
        let mut subs = std::mem::take(&mut *self.subscribed.lock());
        let mut unsubs = std::mem::take(&mut *self.unsubscribed.lock());
        subs.sort();
        unsubs.sort();
        (subs, unsubs)
    }
}

#[async_trait]
impl OriginClient for ScriptedOrigin {
    async fn list_candidate_events(&self) -> OriginResult<Vec<EventSummary>> {
        Ok(self.candidates.lock().clone())
    }

    async fn get_event_details(&self, key: &str) -> OriginResult<EventDetails> {
        *self.detail_calls.lock().entry(key.to_string()).or_default() += 1;
        self.details
            .lock()
            .get(key)
            .cloned()
            .map(|payload| EventDetails {
                payload,
                hint: None,
            })
            .ok_or(OriginError::NotFound)
    }

    async fn subscribe(&self, key: &str) -> OriginResult<()> {
        self.subscribed.lock().push(key.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, key: &str) -> OriginResult<()> {
        self.unsubscribed.lock().push(key.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub origin: Arc<ScriptedOrigin>,
    pub store: Arc<SqliteDocumentStore>,
    pub fast: Arc<MemoryFastStore>,
    pub feed: LiveFeed,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(SqliteDocumentStore::new(":memory:").unwrap()))
    }

    pub fn with_store(store: Arc<SqliteDocumentStore>) -> Self {
        Self::build(ScriptedOrigin::new(), store, FeedSettings::default())
    }

    pub fn build(
        origin: Arc<ScriptedOrigin>,
        store: Arc<SqliteDocumentStore>,
        settings: FeedSettings,
    ) -> Self {
        let settings = FeedSettings {
            webhook_secret: SECRET.to_string(),
            ..settings
        };
        let fast = Arc::new(MemoryFastStore::default());
        let durable: Arc<dyn DurableStore> = store.clone();
        let feed = LiveFeed::new(settings, origin.clone(), durable, fast.clone());
        Self {
            origin,
            store,
            fast,
            feed,
        }
    }
}

pub fn summary(key: &str, status: EventStatus) -> EventSummary {
    EventSummary {
        key: key.to_string(),
        status,
        name: None,
        start_at: None,
    }
}

/// A small two-innings scorecard in the origin's rich stats format.
pub fn match_payload(key: &str, status: &str, runs: u32) -> Value {
    json!({
        "key": key,
        "status": status,
        "teams": {"a": {"name": "India"}, "b": {"name": "Australia"}},
        "play": {
            "innings_order": ["a_1"],
            "innings": {
                "a_1": {
                    "score": {"runs": runs, "wickets": 2, "balls": 60},
                    "overs": [10, 0],
                    "batting_stats": [
                        {"player_key": "p1", "name": "Gill", "runs": 40, "balls": 30, "strike_rate": 133.33},
                        {"player_key": "p2", "name": "Iyer", "runs": 12, "balls": 9}
                    ],
                    "bowling_stats": [
                        {"player_key": "p9", "name": "Cummins", "overs": [2, 0], "maidens": 0,
                         "runs": 18, "wickets": 1, "economy": 9.0}
                    ]
                }
            },
            "result": if status == "completed" { json!({"msg": "India won by 4 wickets"}) } else { Value::Null }
        }
    })
}
