//! On-demand reads with the cache → store → origin fallback chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{keys, TieredCache};
use crate::error::{OriginError, ReadError};
use crate::models::{DetailedUpdate, EventDocument, EventStatus};
use crate::normalizer;
use crate::origin::OriginClient;
use crate::store::{DocumentFilter, DurableStore, SortOrder};
use crate::writer::{UpdateWriter, WriteOutcome};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    Cache,
    Store,
    Origin,
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedView {
    pub event_key: String,
    pub detailed_update: DetailedUpdate,
    pub source: ReadSource,
    pub stale: bool,
}

impl DetailedView {
    fn new(key: &str, detailed_update: DetailedUpdate, source: ReadSource) -> Self {
        Self {
            event_key: key.to_string(),
            detailed_update,
            source,
            stale: source == ReadSource::Stale,
        }
    }
}

/// Listing query for the durable store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<EventStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    fn cache_key(&self) -> String {
        format!(
            "list:{}:{}:{}:{}",
            self.status.map(|s| s.as_str()).unwrap_or("all"),
            match self.order {
                SortOrder::UpdatedAsc => "asc",
                SortOrder::UpdatedDesc => "desc",
            },
            self.limit(),
            self.skip
        )
    }
}

pub struct LiveDataService {
    cache: TieredCache,
    store: Arc<dyn DurableStore>,
    origin: Arc<dyn OriginClient>,
    writer: UpdateWriter,
}

impl LiveDataService {
    pub fn new(
        cache: TieredCache,
        store: Arc<dyn DurableStore>,
        origin: Arc<dyn OriginClient>,
        writer: UpdateWriter,
    ) -> Self {
        Self {
            cache,
            store,
            origin,
            writer,
        }
    }

    pub async fn get_detailed_update(&self, key: &str) -> Result<DetailedView, ReadError> {
        // Tier A
        if let Some(hit) = self
            .cache
            .get_json::<DetailedUpdate>(&keys::detailed(key))
            .await
        {
            return Ok(DetailedView::new(key, hit, ReadSource::Cache));
        }

        // Tier B, if still fresh for its status
        let stored = self.stored_document(key).await;
        if let Some(doc) = &stored {
            let now = chrono::Utc::now().timestamp();
            if self
                .writer
                .ttl_policy()
                .is_fresh(doc.status, doc.updated_at, now)
            {
                debug!(event_key = %key, status = doc.status.as_str(), "serving from durable store");
                self.writer.warm(doc).await;
                return Ok(DetailedView::new(key, doc.detailed.clone(), ReadSource::Store));
            }
        }

        // Origin
        match self.origin.get_event_details(key).await {
            Ok(details) => {
                let raw = details.payload.clone();
                match self
                    .writer
                    .apply(key, details.payload, details.hint.as_ref())
                    .await
                {
                    WriteOutcome::Applied { document, .. } => {
                        Ok(DetailedView::new(key, document.detailed, ReadSource::Origin))
                    }
                    WriteOutcome::IgnoredTerminal | WriteOutcome::AlreadyFinal => {
                        let detailed = match stored {
                            Some(doc) if doc.status.is_terminal() => doc.detailed,
                            _ => normalizer::normalize(&raw),
                        };
                        Ok(DetailedView::new(key, detailed, ReadSource::Origin))
                    }
                }
            }
            Err(e) => self.fall_back(key, stored, e).await,
        }
    }

    async fn fall_back(
        &self,
        key: &str,
        stored: Option<EventDocument>,
        err: OriginError,
    ) -> Result<DetailedView, ReadError> {
        if let Some(doc) = stored {
            info!(event_key = %key, error = %err, "origin fetch failed, serving stale document");
            return Ok(DetailedView::new(key, doc.detailed, ReadSource::Stale));
        }
        if let Some(doc) = self
            .cache
            .get_json::<EventDocument>(&keys::event(key))
            .await
        {
            info!(event_key = %key, error = %err, "origin fetch failed, serving stale cache entry");
            return Ok(DetailedView::new(key, doc.detailed, ReadSource::Stale));
        }
        match err {
            OriginError::NotFound => Err(ReadError::NotFound(key.to_string())),
            other => {
                warn!(event_key = %key, error = %other, "no data anywhere for match");
                Err(ReadError::Unavailable(key.to_string(), other.to_string()))
            }
        }
    }

    async fn stored_document(&self, key: &str) -> Option<EventDocument> {
        match self.store.find_by_key(key).await {
            Ok(Some(value)) => document_from_store(key, value),
            Ok(None) => None,
            Err(e) => {
                warn!(event_key = %key, error = %e, "durable lookup failed");
                None
            }
        }
    }

    /// Durable listing, briefly cached in Tier A.
    pub async fn list_documents(&self, query: &ListQuery) -> Result<Vec<Value>, ReadError> {
        let filter = DocumentFilter {
            status: query.status,
            updated_since: None,
        };
        let ttl = list_ttl(self.writer.ttl_policy().live);
        self.cache
            .fetch_or_compute(&query.cache_key(), ttl, || async {
                self.store
                    .find_by_filter(&filter, query.order, query.limit(), query.skip)
                    .await
                    .map_err(|e| ReadError::Store(e.to_string()))
            })
            .await
    }
}

fn list_ttl(live: Duration) -> Duration {
    live.min(Duration::from_secs(10))
}

/// Stored documents written by older builds may lack `detailed`; rebuild it
/// from `raw` when possible.
fn document_from_store(key: &str, value: Value) -> Option<EventDocument> {
    if let Some(doc) = EventDocument::from_value(value.clone()) {
        return Some(doc);
    }
    let raw = value.get("raw")?.clone();
    Some(EventDocument {
        key: key.to_string(),
        status: EventStatus::from_payload(&value),
        detailed: normalizer::normalize(&raw),
        updated_at: value.get("updated_at").and_then(Value::as_i64).unwrap_or(0),
        raw,
    })
}
