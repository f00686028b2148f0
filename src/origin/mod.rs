//! Upstream sports-data provider access.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::CacheHint;
use crate::error::OriginError;
use crate::models::EventSummary;

pub use http::HttpOriginClient;

pub type OriginResult<T> = std::result::Result<T, OriginError>;

/// Full match payload plus any freshness hint the origin attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub payload: Value,
    pub hint: Option<CacheHint>,
}

#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Featured/candidate matches in the origin's own ranking order.
    async fn list_candidate_events(&self) -> OriginResult<Vec<EventSummary>>;

    async fn get_event_details(&self, key: &str) -> OriginResult<EventDetails>;

    /// Registers webhook push delivery for one match.
    async fn subscribe(&self, key: &str) -> OriginResult<()>;

    async fn unsubscribe(&self, key: &str) -> OriginResult<()>;
}
