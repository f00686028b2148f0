//! Tier B: durable key → document store used as backup and fallback.

pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::EventStatus;

pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub status: Option<EventStatus>,
    /// Only documents written at or after this epoch second.
    pub updated_since: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    UpdatedAsc,
    #[default]
    UpdatedDesc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" | "updated_asc" => Some(SortOrder::UpdatedAsc),
            "desc" | "updated_desc" => Some(SortOrder::UpdatedDesc),
            _ => None,
        }
    }
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Shallow-merges the top-level fields of `document` into the stored one.
    async fn upsert(&self, key: &str, document: Value) -> StoreResult<()>;

    async fn find_by_key(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn find_by_filter(
        &self,
        filter: &DocumentFilter,
        sort: SortOrder,
        limit: usize,
        skip: usize,
    ) -> StoreResult<Vec<Value>>;
}

/// Top-level object merge; fields in `incoming` win.
pub fn merge_documents(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(update)) => {
            for (k, v) in update {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}
