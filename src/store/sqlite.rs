//! SQLite-backed document store.
//!
//! - WAL mode so reads proceed during writes
//! - Status and `updated_at` are lifted into indexed columns for filtering
//! - Upsert merges inside one lock hold, so concurrent writers never interleave a merge

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OpenFlags};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::{merge_documents, DocumentFilter, DurableStore, SortOrder, StoreResult};
use crate::error::StoreError;
use crate::models::EventStatus;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS match_documents (
    match_key TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    document_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_match_documents_status_updated
    ON match_documents(status, updated_at DESC);

CREATE INDEX IF NOT EXISTS idx_match_documents_updated
    ON match_documents(updated_at DESC);
"#;

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open document store at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize document store schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        // In-memory databases report "memory"; only complain about real files.
        if db_path != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM match_documents", [], |row| row.get(0))
            .unwrap_or(0);
        info!("💾 Document store ready at {} ({} matches)", db_path, count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn len(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM match_documents", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|c| c as usize)
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decode(json: &str) -> StoreResult<Value> {
        Ok(serde_json::from_str(json)?)
    }
}

fn status_column(doc: &Value) -> String {
    EventStatus::from_payload(doc).as_str().to_string()
}

fn updated_at_column(doc: &Value) -> i64 {
    doc.get("updated_at")
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| chrono::Utc::now().timestamp())
}

#[async_trait]
impl DurableStore for SqliteDocumentStore {
    async fn upsert(&self, key: &str, document: Value) -> StoreResult<()> {
        if !document.is_object() {
            return Err(StoreError::NotAnObject(key.to_string()));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<String> = {
            let mut stmt = tx.prepare_cached(
                "SELECT document_json FROM match_documents WHERE match_key = ?1",
            )?;
            let mut rows = stmt.query([key])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        let existing = existing.as_deref().map(Self::decode).transpose()?;

        let merged = merge_documents(existing, document);
        let json = serde_json::to_string(&merged)?;

        tx.execute(
            "INSERT INTO match_documents (match_key, status, updated_at, document_json) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(match_key) DO UPDATE SET status=excluded.status, \
             updated_at=excluded.updated_at, document_json=excluded.document_json",
            params![key, status_column(&merged), updated_at_column(&merged), json],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> StoreResult<Option<Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT document_json FROM match_documents WHERE match_key = ?1")?;
        let mut rows = stmt.query([key])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let json: String = row.get(0)?;
        Ok(Some(Self::decode(&json)?))
    }

    async fn find_by_filter(
        &self,
        filter: &DocumentFilter,
        sort: SortOrder,
        limit: usize,
        skip: usize,
    ) -> StoreResult<Vec<Value>> {
        let mut clauses: Vec<&str> = Vec::with_capacity(2);
        let mut args: Vec<SqlValue> = Vec::with_capacity(4);

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(since) = filter.updated_since {
            clauses.push("updated_at >= ?");
            args.push(SqlValue::Integer(since));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order_sql = match sort {
            SortOrder::UpdatedAsc => "ORDER BY updated_at ASC, match_key ASC",
            SortOrder::UpdatedDesc => "ORDER BY updated_at DESC, match_key ASC",
        };
        let sql = format!(
            "SELECT document_json FROM match_documents {} {} LIMIT ? OFFSET ?",
            where_sql, order_sql
        );
        args.push(SqlValue::Integer(limit.min(i64::MAX as usize) as i64));
        args.push(SqlValue::Integer(skip.min(i64::MAX as usize) as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;

        let mut out = Vec::with_capacity(limit.min(256));
        while let Some(row) = rows.next()? {
            let json: String = row.get(0)?;
            match Self::decode(&json) {
                Ok(doc) => out.push(doc),
                Err(e) => warn!(error = %e, "skipping undecodable match document"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(key: &str, status: &str, updated_at: i64) -> Value {
        json!({"key": key, "status": status, "updated_at": updated_at, "raw": {"key": key}})
    }

    #[tokio::test]
    async fn test_store_create() {
        let store = SqliteDocumentStore::new(":memory:").expect("Failed to create store");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_find_by_key() {
        let store = SqliteDocumentStore::new(":memory:").unwrap();
        store.upsert("m1", doc("m1", "live", 100)).await.unwrap();
        let found = store.find_by_key("m1").await.unwrap().unwrap();
        assert_eq!(found["status"], json!("live"));
        assert!(store.find_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_fields() {
        let store = SqliteDocumentStore::new(":memory:").unwrap();
        store
            .upsert("m1", json!({"key": "m1", "status": "live", "updated_at": 1, "note": "x"}))
            .await
            .unwrap();
        store
            .upsert("m1", json!({"status": "completed", "updated_at": 2}))
            .await
            .unwrap();
        let found = store.find_by_key("m1").await.unwrap().unwrap();
        assert_eq!(found["note"], json!("x"));
        assert_eq!(found["status"], json!("completed"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_non_object() {
        let store = SqliteDocumentStore::new(":memory:").unwrap();
        let err = store.upsert("m1", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
    }

    #[tokio::test]
    async fn test_find_by_filter_status_sort_and_paging() {
        let store = SqliteDocumentStore::new(":memory:").unwrap();
        store.upsert("a", doc("a", "completed", 10)).await.unwrap();
        store.upsert("b", doc("b", "completed", 30)).await.unwrap();
        store.upsert("c", doc("c", "live", 20)).await.unwrap();
        store.upsert("d", doc("d", "completed", 20)).await.unwrap();

        let filter = DocumentFilter {
            status: Some(EventStatus::Completed),
            updated_since: None,
        };
        let desc = store
            .find_by_filter(&filter, SortOrder::UpdatedDesc, 10, 0)
            .await
            .unwrap();
        let keys: Vec<_> = desc.iter().map(|d| d["key"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["b", "d", "a"]);

        let page = store
            .find_by_filter(&filter, SortOrder::UpdatedAsc, 1, 1)
            .await
            .unwrap();
        assert_eq!(page[0]["key"], json!("d"));

        let recent = store
            .find_by_filter(
                &DocumentFilter {
                    status: None,
                    updated_since: Some(20),
                },
                SortOrder::UpdatedAsc,
                10,
                0,
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let path = path.to_string_lossy().to_string();
        {
            let store = SqliteDocumentStore::new(&path).unwrap();
            store.upsert("m1", doc("m1", "live", 5)).await.unwrap();
        }
        let store = SqliteDocumentStore::new(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.find_by_key("m1").await.unwrap().is_some());
    }
}
