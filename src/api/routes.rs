//! Read-side route handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{error::ApiError, AppState};
use crate::cache::keys;
use crate::live_data::{DetailedView, ListQuery};
use crate::models::{EventStatus, SelectionSet};
use crate::store::SortOrder;
use crate::subscriptions::SubscriptionEntry;

// ===== Route Handlers =====

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.subscriptions.mode().as_str().to_string(),
        subscribers: state.hub.subscriber_count(),
        interest_groups: state.hub.group_count(),
        frames_delivered: state.hub.delivered_frames(),
        slow_subscribers_dropped: state.hub.slow_dropped(),
    })
}

/// Scorecard for one match through the cache → store → origin chain.
pub async fn get_detailed(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DetailedView>, ApiError> {
    let view = state.live_data.get_detailed_update(&key).await?;
    Ok(Json(view))
}

/// Stored match documents.
pub async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<MatchQuery>,
) -> Result<Json<Value>, ApiError> {
    let query = params.into_list_query()?;
    let matches = state.live_data.list_documents(&query).await?;
    Ok(Json(json!({
        "count": matches.len(),
        "matches": matches,
    })))
}

/// Current selection, from the fast tier when available.
pub async fn get_selection(State(state): State<AppState>) -> Json<SelectionSet> {
    if let Some(selection) = state.cache.get_json::<SelectionSet>(keys::SELECTION).await {
        return Json(selection);
    }
    Json(state.discovery.current().as_ref().clone())
}

pub async fn get_subscriptions(State(state): State<AppState>) -> Json<SubscriptionsResponse> {
    Json(SubscriptionsResponse {
        mode: state.subscriptions.mode().as_str().to_string(),
        subscriptions: state.subscriptions.snapshot(),
    })
}

// ===== Request/Response Types =====

#[derive(Debug, Default, Deserialize)]
pub struct MatchQuery {
    /// Filter by status ("live", "completed", ...)
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// "asc" or "desc" by last update
    pub order: Option<String>,
}

impl MatchQuery {
    fn into_list_query(self) -> Result<ListQuery, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match EventStatus::parse(raw) {
                EventStatus::Unknown if raw != "unknown" => {
                    return Err(ApiError::BadRequest(format!("Unknown status '{}'", raw)))
                }
                status => Some(status),
            },
        };
        let order = match self.order.as_deref() {
            None => SortOrder::default(),
            Some(raw) => SortOrder::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown order '{}'", raw)))?,
        };
        Ok(ListQuery {
            status,
            order,
            limit: self.limit,
            skip: self.skip.unwrap_or(0),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mode: String,
    pub subscribers: usize,
    pub interest_groups: usize,
    pub frames_delivered: u64,
    pub slow_subscribers_dropped: u64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub mode: String,
    pub subscriptions: Vec<SubscriptionEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_query_parsing() {
        let q = MatchQuery {
            status: Some("completed".into()),
            limit: Some(10),
            skip: None,
            order: Some("asc".into()),
        }
        .into_list_query()
        .unwrap();
        assert_eq!(q.status, Some(EventStatus::Completed));
        assert_eq!(q.order, SortOrder::UpdatedAsc);
        assert_eq!(q.skip, 0);

        let bad = MatchQuery {
            status: Some("halftime".into()),
            ..Default::default()
        };
        assert!(matches!(bad.into_list_query(), Err(ApiError::BadRequest(_))));

        let bad_order = MatchQuery {
            order: Some("sideways".into()),
            ..Default::default()
        };
        assert!(bad_order.into_list_query().is_err());
    }
}
