//! Origin push endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_ENCODING, HeaderMap},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use super::{error::ApiError, AppState};
use crate::ingestion::{InboundDelivery, IngestOutcome};

/// Acknowledges with `{"status": true}` whenever the delivery passed the
/// auth and decode gates, whether or not anything was written.
pub async fn receive_live_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let delivery = InboundDelivery {
        secret: header_str(state.secret_header.as_str()),
        content_encoding: header_str(CONTENT_ENCODING.as_str()),
        body: &body,
    };

    match state.ingestion.ingest(delivery).await? {
        IngestOutcome::Applied {
            event_key,
            delivered,
            ..
        } => debug!(event_key = %event_key, delivered, bytes = body.len(), "webhook accepted"),
        IngestOutcome::MissingKey => debug!(bytes = body.len(), "webhook without key acked"),
        IngestOutcome::IgnoredTerminal { event_key } | IngestOutcome::AlreadyFinal { event_key } => {
            debug!(event_key = %event_key, "webhook for finished match acked")
        }
    }

    Ok(Json(json!({ "status": true })))
}
