//! HTTP surface: webhook intake, read API, fan-out WebSocket.

pub mod error;
pub mod routes;
pub mod webhook;
pub mod ws;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::TieredCache;
use crate::discovery::Discovery;
use crate::hub::FanOutHub;
use crate::ingestion::IngestionService;
use crate::live_data::LiveDataService;
use crate::middleware::request_logging;
use crate::subscriptions::SubscriptionManager;

pub use error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub live_data: Arc<LiveDataService>,
    pub hub: Arc<FanOutHub>,
    pub cache: TieredCache,
    pub discovery: Arc<Discovery>,
    pub subscriptions: Arc<SubscriptionManager>,
    /// Lower-cased header name carrying the webhook secret.
    pub secret_header: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/webhooks/live", post(webhook::receive_live_update))
        .route("/ws", get(ws::websocket_handler))
        .route("/api/matches", get(routes::list_matches))
        .route("/api/matches/:key/detailed", get(routes::get_detailed))
        .route("/api/selection", get(routes::get_selection))
        .route("/api/subscriptions", get(routes::get_subscriptions))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
