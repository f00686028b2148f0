//! Livefeed - live cricket scorecards, cached and fanned out.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livefeed_backend::{
    api,
    cache::MemoryFastStore,
    origin::HttpOriginClient,
    store::SqliteDocumentStore,
    Config, LiveFeed,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    info!("🏏 Livefeed starting up");

    let settings = config.feed_settings();
    info!(
        mode = settings.mode.as_str(),
        selection_size = settings.selection_size,
        live_ttl_secs = settings.ttl.live.as_secs(),
        "Pipeline configuration"
    );

    if config.origin_api_key.trim().is_empty() {
        warn!("⚠️  ORIGIN_API_KEY missing or empty - origin calls will fail");
    }
    let origin = Arc::new(
        HttpOriginClient::new(
            config.origin_base_url.clone(),
            config.origin_project_key.clone(),
            config.origin_api_key.clone(),
        )?,
    );

    let db_path = config.db_path();
    let store = Arc::new(SqliteDocumentStore::new(&db_path)?);

    let fast = Arc::new(MemoryFastStore::new(config.fast_cache_max_entries));
    let feed = LiveFeed::new(settings, origin, store, fast);

    let cancel = CancellationToken::new();
    let background = feed.spawn_background(cancel.clone());

    let app = api::router(feed.app_state());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    cancel.cancel();
    for handle in background {
        let _ = handle.await;
    }

    let released = feed.shutdown(config.shutdown_timeout()).await;
    info!(released, "👋 Livefeed stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Initialize tracing with enhanced observability
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livefeed_backend=debug,livefeed=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
