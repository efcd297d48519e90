use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get},
};
use tokio::net::TcpListener;
use tower_http::{decompression::RequestDecompressionLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use super::{
    services::{
        cancel_download, clear_feed, completed_downloads, feed, health, list_downloads,
        notifications, record_feed, start_download, watch_downloads,
    },
    state::AppState,
};
use crate::config::Config;
use crate::download::EmbeddedPages;
use crate::storage::StorageClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All HTTP routes over `state`
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_payload_bytes.as_u64() as usize;

    Router::new()
        .route("/health", get(health))
        .route("/downloads", get(list_downloads).post(start_download))
        .route("/downloads/watch", get(watch_downloads))
        .route("/downloads/completed", get(completed_downloads))
        .route("/downloads/{request_id}", delete(cancel_download))
        .route("/notifications", get(notifications))
        .route("/feed", get(feed).post(record_feed).delete(clear_feed))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        // Transparently decodes gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(path = %config.download.storage_path.display(), "Opening manga library");
    let storage = StorageClient::local(&config.download.storage_path)
        .map_err(|e| format!("Failed to open manga library: {}", e))?;

    let (state, service_task) = AppState::build(config, storage, Arc::new(EmbeddedPages))
        .map_err(|e| format!("Failed to start download service: {}", e))?;

    match state
        .store
        .prune_expired(state.config.retention.track_logs_ttl_days as u64)
    {
        Ok(stats) => info!(pruned = stats.track_logs_pruned, "Startup retention pass done"),
        Err(err) => warn!(error = %err, "Startup retention pass failed"),
    }

    let app = router(state.clone());
    let listener = TcpListener::bind(address).await?;
    info!(%address, "mangabox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match state.service.shutdown().await {
        Ok(abandoned) => info!(abandoned, "Download service shut down"),
        Err(err) => warn!(error = %err, "Download service already stopped"),
    }
    if let Err(err) = service_task.await {
        error!(error = %err, "Download service task failed");
    }
    state.store.persist()?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
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
