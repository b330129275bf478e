//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::frames::FrameProcessor;
use crate::sse::SseBroadcaster;
use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub broadcaster: SseBroadcaster,
    pub frames: Arc<FrameProcessor>,
}

/// Build the router
///
/// `max_body_bytes` bounds frame uploads.
pub fn build_router(ctx: AppContext, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/api/state", get(super::handlers::get_state))
        .route("/api/frames", post(super::handlers::submit_frame))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        // Viewers are served from other origins
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    max_body_bytes: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(ctx, max_body_bytes);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
