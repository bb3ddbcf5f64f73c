/// HTTP API for proof anchoring.
///
/// The server is a thin layer over the workflow:
/// - Status queries for the outside world
/// - Synchronous and queued anchoring for the payment webhook
/// - User-triggered resolve and upgrade
/// - Admin-only sweep and migration triggers
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::anchor::outbox::Outbox;
use crate::anchor::Anchorer;
use crate::error::{AnchorError, Result};

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub anchorer: Anchorer,
    /// Present when the background outbox worker is running.
    pub outbox: Option<Outbox>,
    /// Bearer token guarding admin routes. Admin routes are closed when unset.
    pub admin_token: Option<String>,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::status_routes())
        .merge(routes::anchor_routes())
        .merge(routes::admin_routes())
        .with_state(Arc::new(state))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the scheduled sweep on a fixed interval.
pub fn spawn_sweeper(anchorer: Anchorer, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = anchorer.resolve_cron(None).await {
                error!(error = %e, "Scheduled sweep failed");
            }
        }
    })
}

/// Start the API server.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AnchorError::Io)?;

    info!("ots-anchor API server listening on {addr}");

    axum::serve(listener, app).await.map_err(AnchorError::Io)?;

    Ok(())
}
