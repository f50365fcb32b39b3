//! REST gateway for the podsmith podcast generator.
//!
//! # Endpoints
//!
//! - `GET  /health` - Health check
//! - `POST /api/v1/podcasts` - Submit a brief (202, returns the job id)
//! - `GET  /api/v1/podcasts` - List jobs, newest first
//! - `GET  /api/v1/podcasts/{id}` - Job status
//! - `GET  /api/v1/podcasts/{id}/artifacts` - Generation artifacts (completed only)
//! - `GET  /api/v1/podcasts/{id}/audio` - Final MP3 (completed only)
//! - `POST /api/v1/podcasts/{id}/cancel` - Cancel a queued/processing job
//! - `POST /api/v1/podcasts/validate` - Pre-flight a brief without creating a job

pub mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/podcasts", post(routes::submit).get(routes::list))
        .route("/api/v1/podcasts/validate", post(routes::validate))
        .route("/api/v1/podcasts/{id}", get(routes::status))
        .route("/api/v1/podcasts/{id}/artifacts", get(routes::artifacts))
        .route("/api/v1/podcasts/{id}/audio", get(routes::audio))
        .route("/api/v1/podcasts/{id}/cancel", post(routes::cancel))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting podsmith API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
