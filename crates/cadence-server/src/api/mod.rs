//! HTTP API
//!
//! JSON routes over the review service, bound to localhost.

pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use cadence_core::ReviewService;
use state::AppState;

/// Build the axum router with all API routes
pub fn build_router(service: Arc<ReviewService>, port: u16) -> Router {
    let state = AppState::new(service);

    let origins: Vec<axum::http::HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        // Sessions
        .route("/api/sessions", post(handlers::start_session))
        .route("/api/sessions/{id}/next", post(handlers::next_item))
        .route("/api/sessions/{id}/submit", post(handlers::submit_answer))
        // Users
        .route("/api/users/{user}/due-count", get(handlers::due_count))
        .route("/api/users/{user}/progress", get(handlers::progress))
        .route("/api/users/{user}/stats", get(handlers::stats))
        .route("/api/users/{user}/cards/{item}/reset", post(handlers::reset_card))
        // Catalog & health
        .route("/api/topics", get(handlers::topics))
        .route("/api/health", get(handlers::health_check))
        .layer(
            ServiceBuilder::new()
                .concurrency_limit(50)
                .layer(cors),
        )
        .with_state(state)
}

/// Serve the API until the process exits
pub async fn serve(service: Arc<ReviewService>, port: u16) -> std::io::Result<()> {
    let app = build_router(service, port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await
}
