//! Application setup and server configuration.

use std::sync::Arc;

use axum::{extract::Extension, http::Method, routing::get, Router};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::items::{ItemUpdateHub, WorkerPool};
use crate::kernel::sse::{self, SseState};
use crate::server::routes::health_handler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub worker_pool: Arc<WorkerPool>,
    pub stream_hub: ItemUpdateHub,
}

/// Build the Axum application router
///
/// - `GET /health`
/// - `GET /api/users/:user_id/items/stream` (SSE)
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    let stream_routes = sse::router(SseState {
        stream_hub: state.stream_hub.clone(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .merge(stream_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
