//! Web server module.
//!
//! Routes:
//! - `POST /webhook`: signed message ingestion
//! - `GET /messages`, `GET /stats`: read-only queries over the store
//! - `GET /health/live`, `GET /health/ready`, `GET /metrics`: operations
//!
//! Every route is wrapped by the request counter and the HTTP trace layer.

pub mod handlers;
pub mod metrics;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health_live, health_ready, ingest_webhook, list_messages, metrics as metrics_handler,
    not_found, root, stats, AppState, ListParams, ListResponse, StatusResponse,
};
pub use metrics::{track_requests, Metrics};

/// Build the application router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhook", post(ingest_webhook))
        .route("/messages", get(list_messages))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_handler))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
