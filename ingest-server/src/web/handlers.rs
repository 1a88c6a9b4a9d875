//! HTTP endpoint handlers.
//!
//! The webhook handler takes the body as raw bytes so the signature is
//! checked against exactly what was sent; JSON parsing happens afterwards.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::ingest::{ingest, FieldError, IngestError, SIGNATURE_HEADER};
use crate::store::{Message, MessageFilter, MessageStats, MessageStore, Page};
use crate::web::metrics::Metrics;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MessageStore,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, store: MessageStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
            metrics: Metrics::new(),
        }
    }
}

/// `{"status": ...}` body used by the webhook and health endpoints.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Error body; `detail` is a string or a list of field errors.
#[derive(Serialize)]
struct ErrorResponse<T: Serialize> {
    detail: T,
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: "Internal server error",
        }),
    )
        .into_response()
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    detail: "invalid signature",
                }),
            )
                .into_response(),
            IngestError::Invalid(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::<Vec<FieldError>> { detail: errors }),
            )
                .into_response(),
            // Already logged with context by the pipeline
            IngestError::Persistence(_) => internal_error(),
        }
    }
}

// =============================================================================
// Root
// =============================================================================

/// Service identity.
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "app": state.config.app_name,
        "env": state.config.env,
    }))
}

// =============================================================================
// Webhook
// =============================================================================

/// Webhook ingestion endpoint.
///
/// Responds 200 `{"status":"ok"}` for new and duplicate deliveries alike,
/// 401 for a missing or wrong signature, 422 for an invalid payload and 500
/// when the message could not be stored.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match ingest(&state.store, &state.config.webhook_secret, &body, signature).await {
        Ok(_) => (StatusCode::OK, StatusResponse::new("ok")).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Query string for `GET /messages`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub from_msisdn: Option<String>,
    pub since: Option<String>,
    pub q: Option<String>,
}

impl ListParams {
    /// Split into the store filter and a clamped page. Empty strings mean
    /// "no filter".
    pub fn into_query(self) -> (MessageFilter, Page) {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let filter = MessageFilter {
            from_msisdn: non_empty(self.from_msisdn),
            since: non_empty(self.since),
            q: non_empty(self.q),
        };
        (filter, Page::clamped(self.limit, self.offset))
    }
}

/// Body of `GET /messages`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<Message>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Paginated, filterable message list.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let (filter, page) = params.into_query();

    match state.store.list(&filter, page).await {
        Ok(result) => Json(ListResponse {
            data: result.data,
            total: result.total,
            limit: page.limit,
            offset: page.offset,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "messages_list_failed");
            internal_error()
        }
    }
}

/// Aggregate message statistics.
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json::<MessageStats>(stats).into_response(),
        Err(e) => {
            error!(error = %e, "stats_query_failed");
            internal_error()
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Prometheus-style counters.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.prometheus(),
    )
}

/// Fallback for unknown routes, so they pass through the request counter.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { detail: "Not Found" }),
    )
        .into_response()
}

/// Liveness: 200 whenever the process is serving.
pub async fn health_live() -> Json<StatusResponse> {
    StatusResponse::new("alive")
}

/// Readiness: 200 only if the store answers and a webhook secret is set.
pub async fn health_ready(State(state): State<AppState>) -> Response {
    if let Err(e) = state.store.ping().await {
        warn!(error = %e, "readiness_store_unreachable");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if !state.config.has_webhook_secret() {
        warn!("readiness_webhook_secret_missing");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    (StatusCode::OK, StatusResponse::new("ready")).into_response()
}
