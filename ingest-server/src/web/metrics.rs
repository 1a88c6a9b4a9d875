//! Process-wide request counters and their Prometheus text rendering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Request and error-response counters shared by every route.
#[derive(Clone, Default)]
pub struct Metrics {
    requests_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one incoming request, before it is handled.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished response; only 4xx and 5xx are recorded.
    pub fn record_response(&self, status: StatusCode) {
        if status.is_client_error() || status.is_server_error() {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Render the counters in the Prometheus text exposition format.
    pub fn prometheus(&self) -> String {
        let requests_total = self.requests_total();
        let errors_total = self.errors_total();

        format!(
            "# HELP http_requests_total Total number of HTTP requests.\n\
# TYPE http_requests_total counter\n\
http_requests_total {requests_total}\n\
# HELP http_errors_total Total number of HTTP errors (4xx/5xx).\n\
# TYPE http_errors_total counter\n\
http_errors_total {errors_total}\n"
        )
    }
}

/// Middleware counting every request on arrival and every error response.
pub async fn track_requests(State(metrics): State<Metrics>, request: Request, next: Next) -> Response {
    metrics.record_request();
    let response = next.run(request).await;
    metrics.record_response(response.status());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_errors() {
        let metrics = Metrics::new();
        for status in [
            StatusCode::OK,
            StatusCode::UNAUTHORIZED,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::NOT_MODIFIED,
        ] {
            metrics.record_request();
            metrics.record_response(status);
        }

        assert_eq!(metrics.requests_total(), 4);
        assert_eq!(metrics.errors_total(), 2);
    }

    #[test]
    fn test_request_counted_before_response() {
        let metrics = Metrics::new();
        metrics.record_request();
        assert_eq!(metrics.requests_total(), 1);
        assert_eq!(metrics.errors_total(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_request();
        assert_eq!(metrics.requests_total(), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_response(StatusCode::UNPROCESSABLE_ENTITY);

        let text = metrics.prometheus();
        assert!(text.contains("# TYPE http_requests_total counter\n"));
        assert!(text.contains("\nhttp_requests_total 2\n"));
        assert!(text.contains("\nhttp_errors_total 1\n"));
    }
}
