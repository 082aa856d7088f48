//! # Request Metrics
//!
//! In-process request counters using atomics. State-machine rejections
//! (`409`) are counted separately from other client errors so lost races
//! and replays of stale actions show up on their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

/// Shared metrics state.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub conflict_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Client and server errors, conflicts included.
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflict_count.load(Ordering::Relaxed)
    }

    fn record(&self, status: StatusCode) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if status.is_client_error() || status.is_server_error() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        if status == StatusCode::CONFLICT {
            self.conflict_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Middleware that increments the request, error and conflict counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.record(response.status());
    }

    response
}
