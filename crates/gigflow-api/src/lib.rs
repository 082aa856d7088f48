//! # gigflow-api — HTTP Service
//!
//! Axum front end for the assignment lifecycle engine. Handlers resolve
//! the caller, call exactly one engine operation, dispatch the resulting
//! events, and map engine errors to HTTP responses. No lifecycle rules
//! live here.
//!
//! ## API Surface
//!
//! | Prefix                   | Module                  |
//! |--------------------------|-------------------------|
//! | `/v1/tasks/*`            | [`routes::tasks`], [`routes::payments`], [`routes::disputes`] |
//! | `/v1/payments/callback`  | [`routes::payments`] (unauthenticated) |
//! | `/v1/disputes/*`         | [`routes::disputes`]    |
//! | `/v1/users/*`            | [`routes::users`]       |
//! | `/health/*`              | probes (unauthenticated) |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;

pub use error::AppError;
pub use state::AppState;

/// Assemble the application router.
///
/// Health probes and the processor webhook sit outside bearer auth.
pub fn app(state: AppState) -> Router {
    app_with_metrics(state, ApiMetrics::new())
}

/// [`app`] with caller-supplied counters.
pub fn app_with_metrics(state: AppState, metrics: ApiMetrics) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::tasks::router())
        .merge(routes::payments::router())
        .merge(routes::disputes::router())
        .merge(routes::users::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics.clone()))
        .with_state(state.clone());

    let webhook = routes::payments::callback_router()
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(metrics))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(webhook).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

/// Ready once the ledger answers a query.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.engine.store().ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, backend = state.engine.store().kind(), "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}
