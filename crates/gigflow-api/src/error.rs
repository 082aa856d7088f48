//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Engine errors map onto HTTP status codes here and nowhere else.
//! Internal failures and signature-verification details never reach the
//! response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gigflow_engine::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "INVALID_STATE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Rejection diagnostics, present only for invalid-state errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not the required party or role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation is not legal in the current state (409).
    #[error("{message}")]
    InvalidState {
        message: String,
        details: serde_json::Value,
    },

    /// A concurrent change won; re-read and retry (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        let details = match self {
            Self::InvalidState { details, .. } => Some(details),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unauthorized(msg) => Self::Forbidden(msg),
            EngineError::InvalidState {
                event,
                task_status,
                payment_status,
                reason,
            } => {
                Self::InvalidState {
                    message: format!("{event} rejected: {}", reason.code()),
                    details: serde_json::json!({
                        "event": event,
                        "task_status": task_status.as_str(),
                        "payment_status": payment_status.map(|p| p.as_str()),
                        "reason": reason.code(),
                    }),
                }
            }
            EngineError::NotFound(what) => Self::NotFound(what),
            EngineError::SignatureInvalid => Self::Unauthorized("callback rejected".into()),
            EngineError::Conflict(msg) => Self::Conflict(msg),
            EngineError::Validation(msg) => Self::Validation(msg),
            EngineError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigflow_ledger::StoreError;
    use gigflow_state::{PaymentStatus, RejectionReason, TaskStatus};
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_state_carries_diagnostics() {
        let err = AppError::from(EngineError::InvalidState {
            event: "WorkApproved",
            task_status: TaskStatus::InDispute,
            payment_status: Some(PaymentStatus::Disputed),
            reason: RejectionReason::DisputeOpen,
        });
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
        assert_eq!(body["error"]["details"]["task_status"], "IN_DISPUTE");
        assert_eq!(body["error"]["details"]["reason"], "dispute_open");
    }

    #[tokio::test]
    async fn store_failures_are_hidden() {
        let err = AppError::from(EngineError::Store(StoreError::Corrupt(
            "row 42 has status BANANA".into(),
        )));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"]["message"].as_str().unwrap().contains("BANANA"));
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn signature_failures_say_nothing_specific() {
        let (status, body) = body_json(AppError::from(EngineError::SignatureInvalid)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "unauthorized: callback rejected");
    }

    #[test]
    fn engine_taxonomy_maps_to_status_codes() {
        let cases = [
            (EngineError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (EngineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (EngineError::Conflict("x".into()), StatusCode::CONFLICT),
            (EngineError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (engine, expected) in cases {
            let (status, _) = AppError::from(engine).status_and_code();
            assert_eq!(status, expected);
        }
    }
}
