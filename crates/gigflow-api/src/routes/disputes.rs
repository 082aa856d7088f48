//! # Dispute API
//!
//! Opening a dispute freezes settlement on the task. The counterparty may
//! respond once, either party may add follow-ups, and an admin rules the
//! funds released or refunded. Either party or an admin may withdraw an
//! open dispute, which restores the task to where it was.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gigflow_core::{DisputeId, TaskId};
use gigflow_engine::{DisputeRuling, DisputeView, NewDispute};
use gigflow_ledger::{DisputeRecord, FollowUpRecord};
use gigflow_state::DisputeOutcome;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Open a dispute.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenDisputeRequest {
    pub reason: String,
}

impl Validate for OpenDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".to_string());
        }
        Ok(())
    }
}

/// The counterparty's response, or a follow-up message.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DisputeMessageRequest {
    pub message: String,
    /// Evidence references (URLs or file keys).
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Validate for DisputeMessageRequest {
    fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        Ok(())
    }
}

/// An admin ruling.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveDisputeRequest {
    /// `refund` or `release`.
    #[schema(value_type = String)]
    pub outcome: DisputeOutcome,
    #[serde(default)]
    pub notes: String,
}

impl Validate for ResolveDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.notes.chars().count() > 4000 {
            return Err("notes must be at most 4000 characters".to_string());
        }
        Ok(())
    }
}

/// Build the disputes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tasks/:id/disputes", post(open_dispute))
        .route("/v1/disputes/:id", get(get_dispute))
        .route("/v1/disputes/:id/response", post(respond))
        .route("/v1/disputes/:id/follow-ups", post(add_follow_up))
        .route("/v1/disputes/:id/resolve", post(resolve))
        .route("/v1/disputes/:id/cancel", post(cancel_dispute))
}

/// POST /v1/tasks/:id/disputes
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/disputes",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = OpenDisputeRequest,
    responses(
        (status = 201, description = "Dispute opened, settlement frozen"),
        (status = 403, description = "Caller is not a party", body = crate::error::ErrorBody),
        (status = 409, description = "Task is not disputable", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn open_dispute(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
    body: Result<Json<OpenDisputeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DisputeRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let outcome = state
        .engine
        .open_dispute(actor, task_id, NewDispute { reason: req.reason })
        .await?;
    Ok((StatusCode::CREATED, Json(state.settle(outcome).await)))
}

/// GET /v1/disputes/:id
#[utoipa::path(
    get,
    path = "/v1/disputes/{id}",
    params(("id" = uuid::Uuid, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute with follow-ups in order"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn get_dispute(
    State(state): State<AppState>,
    Caller(_actor): Caller,
    Path(dispute_id): Path<DisputeId>,
) -> Result<Json<DisputeView>, AppError> {
    Ok(Json(state.engine.dispute_view(dispute_id).await?))
}

/// POST /v1/disputes/:id/response
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/response",
    params(("id" = uuid::Uuid, Path, description = "Dispute ID")),
    request_body = DisputeMessageRequest,
    responses(
        (status = 200, description = "Response recorded"),
        (status = 409, description = "Initiator responding, or already responded", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn respond(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(dispute_id): Path<DisputeId>,
    body: Result<Json<DisputeMessageRequest>, JsonRejection>,
) -> Result<Json<DisputeRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let outcome = state
        .engine
        .respond(actor, dispute_id, &req.message, req.evidence)
        .await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/disputes/:id/follow-ups
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/follow-ups",
    params(("id" = uuid::Uuid, Path, description = "Dispute ID")),
    request_body = DisputeMessageRequest,
    responses(
        (status = 201, description = "Follow-up added"),
        (status = 409, description = "Dispute is closed", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn add_follow_up(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(dispute_id): Path<DisputeId>,
    body: Result<Json<DisputeMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FollowUpRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let outcome = state
        .engine
        .add_follow_up(actor, dispute_id, &req.message, req.evidence)
        .await?;
    Ok((StatusCode::CREATED, Json(state.settle(outcome).await)))
}

/// POST /v1/disputes/:id/resolve
///
/// Admin only. Repeating the same ruling is a quiet success.
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/resolve",
    params(("id" = uuid::Uuid, Path, description = "Dispute ID")),
    request_body = ResolveDisputeRequest,
    responses(
        (status = 200, description = "Dispute resolved"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 409, description = "Dispute closed with a different outcome", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn resolve(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(dispute_id): Path<DisputeId>,
    body: Result<Json<ResolveDisputeRequest>, JsonRejection>,
) -> Result<Json<DisputeRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let ruling = DisputeRuling {
        outcome: req.outcome,
        notes: req.notes,
    };
    let outcome = state.engine.resolve(actor, dispute_id, ruling).await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/disputes/:id/cancel
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/cancel",
    params(("id" = uuid::Uuid, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute withdrawn, task restored"),
        (status = 409, description = "Dispute is not open", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn cancel_dispute(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(dispute_id): Path<DisputeId>,
) -> Result<Json<DisputeRecord>, AppError> {
    let outcome = state.engine.cancel_dispute(actor, dispute_id).await?;
    Ok(Json(state.settle(outcome).await))
}
