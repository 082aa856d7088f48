//! # Task & Work API
//!
//! Task posting, bidding, direct acceptance, and the work loop from start
//! through approval.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use gigflow_core::{BidId, TaskId};
use gigflow_engine::{NewTask, TaskView};
use gigflow_ledger::{BidRecord, SubmissionRecord, TaskRecord};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, parse_amount, Validate};
use crate::state::AppState;

/// Post a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub title: String,
    /// Decimal string, e.g. `"100.00"`.
    pub budget: String,
    pub deadline: DateTime<Utc>,
}

impl Validate for CreateTaskRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

/// Bid on a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceBidRequest {
    /// Decimal string.
    pub amount: String,
}

/// Deliver work for review.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitWorkRequest {
    /// Free-form delivery: links, notes, file references.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// Send work back to the doer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevisionRequest {
    pub feedback: String,
}

impl Validate for RevisionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.feedback.trim().is_empty() {
            return Err("feedback must not be empty".to_string());
        }
        Ok(())
    }
}

/// Build the tasks router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tasks", post(create_task))
        .route("/v1/tasks/:id", get(get_task))
        .route("/v1/tasks/:id/cancel", post(cancel_task))
        .route("/v1/tasks/:id/bids", post(place_bid))
        .route("/v1/tasks/:id/bids/:bid_id/accept", post(accept_bid))
        .route("/v1/tasks/:id/start", post(start_work))
        .route("/v1/tasks/:id/submissions", post(submit_work))
        .route("/v1/tasks/:id/revision", post(request_revision))
        .route("/v1/tasks/:id/approve", post(approve_work))
}

/// POST /v1/tasks
#[utoipa::path(
    post,
    path = "/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task posted"),
        (status = 422, description = "Invalid title, budget or deadline", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn create_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let new = NewTask {
        title: req.title,
        budget: parse_amount(&req.budget, "budget")?,
        deadline: req.deadline,
    };
    let outcome = state.engine.create_task(actor, new).await?;
    Ok((StatusCode::CREATED, Json(state.settle(outcome).await)))
}

/// GET /v1/tasks/:id
#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with bids, payment, latest dispute and submissions"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn get_task(
    State(state): State<AppState>,
    Caller(_actor): Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(state.engine.task_view(task_id).await?))
}

/// POST /v1/tasks/:id/cancel
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/cancel",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task cancelled, pending bids rejected"),
        (status = 409, description = "Task is not open or has a payment", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn cancel_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskRecord>, AppError> {
    let outcome = state.engine.cancel_task(actor, task_id).await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/tasks/:id/bids
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/bids",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = PlaceBidRequest,
    responses(
        (status = 201, description = "Bid placed"),
        (status = 409, description = "Task not open or already bid", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn place_bid(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
    body: Result<Json<PlaceBidRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BidRecord>), AppError> {
    let req = extract_json(body)?;
    let amount = parse_amount(&req.amount, "amount")?;
    let outcome = state.engine.place_bid(actor, task_id, amount).await?;
    Ok((StatusCode::CREATED, Json(state.settle(outcome).await)))
}

/// POST /v1/tasks/:id/bids/:bid_id/accept
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/bids/{bid_id}/accept",
    params(
        ("id" = uuid::Uuid, Path, description = "Task ID"),
        ("bid_id" = uuid::Uuid, Path, description = "Bid ID"),
    ),
    responses(
        (status = 200, description = "Bid accepted, task assigned"),
        (status = 403, description = "Caller is not the poster", body = crate::error::ErrorBody),
        (status = 409, description = "Task no longer open", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn accept_bid(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((task_id, bid_id)): Path<(TaskId, BidId)>,
) -> Result<Json<TaskRecord>, AppError> {
    let outcome = state.engine.accept_bid(actor, task_id, bid_id).await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/tasks/:id/start
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/start",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Work started"),
        (status = 409, description = "Task is not assigned", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn start_work(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskRecord>, AppError> {
    let outcome = state.engine.start_work(actor, task_id).await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/tasks/:id/submissions
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/submissions",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = SubmitWorkRequest,
    responses(
        (status = 201, description = "Work submitted for review"),
        (status = 409, description = "Task is not being worked on", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn submit_work(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
    body: Result<Json<SubmitWorkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionRecord>), AppError> {
    let req = extract_json(body)?;
    let outcome = state.engine.submit_work(actor, task_id, req.payload).await?;
    Ok((StatusCode::CREATED, Json(state.settle(outcome).await)))
}

/// POST /v1/tasks/:id/revision
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/revision",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = RevisionRequest,
    responses(
        (status = 200, description = "Work returned to the doer"),
        (status = 409, description = "Task is not under review", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn request_revision(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
    body: Result<Json<RevisionRequest>, JsonRejection>,
) -> Result<Json<TaskRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let outcome = state
        .engine
        .request_revision(actor, task_id, &req.feedback)
        .await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/tasks/:id/approve
///
/// Repeating an approval that already settled returns the completed task
/// without crediting again.
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/approve",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task completed, funds released to the doer"),
        (status = 409, description = "Task is not under review or is disputed", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub(crate) async fn approve_work(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskRecord>, AppError> {
    let outcome = state.engine.approve_work(actor, task_id).await?;
    Ok(Json(state.settle(outcome).await))
}
