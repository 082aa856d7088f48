//! # Escrow Payment API
//!
//! Checkout initiation by the poster, and the processor's capture webhook.
//! The webhook is mounted outside bearer auth: its authenticity comes from
//! the HMAC signature over the posted fields.

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Form, Json, Router};
use gigflow_core::{BidId, PaymentId, TaskId};
use gigflow_engine::{Checkout, Outcome, PaymentCallback};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

/// Pay for a bid into escrow.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    #[schema(value_type = uuid::Uuid)]
    pub bid_id: BidId,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    /// `applied` on first capture, `already_processed` on replays.
    pub status: String,
    #[schema(value_type = uuid::Uuid)]
    pub payment_id: PaymentId,
}

/// Routes that require a bearer identity.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tasks/:id/payment", post(initiate_payment))
}

/// The unauthenticated processor webhook.
pub fn callback_router() -> Router<AppState> {
    Router::new().route("/v1/payments/callback", post(payment_callback))
}

/// POST /v1/tasks/:id/payment
///
/// The task stays `OPEN`; it is assigned when the capture callback lands.
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/payment",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Pending payment and the signed checkout form"),
        (status = 403, description = "Caller is not the poster", body = crate::error::ErrorBody),
        (status = 409, description = "Task not open or payment already captured", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub(crate) async fn initiate_payment(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(task_id): Path<TaskId>,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<Checkout>, AppError> {
    let req = extract_json(body)?;
    let outcome = state
        .engine
        .initiate_payment(actor, task_id, req.bid_id)
        .await?;
    Ok(Json(state.settle(outcome).await))
}

/// POST /v1/payments/callback
#[utoipa::path(
    post,
    path = "/v1/payments/callback",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Capture applied or already processed", body = CallbackAck),
        (status = 400, description = "Missing callback fields", body = crate::error::ErrorBody),
        (status = 401, description = "Callback rejected", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown correlation id", body = crate::error::ErrorBody),
        (status = 409, description = "Payment not confirmed or task no longer open", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub(crate) async fn payment_callback(
    State(state): State<AppState>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Json<CallbackAck>, AppError> {
    let Form(fields) = form.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let callback =
        PaymentCallback::from_fields(fields).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state.engine.confirm_callback(callback).await?;
    let status = match &outcome {
        Outcome::Applied { .. } => "applied",
        Outcome::AlreadyProcessed { .. } => "already_processed",
    };
    let payment = state.settle(outcome).await;
    Ok(Json(CallbackAck {
        status: status.to_string(),
        payment_id: payment.id,
    }))
}
