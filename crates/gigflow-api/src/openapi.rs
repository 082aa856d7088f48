//! # OpenAPI Specification Assembly
//!
//! Collects every utoipa-documented handler into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the gigflow API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "gigflow API",
        version = "0.1.0",
        description = "Task assignment lifecycle and escrow settlement: posting, bidding, escrow checkout, work review, settlement and disputes."
    ),
    paths(
        // Tasks & work
        crate::routes::tasks::create_task,
        crate::routes::tasks::get_task,
        crate::routes::tasks::cancel_task,
        crate::routes::tasks::place_bid,
        crate::routes::tasks::accept_bid,
        crate::routes::tasks::start_work,
        crate::routes::tasks::submit_work,
        crate::routes::tasks::request_revision,
        crate::routes::tasks::approve_work,
        // Payments
        crate::routes::payments::initiate_payment,
        crate::routes::payments::payment_callback,
        // Disputes
        crate::routes::disputes::open_dispute,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::respond,
        crate::routes::disputes::add_follow_up,
        crate::routes::disputes::resolve,
        crate::routes::disputes::cancel_dispute,
        // Users
        crate::routes::users::get_balance,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::tasks::CreateTaskRequest,
        crate::routes::tasks::PlaceBidRequest,
        crate::routes::tasks::SubmitWorkRequest,
        crate::routes::tasks::RevisionRequest,
        crate::routes::payments::InitiatePaymentRequest,
        crate::routes::payments::CallbackAck,
        crate::routes::disputes::OpenDisputeRequest,
        crate::routes::disputes::DisputeMessageRequest,
        crate::routes::disputes::ResolveDisputeRequest,
        crate::routes::users::BalanceResponse,
    )),
    tags(
        (name = "tasks", description = "Task posting, bidding and the work loop"),
        (name = "payments", description = "Escrow checkout and processor webhook"),
        (name = "disputes", description = "Dispute handling and admin rulings"),
        (name = "users", description = "Balances"),
    )
)]
pub struct ApiDoc;

/// Serves the spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
