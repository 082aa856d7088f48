//! # User Balance API

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use gigflow_core::{Money, UserId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::error::AppError;
use crate::state::AppState;

/// A user's settled earnings.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = uuid::Uuid)]
    pub user_id: UserId,
    /// Decimal string.
    #[schema(value_type = String)]
    pub balance: Money,
}

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/users/:id/balance", get(get_balance))
}

/// GET /v1/users/:id/balance
///
/// Visible to the user themselves and to admins.
#[utoipa::path(
    get,
    path = "/v1/users/{id}/balance",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 403, description = "Another user's balance", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn get_balance(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(user_id): Path<UserId>,
) -> Result<Json<BalanceResponse>, AppError> {
    if actor.id != user_id && !actor.is_admin() {
        return Err(AppError::Forbidden(format!(
            "balance of {user_id} is not visible to {}",
            actor.id
        )));
    }
    let balance = state.engine.balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}
