use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::PaymentIntentResponse,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/intent", post(create_payment_intent))
}

#[utoipa::path(
    post,
    path = "/api/payments/intent",
    responses(
        (status = 200, description = "Payment intent for the caller's cart total", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Cart is empty"),
        (status = 500, description = "Payment processor error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PaymentIntentResponse>>> {
    let resp = payment_service::create_payment_intent(&state, &user).await?;
    Ok(Json(resp))
}
