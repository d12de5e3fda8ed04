use crate::{
    audit::log_audit,
    dto::payments::PaymentIntentResponse,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Size a payment intent from the caller's current cart total and hand the
/// client secret back to the storefront.
pub async fn create_payment_intent(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PaymentIntentResponse>> {
    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(p.price * ci.quantity), 0)
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .fetch_one(&state.pool)
    .await?;

    let amount = total.0;
    if amount <= 0 {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let currency = state.payments.currency.clone();
    let intent = state
        .payments
        .create_intent(amount, &currency, user.user_id)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_intent_create",
        Some("payments"),
        Some(serde_json::json!({ "payment_intent_id": intent.id, "amount": amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment intent created",
        PaymentIntentResponse {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount,
            currency,
        },
        Some(Meta::empty()),
    ))
}
