use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::wishlist::{WishlistProductList, WishlistProductRequest, WishlistToggleResult},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wishlist).post(add_to_wishlist))
        .route("/toggle", post(toggle_wishlist))
        .route("/{product_id}", delete(remove_from_wishlist))
}

#[utoipa::path(
    get,
    path = "/api/wishlist",
    responses(
        (status = 200, description = "Wishlist products", body = ApiResponse<WishlistProductList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<WishlistProductList>>> {
    let data = fetch_wishlist(&state.pool, user.user_id).await?;
    Ok(Json(ApiResponse::success("Wishlist", data, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/wishlist",
    request_body = WishlistProductRequest,
    responses(
        (status = 200, description = "Added to wishlist (idempotent)", body = ApiResponse<WishlistProductList>),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<WishlistProductRequest>,
) -> AppResult<Json<ApiResponse<WishlistProductList>>> {
    ensure_product_exists(&state.pool, payload.product_id).await?;

    sqlx::query(
        r#"
        INSERT INTO wishlist_items (id, user_id, product_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .execute(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "wishlist_add",
        Some("wishlist_items"),
        Some(serde_json::json!({ "product_id": payload.product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = fetch_wishlist(&state.pool, user.user_id).await?;
    Ok(Json(ApiResponse::success(
        "Added to wishlist",
        data,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    post,
    path = "/api/wishlist/toggle",
    request_body = WishlistProductRequest,
    responses(
        (status = 200, description = "Toggled; reports whether the product was added or removed", body = ApiResponse<WishlistToggleResult>),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn toggle_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<WishlistProductRequest>,
) -> AppResult<Json<ApiResponse<WishlistToggleResult>>> {
    ensure_product_exists(&state.pool, payload.product_id).await?;

    let removed: Option<(Uuid,)> = sqlx::query_as(
        "DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2 RETURNING id",
    )
    .bind(user.user_id)
    .bind(payload.product_id)
    .fetch_optional(&state.pool)
    .await?;

    let action = if removed.is_some() {
        "removed"
    } else {
        sqlx::query(
            "INSERT INTO wishlist_items (id, user_id, product_id) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(payload.product_id)
        .execute(&state.pool)
        .await?;
        "added"
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "wishlist_toggle",
        Some("wishlist_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "action": action })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = WishlistToggleResult {
        product_id: payload.product_id,
        action: action.to_string(),
    };
    let message = match action {
        "removed" => "Removed from wishlist",
        _ => "Added to wishlist",
    };
    Ok(Json(ApiResponse::success(message, data, Some(Meta::empty()))))
}

#[utoipa::path(
    delete,
    path = "/api/wishlist/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Removed from wishlist", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Wishlist entry not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let result =
        sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user.user_id)
            .bind(product_id)
            .execute(&state.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "wishlist_remove",
        Some("wishlist_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Removed from wishlist",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

async fn fetch_wishlist(pool: &DbPool, user_id: Uuid) -> AppResult<WishlistProductList> {
    let items = sqlx::query_as::<_, Product>(
        r#"
        SELECT p.*
        FROM wishlist_items w
        JOIN products p ON p.id = w.product_id
        WHERE w.user_id = $1
        ORDER BY w.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(WishlistProductList { items })
}

async fn ensure_product_exists(pool: &DbPool, product_id: Uuid) -> AppResult<()> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }
    Ok(())
}
