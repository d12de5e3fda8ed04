use chrono::Utc;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::orders::{OrderList, UpdateOrderStatusRequest},
    dto::users::{UserList, UserPublic},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, User},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination, SortOrder},
};

pub async fn list_users(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(pool)
        .await?;

    let items = users.into_iter().map(UserPublic::from).collect();
    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<UserPublic>> {
    ensure_admin(user)?;
    let found: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("User", found.into(), None))
}

pub async fn deactivate_user(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<UserPublic>> {
    ensure_admin(user)?;
    let updated: Option<User> = sqlx::query_as(
        r#"
        UPDATE users
        SET is_deleted = TRUE, deleted_at = now(), refresh_token = NULL, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    let updated = match updated {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_deactivate",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User deactivated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn restore_user(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<UserPublic>> {
    ensure_admin(user)?;
    let updated: Option<User> = sqlx::query_as(
        r#"
        UPDATE users
        SET is_deleted = FALSE, deleted_at = NULL, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    let updated = match updated {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_restore",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User restored",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    pool: &DbPool,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let sort_order = query.sort_order.as_ref().unwrap_or(&SortOrder::Desc);

    let status = query.status.as_ref().filter(|s| !s.is_empty());
    if let Some(status) = status {
        if OrderStatus::parse(status).is_none() {
            return Err(AppError::BadRequest("Invalid order status".into()));
        }
    }

    let (items, total) = match status {
        Some(status) => {
            let sql = format!(
                "SELECT * FROM orders WHERE status = $1 ORDER BY created_at {} LIMIT $2 OFFSET $3",
                sort_order.as_sql()
            );
            let items = sqlx::query_as::<_, Order>(&sql)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            let total: (i64,) = sqlx::query_as("SELECT count(*) FROM orders WHERE status = $1")
                .bind(status)
                .fetch_one(pool)
                .await?;
            (items, total.0)
        }
        None => {
            let sql = format!(
                "SELECT * FROM orders ORDER BY created_at {} LIMIT $1 OFFSET $2",
                sort_order.as_sql()
            );
            let items = sqlx::query_as::<_, Order>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            let total: (i64,) = sqlx::query_as("SELECT count(*) FROM orders")
                .fetch_one(pool)
                .await?;
            (items, total.0)
        }
    };

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn update_order_status(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let next = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let existing: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let current = OrderStatus::parse(&existing.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order has unknown status")))?;

    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot move order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let delivered_at = if next == OrderStatus::Delivered {
        Some(Utc::now())
    } else {
        existing.delivered_at
    };

    let order: Order = sqlx::query_as(
        r#"
        UPDATE orders
        SET status = $2, delivered_at = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(next.as_str())
    .bind(delivered_at)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order status updated",
        order,
        Some(Meta::empty()),
    ))
}
