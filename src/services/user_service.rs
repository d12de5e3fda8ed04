use crate::{
    audit::log_audit,
    db::DbPool,
    dto::users::{ChangePasswordRequest, RestoreAccountRequest, UpdateAccountRequest, UserPublic},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::{hash_password, verify_password},
};

pub async fn get_current_user(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<UserPublic>> {
    let found: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_optional(pool)
        .await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Current user", found.into(), None))
}

pub async fn update_account(
    pool: &DbPool,
    user: &AuthUser,
    payload: UpdateAccountRequest,
) -> AppResult<ApiResponse<UserPublic>> {
    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    let phone = payload.phone.unwrap_or(existing.phone);
    let avatar_url = payload.avatar_url.unwrap_or(existing.avatar_url);
    let shop_name = payload.shop_name.or(existing.shop_name);
    let shop_address = payload.shop_address.or(existing.shop_address);

    let updated: User = sqlx::query_as(
        r#"
        UPDATE users
        SET name = $2, phone = $3, avatar_url = $4, shop_name = $5, shop_address = $6,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.user_id)
    .bind(name)
    .bind(phone)
    .bind(avatar_url)
    .bind(shop_name)
    .bind(shop_address)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "account_update",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Account updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn change_password(
    pool: &DbPool,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if !verify_password(&payload.old_password, &existing.password_hash)? {
        return Err(AppError::Unauthorized("Invalid old password".into()));
    }

    if payload.new_password.trim().is_empty() {
        return Err(AppError::BadRequest("New password is required".into()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user.user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "password_change",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Password changed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Soft delete. The row stays for order history; the account can be brought
/// back through `restore_account`.
pub async fn delete_account(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET is_deleted = TRUE, deleted_at = now(), refresh_token = NULL, updated_at = now()
        WHERE id = $1 AND is_deleted = FALSE
        "#,
    )
    .bind(user.user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "account_delete",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Account deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn restore_account(
    pool: &DbPool,
    payload: RestoreAccountRequest,
) -> AppResult<ApiResponse<UserPublic>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_deleted {
        return Err(AppError::BadRequest("Account is not deactivated".into()));
    }

    let restored: User = sqlx::query_as(
        r#"
        UPDATE users
        SET is_deleted = FALSE, deleted_at = NULL, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.id)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(restored.id),
        "account_restore",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Account restored",
        restored.into(),
        Some(Meta::empty()),
    ))
}
