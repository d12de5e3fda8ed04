use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::users::{
        ChangePasswordRequest, RestoreAccountRequest, UpdateAccountRequest, UserPublic,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::user_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_account).delete(delete_account))
        .route("/change-password", post(change_password))
        .route("/restore", post(restore_account))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserPublic>),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<UserPublic>>> {
    let resp = user_service::get_current_user(&state.pool, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Account updated", body = ApiResponse<UserPublic>),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> AppResult<Json<ApiResponse<UserPublic>>> {
    let resp = user_service::update_account(&state.pool, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ApiResponse<serde_json::Value>),
        (status = 401, description = "Invalid old password"),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = user_service::change_password(&state.pool, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Account soft-deleted", body = ApiResponse<serde_json::Value>),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = user_service::delete_account(&state.pool, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/restore",
    request_body = RestoreAccountRequest,
    responses(
        (status = 200, description = "Account restored", body = ApiResponse<UserPublic>),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "Users"
)]
pub async fn restore_account(
    State(state): State<AppState>,
    Json(payload): Json<RestoreAccountRequest>,
) -> AppResult<Json<ApiResponse<UserPublic>>> {
    let resp = user_service::restore_account(&state.pool, payload).await?;
    Ok(Json(resp))
}
