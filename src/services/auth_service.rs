use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::auth::{
        Claims, LoginRequest, LoginResponse, OtpRequest, OtpVerifyRequest, RefreshClaims,
        RefreshRequest, RefreshResponse, RegisterRequest,
    },
    dto::users::UserPublic,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OtpCode, User},
    response::{ApiResponse, Meta},
};

const ACCESS_TOKEN_MINUTES: i64 = 15;
const REFRESH_TOKEN_DAYS: i64 = 7;
const OTP_EXPIRY_MINUTES: i64 = 5;

pub async fn register_user(
    pool: &DbPool,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<UserPublic>> {
    let RegisterRequest {
        name,
        email,
        phone,
        password,
        role,
    } = payload;

    if [&name, &email, &phone, &password]
        .iter()
        .any(|f| f.trim().is_empty())
    {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    let role = role.unwrap_or_else(|| "user".to_string());
    if role != "user" && role != "retailer" {
        return Err(AppError::BadRequest(
            "role must be 'user' or 'retailer'".into(),
        ));
    }

    // Email is a case-insensitive login key: normalized here and at every
    // lookup site.
    let email = email.trim().to_lowercase();
    let phone = phone.trim().to_string();

    let exist: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = $1 OR phone = $2")
            .bind(email.as_str())
            .bind(phone.as_str())
            .fetch_optional(pool)
            .await?;

    if exist.is_some() {
        return Err(AppError::Conflict(
            "User with same email or phone already exists".into(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let id = Uuid::new_v4();

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name.trim())
    .bind(email)
    .bind(phone)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
    Ok(ApiResponse::success("User created", user.into(), None))
}

pub async fn login_user(
    pool: &DbPool,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest {
        email_or_phone,
        password,
    } = payload;

    // The identifier may be an email (stored lowercased) or a phone number.
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE email = $1 OR phone = $2")
            .bind(email_or_phone.trim().to_lowercase())
            .bind(email_or_phone.trim())
            .fetch_optional(pool)
            .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    if user.is_deleted {
        return Err(AppError::Forbidden);
    }

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let resp = issue_session(pool, user).await?;

    if let Err(err) = log_audit(
        pool,
        Some(resp.user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": resp.user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

pub async fn refresh_tokens(
    pool: &DbPool,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<RefreshResponse>> {
    let secret = refresh_secret()?;
    let decoded = decode::<RefreshClaims>(
        &payload.refresh_token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid refresh token".into()))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid refresh token".into())),
    };

    if user.is_deleted {
        return Err(AppError::Forbidden);
    }

    // Only the most recently issued refresh token is honored.
    if user.refresh_token.as_deref() != Some(payload.refresh_token.as_str()) {
        return Err(AppError::Unauthorized("Refresh token expired".into()));
    }

    let access_token = sign_access_token(user.id, &user.role, &access_secret()?)?;
    let refresh_token = sign_refresh_token(user.id, &secret)?;

    sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(refresh_token.as_str())
        .execute(pool)
        .await?;

    Ok(ApiResponse::success(
        "Access token refreshed",
        RefreshResponse {
            access_token,
            refresh_token,
        },
        Some(Meta::empty()),
    ))
}

pub async fn logout_user(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = now() WHERE id = $1")
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_logout",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged out",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn request_otp(
    pool: &DbPool,
    payload: OtpRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = payload.email.trim().to_lowercase();
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE email = $1 AND is_deleted = FALSE")
            .bind(email.as_str())
            .fetch_optional(pool)
            .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    let code = generate_otp_code();
    let expires_at = Utc::now() + Duration::minutes(OTP_EXPIRY_MINUTES);

    sqlx::query(
        "INSERT INTO otp_codes (id, email, code, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(email.as_str())
    .bind(code.as_str())
    .bind(expires_at)
    .execute(pool)
    .await?;

    // Delivery happens out of band; never expose the code above debug level.
    tracing::debug!(email = %email, code = %code, "otp code issued");

    if let Err(err) = log_audit(
        pool,
        Some(user.id),
        "otp_request",
        Some("otp_codes"),
        Some(serde_json::json!({ "email": email })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "OTP sent",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn verify_otp(
    pool: &DbPool,
    payload: OtpVerifyRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();

    let record: Option<OtpCode> = sqlx::query_as(
        "SELECT * FROM otp_codes WHERE email = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(email.as_str())
    .fetch_optional(pool)
    .await?;

    let record = match record {
        Some(r) => r,
        None => return Err(AppError::BadRequest("OTP not found or expired".into())),
    };

    if record.code != payload.code.trim() {
        return Err(AppError::BadRequest("Invalid OTP".into()));
    }

    if record.expires_at < Utc::now() {
        return Err(AppError::BadRequest("OTP has expired".into()));
    }

    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE email = $1 AND is_deleted = FALSE")
            .bind(email.as_str())
            .fetch_optional(pool)
            .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    // Consume every outstanding code for this email.
    sqlx::query("DELETE FROM otp_codes WHERE email = $1")
        .bind(email.as_str())
        .execute(pool)
        .await?;

    let user_id = user.id;
    let resp = issue_session(pool, user).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user_id),
        "otp_verify",
        Some("users"),
        Some(serde_json::json!({ "user_id": user_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "OTP verified",
        resp,
        Some(Meta::empty()),
    ))
}

/// Sign an access/refresh pair, persist the refresh token, and build the
/// login payload.
async fn issue_session(pool: &DbPool, user: User) -> AppResult<LoginResponse> {
    let access_token = sign_access_token(user.id, &user.role, &access_secret()?)?;
    let refresh_token = sign_refresh_token(user.id, &refresh_secret()?)?;

    sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(refresh_token.as_str())
        .execute(pool)
        .await?;

    Ok(LoginResponse {
        user: user.into(),
        access_token,
        refresh_token,
    })
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn sign_access_token(user_id: Uuid, role: &str, secret: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(ACCESS_TOKEN_MINUTES))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn sign_refresh_token(user_id: Uuid, secret: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(REFRESH_TOKEN_DAYS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = RefreshClaims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn access_secret() -> AppResult<String> {
    std::env::var("JWT_ACCESS_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_ACCESS_SECRET is not set")))
}

fn refresh_secret() -> AppResult<String> {
    std::env::var("JWT_REFRESH_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_REFRESH_SECRET is not set")))
}

fn generate_otp_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn access_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = sign_access_token(user_id, "retailer", "test-secret").unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, user_id.to_string());
        assert_eq!(decoded.claims.role, "retailer");
    }

    #[test]
    fn refresh_token_rejects_wrong_secret() {
        let token = sign_refresh_token(Uuid::new_v4(), "secret-a").unwrap();
        let result = decode::<RefreshClaims>(
            &token,
            &DecodingKey::from_secret(b"secret-b"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }
}
