use axum_marketplace_api::{
    db::{DbPool, create_pool},
    dto::auth::{LoginRequest, OtpRequest, OtpVerifyRequest, RefreshRequest, RegisterRequest},
    error::AppError,
    middleware::auth::AuthUser,
    services::auth_service,
};
use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

// Integration flow: registration and login with email normalization, refresh
// token rotation with a single honored slot, and the OTP login path.
#[tokio::test]
async fn registration_otp_and_refresh_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    // Token signing reads these at the call sites.
    unsafe {
        std::env::set_var("JWT_ACCESS_SECRET", "test-access-secret");
        std::env::set_var("JWT_REFRESH_SECRET", "test-refresh-secret");
    }

    let pool = setup_pool(&database_url).await?;

    // Mixed-case registration stores a lowercased email
    auth_service::register_user(
        &pool,
        RegisterRequest {
            name: "Jo".into(),
            email: "Jo@Example.com".into(),
            phone: "+15550001001".into(),
            password: "hunter2".into(),
            role: None,
        },
    )
    .await?;

    // Login works with the exact string used at registration
    let login = auth_service::login_user(
        &pool,
        LoginRequest {
            email_or_phone: "Jo@Example.com".into(),
            password: "hunter2".into(),
        },
    )
    .await?;
    let session = login.data.unwrap();
    assert_eq!(session.user.email, "jo@example.com");

    // A case-variant duplicate is a conflict, not a database error
    let duplicate = auth_service::register_user(
        &pool,
        RegisterRequest {
            name: "Jo Again".into(),
            email: "JO@EXAMPLE.COM".into(),
            phone: "+15550001002".into(),
            password: "hunter2".into(),
            role: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Refresh claims carry second-resolution expiries; space issuances out so
    // rotated tokens are distinct.
    tokio::time::sleep(StdDuration::from_millis(1100)).await;
    let first = session.refresh_token.clone();
    let rotated = auth_service::refresh_tokens(
        &pool,
        RefreshRequest {
            refresh_token: first.clone(),
        },
    )
    .await?;
    let second = rotated.data.unwrap().refresh_token;
    assert_ne!(first, second);

    // The superseded token is no longer honored
    let stale = auth_service::refresh_tokens(
        &pool,
        RefreshRequest {
            refresh_token: first,
        },
    )
    .await;
    assert!(matches!(stale, Err(AppError::Unauthorized(_))));

    // Logout clears the stored slot, so even the latest token stops working
    let auth_user = AuthUser {
        user_id: session.user.id,
        role: "user".into(),
    };
    auth_service::logout_user(&pool, &auth_user).await?;
    let after_logout = auth_service::refresh_tokens(
        &pool,
        RefreshRequest {
            refresh_token: second,
        },
    )
    .await;
    assert!(matches!(after_logout, Err(AppError::Unauthorized(_))));

    // OTP: a mismatched code never issues tokens
    auth_service::request_otp(
        &pool,
        OtpRequest {
            email: "jo@example.com".into(),
        },
    )
    .await?;
    let issued = latest_otp_code(&pool, "jo@example.com").await?;
    let wrong_code = if issued == "123456" { "654321" } else { "123456" };
    let mismatched = auth_service::verify_otp(
        &pool,
        OtpVerifyRequest {
            email: "jo@example.com".into(),
            code: wrong_code.into(),
        },
    )
    .await;
    assert!(matches!(mismatched, Err(AppError::BadRequest(_))));

    // An expired code is rejected even when it matches
    sqlx::query("UPDATE otp_codes SET expires_at = $1 WHERE email = $2")
        .bind(Utc::now() - Duration::minutes(1))
        .bind("jo@example.com")
        .execute(&pool)
        .await?;
    let expired = auth_service::verify_otp(
        &pool,
        OtpVerifyRequest {
            email: "jo@example.com".into(),
            code: issued,
        },
    )
    .await;
    assert!(matches!(expired, Err(AppError::BadRequest(_))));

    // A fresh code verifies, issues a session, and consumes every code
    auth_service::request_otp(
        &pool,
        OtpRequest {
            email: "jo@example.com".into(),
        },
    )
    .await?;
    let fresh = latest_otp_code(&pool, "jo@example.com").await?;
    let verified = auth_service::verify_otp(
        &pool,
        OtpVerifyRequest {
            email: "jo@example.com".into(),
            code: fresh,
        },
    )
    .await?;
    let otp_session = verified.data.unwrap();
    assert!(!otp_session.access_token.is_empty());
    assert!(!otp_session.refresh_token.is_empty());

    let remaining: (i64,) = sqlx::query_as("SELECT count(*) FROM otp_codes WHERE email = $1")
        .bind("jo@example.com")
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining.0, 0);

    Ok(())
}

async fn setup_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE order_items, orders, reviews, cart_items, wishlist_items, otp_codes, audit_logs, products, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

async fn latest_otp_code(pool: &DbPool, email: &str) -> anyhow::Result<String> {
    let row: (String,) = sqlx::query_as(
        "SELECT code FROM otp_codes WHERE email = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
