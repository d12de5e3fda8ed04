use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::reviews::{CreateReviewRequest, ReviewList, ReviewWithAuthor, UpdateReviewRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
};

const MAX_COMMENT_LEN: usize = 1000;

pub async fn create_review(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_rating(payload.rating)?;
    validate_comment(&payload.comment)?;

    let product_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(pool)
        .await?;
    if product_exists.is_none() {
        return Err(AppError::NotFound);
    }

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM reviews WHERE user_id = $1 AND product_id = $2")
            .bind(user.user_id)
            .bind(payload.product_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "You have already reviewed this product".into(),
        ));
    }

    let review: Review = sqlx::query_as(
        r#"
        INSERT INTO reviews (id, user_id, product_id, rating, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.rating)
    .bind(payload.comment.trim())
    .fetch_one(pool)
    .await?;

    recompute_product_rating(pool, payload.product_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "review_create",
        Some("reviews"),
        Some(serde_json::json!({ "review_id": review.id, "product_id": payload.product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review created",
        review,
        Some(Meta::empty()),
    ))
}

pub async fn list_product_reviews(
    pool: &DbPool,
    product_id: Uuid,
) -> AppResult<ApiResponse<ReviewList>> {
    let items = sqlx::query_as::<_, ReviewWithAuthor>(
        r#"
        SELECT r.id, r.user_id, u.name AS author_name, r.product_id, r.rating, r.comment,
               r.created_at, r.updated_at
        FROM reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.product_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let existing: Option<Review> = sqlx::query_as("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    if existing.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let rating = payload.rating.unwrap_or(existing.rating);
    validate_rating(rating)?;
    let comment = payload.comment.unwrap_or(existing.comment);
    validate_comment(&comment)?;

    let review: Review = sqlx::query_as(
        r#"
        UPDATE reviews
        SET rating = $2, comment = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(rating)
    .bind(comment.trim())
    .fetch_one(pool)
    .await?;

    recompute_product_rating(pool, review.product_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "review_update",
        Some("reviews"),
        Some(serde_json::json!({ "review_id": review.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review updated",
        review,
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing: Option<Review> = sqlx::query_as("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    if existing.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    recompute_product_rating(pool, existing.product_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "review_delete",
        Some("reviews"),
        Some(serde_json::json!({ "review_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// `products.rating` and `products.review_count` are derived columns,
/// recomputed after every review mutation.
async fn recompute_product_rating(pool: &DbPool, product_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET rating = COALESCE((SELECT AVG(rating)::DOUBLE PRECISION
                               FROM reviews WHERE product_id = $1), 0),
            review_count = (SELECT count(*)::INT FROM reviews WHERE product_id = $1),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn validate_rating(rating: i32) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    Ok(())
}

fn validate_comment(comment: &str) -> Result<(), AppError> {
    if comment.trim().is_empty() {
        return Err(AppError::BadRequest("comment is required".into()));
    }
    if comment.len() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(
            "comment must be at most 1000 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn comment_bounds() {
        assert!(validate_comment("solid product").is_ok());
        assert!(validate_comment("   ").is_err());
        assert!(validate_comment(&"x".repeat(1001)).is_err());
    }
}
