use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_retailer},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{FeaturedQuery, ProductQuery, ProductSortBy, SortOrder},
};

pub async fn list_products(
    pool: &DbPool,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT count(*) FROM products WHERE 1=1");
    push_filters(&mut count_builder, &query);
    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(pool)
        .await?;

    let sort_by = query.sort_by.as_ref().unwrap_or(&ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.as_ref().unwrap_or(&SortOrder::Desc);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM products WHERE 1=1");
    push_filters(&mut builder, &query);
    builder.push(" ORDER BY ");
    builder.push(sort_by.as_sql());
    builder.push(" ");
    builder.push(sort_order.as_sql());
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let items: Vec<Product> = builder.build_query_as().fetch_all(pool).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

fn push_filters(builder: &mut QueryBuilder<Postgres>, query: &ProductQuery) {
    if let Some(q) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{q}%");
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(category) = query
        .category
        .as_ref()
        .filter(|c| !c.is_empty() && c.as_str() != "all")
    {
        builder.push(" AND category = ");
        builder.push_bind(category.clone());
    }

    if let Some(min_price) = query.min_price {
        builder.push(" AND price >= ");
        builder.push_bind(min_price);
    }

    if let Some(max_price) = query.max_price {
        builder.push(" AND price <= ");
        builder.push_bind(max_price);
    }

    if let Some(min_rating) = query.min_rating {
        builder.push(" AND rating >= ");
        builder.push_bind(min_rating);
    }
}

pub async fn featured_products(
    pool: &DbPool,
    query: FeaturedQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let limit = query.limit.unwrap_or(8).clamp(1, 50);
    let items = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE featured = TRUE ORDER BY rating DESC, created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "Featured products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_product(pool: &DbPool, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let result = match result {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Product", result, None))
}

pub async fn my_products(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<ProductList>> {
    ensure_retailer(user)?;
    let items = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "Your products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_product(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_retailer(user)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    if payload.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }

    let id = Uuid::new_v4();
    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (id, title, description, category, price, image_urls, stock, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.title)
    .bind(payload.description)
    .bind(payload.category)
    .bind(payload.price)
    .bind(payload.image_urls)
    .bind(payload.stock)
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    ensure_owner_or_admin(user, existing.owner_id)?;

    let title = payload.title.unwrap_or(existing.title);
    let description = payload.description.unwrap_or(existing.description);
    let category = payload.category.unwrap_or(existing.category);
    let price = payload.price.unwrap_or(existing.price);
    let image_urls = payload.image_urls.unwrap_or(existing.image_urls);
    let stock = payload.stock.unwrap_or(existing.stock);
    let featured = payload.featured.unwrap_or(existing.featured);

    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET title = $2, description = $3, category = $4, price = $5, image_urls = $6,
            stock = $7, featured = $8, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(category)
    .bind(price)
    .bind(image_urls)
    .bind(stock)
    .bind(featured)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT owner_id FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let (owner_id,) = match existing {
        Some(row) => row,
        None => return Err(AppError::NotFound),
    };

    ensure_owner_or_admin(user, owner_id)?;

    // Order items keep a FK to the product so order history stays intact.
    if let Err(err) = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
    {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_foreign_key_violation() {
                return Err(AppError::Conflict(
                    "Product appears in existing orders and cannot be deleted".into(),
                ));
            }
        }
        return Err(err.into());
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn ensure_owner_or_admin(user: &AuthUser, owner_id: Uuid) -> Result<(), AppError> {
    if user.role != "admin" && user.user_id != owner_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}
