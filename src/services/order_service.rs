use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
};

#[derive(Debug, sqlx::FromRow)]
struct CartProductRow {
    product_id: Uuid,
    quantity: i32,
    price: i64,
    stock: i32,
    title: String,
}

/// Snapshot the cart into an immutable order. Runs in one transaction with
/// the product rows locked: stock is checked and decremented exactly once,
/// the total is computed from current prices, and the cart is cleared.
/// Cancelling later does not restore stock.
pub async fn create_order(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if user.role == "admin" {
        return Err(AppError::Forbidden);
    }
    if payload.shipping_address.trim().is_empty() {
        return Err(AppError::BadRequest("shipping_address is required".into()));
    }
    if payload.payment_intent_id.trim().is_empty() {
        return Err(AppError::BadRequest("payment_intent_id is required".into()));
    }

    let mut txn = pool.begin().await?;

    let rows: Vec<CartProductRow> = sqlx::query_as(
        r#"
        SELECT ci.product_id, ci.quantity, p.price, p.stock, p.title
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        FOR UPDATE OF p
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&mut *txn)
    .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let total_amount = validate_and_total(&rows)?;

    let order_id = Uuid::new_v4();
    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders
            (id, user_id, total_amount, status, shipping_address, payment_intent_id,
             time_slot, location_lat, location_lng)
        VALUES ($1, $2, $3, 'Processing', $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .bind(total_amount)
    .bind(payload.shipping_address.trim())
    .bind(payload.payment_intent_id.trim())
    .bind(payload.time_slot)
    .bind(payload.location.as_ref().map(|l| l.lat))
    .bind(payload.location.as_ref().map(|l| l.lng))
    .fetch_one(&mut *txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(rows.len());
    for row in &rows {
        let item: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(row.product_id)
        .bind(row.quantity)
        .bind(row.price)
        .fetch_one(&mut *txn)
        .await?;
        items.push(item);

        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
            .bind(row.product_id)
            .bind(row.quantity)
            .execute(&mut *txn)
            .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(&mut *txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

fn validate_and_total(rows: &[CartProductRow]) -> AppResult<i64> {
    let mut total: i64 = 0;
    for row in rows {
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if row.stock < row.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                row.title
            )));
        }
        total += row.price * (row.quantity as i64);
    }
    Ok(total)
}

pub async fn list_my_orders(
    pool: &DbPool,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let status = query.status.as_ref().filter(|s| !s.is_empty());
    if let Some(status) = status {
        if OrderStatus::parse(status).is_none() {
            return Err(AppError::BadRequest("Invalid order status".into()));
        }
    }

    let (items, total) = match status {
        Some(status) => {
            let sql = format!(
                "SELECT * FROM orders WHERE user_id = $1 AND status = $2 ORDER BY created_at {} LIMIT $3 OFFSET $4",
                sort_order.as_sql()
            );
            let items = sqlx::query_as::<_, Order>(&sql)
                .bind(user.user_id)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            let total: (i64,) =
                sqlx::query_as("SELECT count(*) FROM orders WHERE user_id = $1 AND status = $2")
                    .bind(user.user_id)
                    .bind(status)
                    .fetch_one(pool)
                    .await?;
            (items, total.0)
        }
        None => {
            let sql = format!(
                "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at {} LIMIT $2 OFFSET $3",
                sort_order.as_sql()
            );
            let items = sqlx::query_as::<_, Order>(&sql)
                .bind(user.user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            let total: (i64,) = sqlx::query_as("SELECT count(*) FROM orders WHERE user_id = $1")
                .bind(user.user_id)
                .fetch_one(pool)
                .await?;
            (items, total.0)
        }
    };

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.user_id != user.user_id && user.role != "admin" {
        return Err(AppError::Forbidden);
    }

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order.id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "Order",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(quantity: i32, price: i64, stock: i32) -> CartProductRow {
        CartProductRow {
            product_id: Uuid::new_v4(),
            quantity,
            price,
            stock,
            title: "widget".into(),
        }
    }

    #[test]
    fn total_sums_price_times_quantity() {
        let rows = vec![row(2, 1000, 10), row(3, 250, 5)];
        assert_eq!(validate_and_total(&rows).unwrap(), 2750);
    }

    #[test]
    fn insufficient_stock_is_rejected() {
        let rows = vec![row(4, 1000, 3)];
        assert!(matches!(
            validate_and_total(&rows),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let rows = vec![row(0, 1000, 3)];
        assert!(validate_and_total(&rows).is_err());
    }
}
