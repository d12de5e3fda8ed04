use axum::{Json, extract::State};
use axum_marketplace_api::{
    config::AppConfig,
    db::{DbPool, create_pool},
    dto::{
        cart::AddToCartRequest,
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
        reviews::CreateReviewRequest,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::Product,
    payments::PaymentClient,
    routes::{self, params::OrderListQuery},
    services::{admin_service, order_service, product_service, review_service},
    state::AppState,
};
use uuid::Uuid;

// Integration flow: user fills a cart -> places an order -> admin moves it
// through the status graph; a review updates the product's aggregate rating.
#[tokio::test]
async fn order_and_review_flow() -> anyhow::Result<()> {
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

    let pool = setup_pool(&database_url).await?;

    let user_id = create_user(&pool, "user", "user@example.com", "+15550000001").await?;
    let admin_id = create_user(&pool, "admin", "admin@example.com", "+15550000002").await?;
    let retailer_id =
        create_user(&pool, "retailer", "retailer@example.com", "+15550000003").await?;

    let product_id = create_product(&pool, retailer_id, 1000, 10).await?;

    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Adding a nonexistent product to the cart is a 404
    let state = AppState {
        pool: pool.clone(),
        payments: PaymentClient::new(&stub_config()),
    };
    let missing = routes::cart::add_to_cart(
        State(state),
        auth_user.clone(),
        Json(AddToCartRequest {
            product_id: Uuid::new_v4(),
            quantity: None,
        }),
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Two units in the cart
    sqlx::query("INSERT INTO cart_items (id, user_id, product_id, quantity) VALUES ($1, $2, $3, 2)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .execute(&pool)
        .await?;

    // Place the order
    let created = order_service::create_order(
        &pool,
        &auth_user,
        CreateOrderRequest {
            shipping_address: "42 Test Lane".into(),
            payment_intent_id: "pi_test_123".into(),
            time_slot: None,
            location: None,
        },
    )
    .await?;
    let order = created.data.unwrap().order;
    assert_eq!(order.total_amount, 2000);
    assert_eq!(order.status, "Processing");

    // Stock decremented, cart cleared
    let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(product.stock, 8);

    let cart_count: (i64,) = sqlx::query_as("SELECT count(*) FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(cart_count.0, 0);

    // A second order with an empty cart is rejected
    let empty = order_service::create_order(
        &pool,
        &auth_user,
        CreateOrderRequest {
            shipping_address: "42 Test Lane".into(),
            payment_intent_id: "pi_test_456".into(),
            time_slot: None,
            location: None,
        },
    )
    .await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    // Admin walks the order forward
    let shipped = admin_service::update_order_status(
        &pool,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Shipped".into(),
        },
    )
    .await?;
    assert_eq!(shipped.data.unwrap().status, "Shipped");

    let delivered = admin_service::update_order_status(
        &pool,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Delivered".into(),
        },
    )
    .await?;
    let delivered = delivered.data.unwrap();
    assert_eq!(delivered.status, "Delivered");
    assert!(delivered.delivered_at.is_some());

    // Delivered is terminal
    let cancel = admin_service::update_order_status(
        &pool,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Cancelled".into(),
        },
    )
    .await;
    assert!(matches!(cancel, Err(AppError::BadRequest(_))));

    // The caller's order list honors the status filter
    let delivered_orders = order_service::list_my_orders(
        &pool,
        &auth_user,
        OrderListQuery {
            page: None,
            per_page: None,
            status: Some("Delivered".into()),
            sort_order: None,
        },
    )
    .await?;
    assert_eq!(delivered_orders.data.unwrap().items.len(), 1);

    let processing_orders = order_service::list_my_orders(
        &pool,
        &auth_user,
        OrderListQuery {
            page: None,
            per_page: None,
            status: Some("Processing".into()),
            sort_order: None,
        },
    )
    .await?;
    assert!(processing_orders.data.unwrap().items.is_empty());

    // A product referenced by order history cannot be deleted
    let auth_retailer = AuthUser {
        user_id: retailer_id,
        role: "retailer".into(),
    };
    let blocked = product_service::delete_product(&pool, &auth_retailer, product_id).await;
    assert!(matches!(blocked, Err(AppError::Conflict(_))));

    // Review updates the product aggregate
    review_service::create_review(
        &pool,
        &auth_user,
        CreateReviewRequest {
            product_id,
            rating: 4,
            comment: "Solid widget".into(),
        },
    )
    .await?;

    let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(product.review_count, 1);
    assert!((product.rating - 4.0).abs() < f64::EPSILON);

    // One review per user per product
    let duplicate = review_service::create_review(
        &pool,
        &auth_user,
        CreateReviewRequest {
            product_id,
            rating: 5,
            comment: "Changed my mind".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    Ok(())
}

// Payment settings the cart handler never reaches.
fn stub_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".into(),
        port: 0,
        cors_origin: "http://localhost:5173".into(),
        payment_api_base: "http://127.0.0.1:9".into(),
        payment_secret_key: "sk_test".into(),
        payment_currency: "inr".into(),
    }
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

async fn create_user(
    pool: &DbPool,
    role: &str,
    email: &str,
    phone: &str,
) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash, role)
        VALUES ($1, $2, $3, $4, 'dummy', $5)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(role)
    .bind(email)
    .bind(phone)
    .bind(role)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn create_product(
    pool: &DbPool,
    owner_id: Uuid,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO products (id, title, description, category, price, stock, owner_id)
        VALUES ($1, 'Test Widget', 'A product for testing', 'misc', $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(price)
    .bind(stock)
    .bind(owner_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
