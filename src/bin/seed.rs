use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_marketplace_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(
        &pool,
        "Admin",
        "admin@example.com",
        "+10000000001",
        "admin123",
        "admin",
    )
    .await?;
    let user_id = ensure_user(
        &pool,
        "Sample User",
        "user@example.com",
        "+10000000002",
        "user123",
        "user",
    )
    .await?;
    let retailer_id = ensure_user(
        &pool,
        "Sample Retailer",
        "retailer@example.com",
        "+10000000003",
        "retailer123",
        "retailer",
    )
    .await?;
    seed_products(&pool, retailer_id).await?;

    println!("Seed completed. Admin: {admin_id}, User: {user_id}, Retailer: {retailer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    phone: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool, owner_id: Uuid) -> anyhow::Result<()> {
    let products = vec![
        (
            "Masala Chai Sampler",
            "Six single-origin chai blends",
            "grocery",
            49900_i64,
            120,
            true,
        ),
        (
            "Handwoven Cotton Scarf",
            "Lightweight scarf in natural dyes",
            "apparel",
            129900_i64,
            40,
            true,
        ),
        (
            "Ceramic Serving Bowl",
            "Stoneware bowl, dishwasher safe",
            "home",
            89900_i64,
            25,
            false,
        ),
        (
            "Bamboo Desk Organizer",
            "Five compartments, oiled finish",
            "office",
            59900_i64,
            60,
            false,
        ),
    ];

    for (title, desc, category, price, stock, featured) in products {
        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE title = $1 AND owner_id = $2")
                .bind(title)
                .bind(owner_id)
                .fetch_optional(pool)
                .await?;
        if exists.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, category, price, stock, owner_id, featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(desc)
        .bind(category)
        .bind(price)
        .bind(stock)
        .bind(owner_id)
        .bind(featured)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
