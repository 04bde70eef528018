use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use cart_pricing_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "user").await?;
    seed_products(&pool).await?;
    seed_coupons(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
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
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
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

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        ("Canvas Tote", "Everyday carry-all tote bag", 3500, 120),
        ("Enamel Mug", "Camp-style enamel mug", 1800, 200),
        ("Linen Throw", "Stonewashed linen throw blanket", 8900, 40),
        ("Desk Organizer", "Walnut desk organizer", 5400, 75),
    ];

    for (name, desc, price, stock) in products {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .fetch_optional(pool)
        .await?;

        // Give the tote a couple of size variants on first seed.
        if let Some((product_id,)) = row {
            if name == "Canvas Tote" {
                for (variant_name, variant_price) in [("Small", 2900_i64), ("Large", 4200_i64)] {
                    sqlx::query(
                        r#"
                        INSERT INTO product_variants (id, product_id, name, price)
                        VALUES ($1, $2, $3, $4)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(product_id)
                    .bind(variant_name)
                    .bind(variant_price)
                    .execute(pool)
                    .await?;
                }
            }
        }
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    // (code, type, value, min_purchase, max_discount, usage_limit)
    let coupons: Vec<(&str, &str, i64, Option<i64>, Option<i64>, Option<i32>)> = vec![
        ("SAVE20", "percentage", 20, None, Some(5000), None),
        ("TENOFF", "fixed_amount", 1000, Some(2500), None, None),
        ("FREESHIP", "free_shipping", 0, Some(2000), None, None),
        ("LAUNCH", "percentage", 15, None, None, Some(100)),
    ];

    for (code, discount_type, value, min_purchase, max_discount, usage_limit) in coupons {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, value, min_purchase, max_discount, usage_limit)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(discount_type)
        .bind(value)
        .bind(min_purchase)
        .bind(max_discount)
        .bind(usage_limit)
        .execute(pool)
        .await?;
    }

    println!("Seeded coupons");
    Ok(())
}
