use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    roles::Role,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let admin_id =
        ensure_user(&pool, "admin@example.com", "admin123", "Admin", &[Role::Admin]).await?;
    let client_id =
        ensure_user(&pool, "client@example.com", "client123", "Claire", &[Role::Client]).await?;
    ensure_user(&pool, "staff@example.com", "staff123", "Sam", &[Role::Employee]).await?;
    ensure_user(&pool, "supplier@example.com", "supplier123", "Sofia", &[Role::Supplier]).await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Client ID: {client_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    name: &str,
    roles: &[Role],
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .fetch_one(pool)
    .await?;

    for role in roles {
        sqlx::query(
            r#"
            INSERT INTO user_roles (id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    }

    println!("Ensured user {email} (roles={roles:?})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    // (name, description, price in cents, stock, category, featured)
    let products = [
        ("Linen Shirt", "Breathable summer shirt", 3990, 40, "clothing", true),
        ("Wool Scarf", "Soft merino scarf", 2450, 3, "clothing", false),
        ("Ceramic Mug", "Hand-glazed 350 ml mug", 1200, 100, "home", true),
        ("Desk Lamp", "Dimmable LED lamp", 5900, 12, "home", false),
        ("Notebook A5", "Dotted, 120 pages", 850, 250, "stationery", false),
        ("Fountain Pen", "Steel nib, refillable", 3400, 4, "stationery", true),
    ];

    for (name, desc, cents, stock, category, featured) in products {
        sqlx::query(
            r#"
            INSERT INTO products (name, description, price, stock, image_url, category, featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(desc)
        .bind(Decimal::new(cents, 2))
        .bind(stock)
        .bind(format!("/images/{}.jpg", name.to_lowercase().replace(' ', "-")))
        .bind(category)
        .bind(featured)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
