use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::db::errors::{DatabaseError, Result};
use crate::models::{Product, ProductInput, Reward, RewardInput};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, image_url, active, created_at, updated_at";
const REWARD_COLUMNS: &str =
    "id, name, description, points_cost, stock, image_url, active, created_at, updated_at";

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub async fn list_products(pool: &PgPool, include_inactive: bool) -> Result<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE active OR $1 ORDER BY name"
    ))
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(products)
}

pub async fn get_product(pool: &PgPool, product_id: i64) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

pub async fn get_products_by_ids(conn: &mut PgConnection, ids: &[i64]) -> Result<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(conn)
    .await?;

    Ok(products)
}

pub async fn insert_product(pool: &PgPool, input: &ProductInput) -> Result<Product> {
    let product = sqlx::query_as::<_, Product>(&format!(
        r#"
        INSERT INTO products (name, description, price, stock, image_url, active)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, TRUE))
        RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(input.active)
    .fetch_one(pool)
    .await?;

    info!(product_id = product.id, "Created product");
    Ok(product)
}

pub async fn update_product(pool: &PgPool, product_id: i64, input: &ProductInput) -> Result<Product> {
    sqlx::query_as::<_, Product>(&format!(
        r#"
        UPDATE products SET
            name = $2, description = $3, price = $4, stock = $5, image_url = $6,
            active = COALESCE($7, active), updated_at = NOW()
        WHERE id = $1
        RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(product_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(input.active)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("product {}", product_id)))
}

pub async fn delete_product(pool: &PgPool, product_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_product(pool: &PgPool, product_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE products SET active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

pub async fn list_rewards(pool: &PgPool, include_inactive: bool) -> Result<Vec<Reward>> {
    let rewards = sqlx::query_as::<_, Reward>(&format!(
        "SELECT {REWARD_COLUMNS} FROM rewards WHERE active OR $1 ORDER BY points_cost, name"
    ))
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(rewards)
}

/// Lock a reward row for the remainder of the transaction
pub async fn lock_reward(conn: &mut PgConnection, reward_id: i64) -> Result<Option<Reward>> {
    let reward = sqlx::query_as::<_, Reward>(&format!(
        "SELECT {REWARD_COLUMNS} FROM rewards WHERE id = $1 FOR UPDATE"
    ))
    .bind(reward_id)
    .fetch_optional(conn)
    .await?;

    Ok(reward)
}

/// Move finite stock by `delta`; unlimited (NULL) stock is left untouched
pub async fn adjust_reward_stock(conn: &mut PgConnection, reward_id: i64, delta: i32) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE rewards SET stock = stock + $2, updated_at = NOW()
        WHERE id = $1 AND stock IS NOT NULL
        "#,
    )
    .bind(reward_id)
    .bind(delta)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn insert_reward(pool: &PgPool, input: &RewardInput) -> Result<Reward> {
    let reward = sqlx::query_as::<_, Reward>(&format!(
        r#"
        INSERT INTO rewards (name, description, points_cost, stock, image_url, active)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, TRUE))
        RETURNING {REWARD_COLUMNS}
        "#
    ))
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.points_cost)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(input.active)
    .fetch_one(pool)
    .await?;

    info!(reward_id = reward.id, "Created reward");
    Ok(reward)
}

pub async fn update_reward(pool: &PgPool, reward_id: i64, input: &RewardInput) -> Result<Reward> {
    sqlx::query_as::<_, Reward>(&format!(
        r#"
        UPDATE rewards SET
            name = $2, description = $3, points_cost = $4, stock = $5, image_url = $6,
            active = COALESCE($7, active), updated_at = NOW()
        WHERE id = $1
        RETURNING {REWARD_COLUMNS}
        "#
    ))
    .bind(reward_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.points_cost)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(input.active)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("reward {}", reward_id)))
}

pub async fn reward_has_claims(pool: &PgPool, reward_id: i64) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM reward_claims WHERE reward_id = $1)",
    )
    .bind(reward_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn delete_reward(pool: &PgPool, reward_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM rewards WHERE id = $1")
        .bind(reward_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_reward(pool: &PgPool, reward_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE rewards SET active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(reward_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
