use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;

use crate::db::errors::Result;
use crate::models::DashboardStats;

/// All rows of the `system_config` table
pub async fn load_config(pool: &PgPool) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM system_config")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().collect())
}

/// Upsert several keys in one statement
pub async fn upsert_config(pool: &PgPool, entries: &[(String, String)]) -> Result<u64> {
    if entries.is_empty() {
        return Ok(0);
    }

    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    let values: Vec<&str> = entries.iter().map(|(_, v)| v.as_str()).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO system_config (key, value, updated_at)
        SELECT k, v, NOW() FROM UNNEST($1::text[], $2::text[]) AS t(k, v)
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
        "#,
    )
    .bind(&keys[..])
    .bind(&values[..])
    .execute(pool)
    .await?;

    info!(keys = ?keys, "Upserted system configuration");
    Ok(result.rows_affected())
}

pub async fn dashboard_stats(pool: &PgPool) -> Result<DashboardStats> {
    let (total_users, points_outstanding): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(puntos), 0)::BIGINT FROM users WHERE role = 'USER'",
    )
    .fetch_one(pool)
    .await?;

    let (total_orders, scanned_orders): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_scanned) FROM orders",
    )
    .fetch_one(pool)
    .await?;

    let points_issued: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(points_earned), 0)::BIGINT FROM qr_scans",
    )
    .fetch_one(pool)
    .await?;

    let pending_claims: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reward_claims WHERE status = 'PENDING'",
    )
    .fetch_one(pool)
    .await?;

    Ok(DashboardStats {
        total_users,
        total_orders,
        scanned_orders,
        pending_claims,
        points_issued,
        points_outstanding,
    })
}
