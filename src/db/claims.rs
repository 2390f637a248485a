use sqlx::{PgConnection, PgPool};

use crate::db::errors::Result;
use crate::models::{ClaimDetail, ClaimStatus, RewardClaim};

const CLAIM_COLUMNS: &str = r#"
    id, user_id, reward_id, points_spent, status, admin_notes,
    validated_by, validated_at, created_at
"#;

const CLAIM_DETAIL_SELECT: &str = r#"
    SELECT
        c.id, c.user_id, u.name AS user_name, u.email AS user_email,
        c.reward_id, r.name AS reward_name, c.points_spent, c.status,
        c.admin_notes, c.validated_at, c.created_at
    FROM reward_claims c
    JOIN users u ON u.id = c.user_id
    JOIN rewards r ON r.id = c.reward_id
"#;

pub async fn insert_claim(
    conn: &mut PgConnection,
    user_id: i64,
    reward_id: i64,
    points_spent: i64,
) -> Result<RewardClaim> {
    let claim = sqlx::query_as::<_, RewardClaim>(&format!(
        r#"
        INSERT INTO reward_claims (user_id, reward_id, points_spent, status)
        VALUES ($1, $2, $3, 'PENDING')
        RETURNING {CLAIM_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(reward_id)
    .bind(points_spent)
    .fetch_one(conn)
    .await?;

    Ok(claim)
}

pub async fn lock_claim(conn: &mut PgConnection, claim_id: i64) -> Result<Option<RewardClaim>> {
    let claim = sqlx::query_as::<_, RewardClaim>(&format!(
        "SELECT {CLAIM_COLUMNS} FROM reward_claims WHERE id = $1 FOR UPDATE"
    ))
    .bind(claim_id)
    .fetch_optional(conn)
    .await?;

    Ok(claim)
}

pub async fn update_claim_status(
    conn: &mut PgConnection,
    claim_id: i64,
    status: ClaimStatus,
    admin_id: i64,
    admin_notes: Option<&str>,
) -> Result<RewardClaim> {
    let claim = sqlx::query_as::<_, RewardClaim>(&format!(
        r#"
        UPDATE reward_claims SET
            status = $2,
            validated_by = $3,
            validated_at = NOW(),
            admin_notes = COALESCE($4, admin_notes)
        WHERE id = $1
        RETURNING {CLAIM_COLUMNS}
        "#
    ))
    .bind(claim_id)
    .bind(status.as_str())
    .bind(admin_id)
    .bind(admin_notes)
    .fetch_one(conn)
    .await?;

    Ok(claim)
}

pub async fn list_claims_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<ClaimDetail>> {
    let claims = sqlx::query_as::<_, ClaimDetail>(&format!(
        "{CLAIM_DETAIL_SELECT} WHERE c.user_id = $1 ORDER BY c.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(claims)
}

pub async fn list_claims(pool: &PgPool, status: Option<ClaimStatus>) -> Result<Vec<ClaimDetail>> {
    let claims = sqlx::query_as::<_, ClaimDetail>(&format!(
        "{CLAIM_DETAIL_SELECT} WHERE $1::text IS NULL OR c.status = $1 ORDER BY c.created_at DESC"
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    Ok(claims)
}
