use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::{debug, info};

use crate::db::errors::{DatabaseError, Result};
use crate::models::{QrScan, SessionRecord, User};

const USER_COLUMNS: &str = r#"
    id, email, cedula, name, password_hash, role,
    puntos, puntos_historicos, profile_completed, created_at, updated_at
"#;

/// Fields required to create an account
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub cedula: Option<&'a str>,
    pub name: &'a str,
    pub password_hash: Option<&'a str>,
    pub profile_completed: bool,
}

/// Insert a new user; duplicate email or cedula becomes an `IntegrityError`
pub async fn insert_user(pool: &PgPool, new_user: &NewUser<'_>) -> Result<User> {
    debug!(email = %new_user.email, "Inserting user");

    sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, cedula, name, password_hash, profile_completed)
        VALUES (LOWER($1), $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(new_user.email)
    .bind(new_user.cedula)
    .bind(new_user.name)
    .bind(new_user.password_hash)
    .bind(new_user.profile_completed)
    .fetch_one(pool)
    .await
    .map_err(map_unique_violation)
}

pub async fn get_user_by_id<'e, E>(executor: E, user_id: i64) -> Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

/// Load a user row with `FOR UPDATE` inside an open transaction
pub async fn lock_user(conn: &mut PgConnection, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"))
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Page through users, optionally filtering on email, name or cedula
pub async fn list_users(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<User>, i64)> {
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()));

    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS} FROM users
        WHERE $1::text IS NULL
            OR LOWER(email) LIKE $1
            OR LOWER(name) LIKE $1
            OR cedula LIKE $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(&pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users
        WHERE $1::text IS NULL
            OR LOWER(email) LIKE $1
            OR LOWER(name) LIKE $1
            OR cedula LIKE $1
        "#,
    )
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    Ok((users, total))
}

/// Admin edit of name/role and a signed adjustment of the spendable balance.
/// The balance never drops below zero.
pub async fn update_user_admin(
    pool: &PgPool,
    user_id: i64,
    name: Option<&str>,
    role: Option<&str>,
    points_adjustment: i64,
) -> Result<User> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET
            name = COALESCE($2, name),
            role = COALESCE($3, role),
            puntos = GREATEST(puntos + $4, 0),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(name)
    .bind(role)
    .bind(points_adjustment)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))
}

/// Mark an OAuth-created profile as complete
pub async fn complete_profile(
    pool: &PgPool,
    user_id: i64,
    cedula: &str,
    name: Option<&str>,
    password_hash: Option<&str>,
) -> Result<User> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET
            cedula = $2,
            name = COALESCE($3, name),
            password_hash = COALESCE($4, password_hash),
            profile_completed = TRUE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(cedula)
    .bind(name)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
    .map_err(map_unique_violation)?
    .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))
}

/// Credit points to both the spendable and the lifetime counters.
/// Returns the new spendable balance.
pub async fn credit_points(conn: &mut PgConnection, user_id: i64, points: i64) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users SET
            puntos = puntos + $2,
            puntos_historicos = puntos_historicos + $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING puntos
        "#,
    )
    .bind(user_id)
    .bind(points)
    .fetch_optional(conn)
    .await?;

    balance.ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))
}

/// Move the spendable balance by `delta` (negative to debit). Returns the new balance.
pub async fn adjust_spendable_points(conn: &mut PgConnection, user_id: i64, delta: i64) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users SET puntos = puntos + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING puntos
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .fetch_optional(conn)
    .await?;

    balance.ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))
}

/// Ids of every ordinary (non-admin) user, in a stable order
pub async fn list_ordinary_user_ids(pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM users WHERE role = 'USER' ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Rescale one user's balances by `multiplier`, rounding half away from zero
pub async fn scale_user_points<'e, E>(executor: E, user_id: i64, multiplier: Decimal) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE users SET
            puntos = ROUND(puntos * $2::numeric)::BIGINT,
            puntos_historicos = ROUND(puntos_historicos * $2::numeric)::BIGINT,
            updated_at = NOW()
        WHERE id = $1 AND role = 'USER'
        "#,
    )
    .bind(user_id)
    .bind(multiplier)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub async fn list_scans_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<QrScan>> {
    let scans = sqlx::query_as::<_, QrScan>(
        r#"
        SELECT id, order_id, scan_code, user_id, points_earned, scanned_at
        FROM qr_scans
        WHERE user_id = $1
        ORDER BY scanned_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(scans)
}

/// Create or refresh the account behind an OAuth login (no password, profile incomplete)
pub async fn upsert_oauth_user(pool: &PgPool, email: &str, name: &str) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, name, profile_completed)
        VALUES (LOWER($1), $2, FALSE)
        ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(email)
    .bind(name)
    .fetch_one(pool)
    .await?;

    info!(user_id = user.id, "OAuth user upserted");
    Ok(user)
}

pub async fn upsert_session(
    pool: &PgPool,
    session_token: &str,
    user_id: i64,
    expires: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (session_token, user_id, expires)
        VALUES ($1, $2, $3)
        ON CONFLICT (session_token) DO UPDATE SET expires = EXCLUDED.expires
        "#,
    )
    .bind(session_token)
    .bind(user_id)
    .bind(expires)
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a live (non-expired) OAuth session
pub async fn get_active_session(pool: &PgPool, session_token: &str) -> Result<Option<SessionRecord>> {
    let session = sqlx::query_as::<_, SessionRecord>(
        r#"
        SELECT session_token, user_id, expires
        FROM sessions
        WHERE session_token = $1 AND expires > NOW()
        "#,
    )
    .bind(session_token)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

pub async fn delete_session(pool: &PgPool, session_token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE session_token = $1")
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) fn map_unique_violation(e: sqlx::Error) -> DatabaseError {
    if let Some(db_error) = e.as_database_error() {
        if db_error.code().as_deref() == Some("23505") {
            let constraint = db_error.constraint().unwrap_or("unique").to_string();
            return DatabaseError::IntegrityError(constraint);
        }
    }
    DatabaseError::QueryError(e)
}
