use sqlx::PgPool;
use tracing::{info, warn};

use super::settings::load_settings;
use super::DomainError;
use crate::auth::AuthenticatedIdentity;
use crate::db::{self, with_retry};
use crate::models::{Order, OrderWithItems};

const MAX_SCAN_CODE_LEN: usize = 128;

/// Outcome of a successful scan
#[derive(Debug, Clone)]
pub struct ScanCredit {
    pub order: OrderWithItems,
    pub points_earned: i64,
    pub new_total_points: i64,
    /// New balance is above the configured `pointsLimit`
    pub points_warning: bool,
}

/// Trim and sanity-check a scan code taken from a URL
pub fn normalize_scan_code(raw: &str) -> Result<String, DomainError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(DomainError::Validation("Código QR requerido".to_string()));
    }
    if code.len() > MAX_SCAN_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(DomainError::Validation("Código QR inválido".to_string()));
    }
    Ok(code.to_string())
}

/// Read-only preview of the order behind a scan code
#[tracing::instrument(skip(pool))]
pub async fn preview_scan(pool: &PgPool, code: &str) -> Result<OrderWithItems, DomainError> {
    let code = normalize_scan_code(code)?;

    db::orders::get_order_by_code(pool, &code)
        .await?
        .ok_or_else(|| DomainError::NotFound("Código QR no encontrado".to_string()))
}

/// Credit the points of the order behind `code` to the caller.
///
/// Lock order, check, mark scanned, write the audit row and credit the user all
/// happen in one transaction. Concurrent scans of the same code serialise on
/// the order row lock; the loser sees `AlreadyScanned`.
#[tracing::instrument(skip(pool, identity), fields(user_id = identity.user_id))]
pub async fn credit_scan(
    pool: &PgPool,
    code: &str,
    identity: &AuthenticatedIdentity,
) -> Result<ScanCredit, DomainError> {
    let code = normalize_scan_code(code)?;
    let settings = load_settings(pool).await?;

    let (order, new_total_points) =
        with_retry(3, || credit_scan_once(pool, &code, identity.user_id)).await?;

    let items = db::orders::get_order_items(pool, order.id).await?;
    let points_warning = settings.exceeds_points_limit(new_total_points);

    if points_warning {
        warn!(
            user_id = identity.user_id,
            balance = new_total_points,
            limit = settings.points_limit,
            "User balance above configured points limit"
        );
    }

    info!(
        order_id = order.id,
        points_earned = order.total_points,
        new_total_points,
        "QR scan credited"
    );

    Ok(ScanCredit {
        points_earned: order.total_points,
        new_total_points,
        points_warning,
        order: OrderWithItems { order, items },
    })
}

async fn credit_scan_once(pool: &PgPool, code: &str, user_id: i64) -> Result<(Order, i64), DomainError> {
    let mut tx = pool.begin().await?;

    let order = db::orders::lock_order_by_code(&mut tx, code)
        .await?
        .ok_or_else(|| DomainError::NotFound("Código QR no encontrado".to_string()))?;

    if order.is_scanned {
        // Dropping the transaction rolls back and releases the lock
        let scanned_at = order.scanned_at.unwrap_or(order.created_at);
        return Err(DomainError::AlreadyScanned { scanned_at });
    }

    let order = db::orders::mark_order_scanned(&mut tx, order.id, user_id).await?;
    db::orders::insert_qr_scan(&mut tx, &order, user_id).await?;
    let new_total_points = db::users::credit_points(&mut tx, user_id, order.total_points).await?;

    tx.commit().await?;

    Ok((order, new_total_points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scan_code() {
        assert_eq!(normalize_scan_code("  ABC-123_x ").unwrap(), "ABC-123_x");

        assert!(matches!(normalize_scan_code(""), Err(DomainError::Validation(_))));
        assert!(matches!(normalize_scan_code("   "), Err(DomainError::Validation(_))));
        assert!(matches!(normalize_scan_code("abc/../x"), Err(DomainError::Validation(_))));
        assert!(matches!(normalize_scan_code(&"A".repeat(129)), Err(DomainError::Validation(_))));
    }
}
