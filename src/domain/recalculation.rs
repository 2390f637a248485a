use rust_decimal::Decimal;
use sqlx::{Connection, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use super::batch::{BatchReport, BatchedMapper};
use super::DomainError;
use crate::config::RecalculationSettings;
use crate::db::{self, DatabaseError};

/// How user rows are written during a recalculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalculationMode {
    /// Small batches, every user updated on its own without a transaction
    PerRow,
    /// Larger batches, one transaction per batch with a savepoint per user
    TransactionalBatches,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecalculationReport {
    pub recalculated_users: u64,
    pub total_users: u64,
    pub failed_users: u64,
    pub multiplier: Decimal,
    pub old_ratio: Decimal,
    pub new_ratio: Decimal,
}

pub fn compute_multiplier(old_ratio: Decimal, new_ratio: Decimal) -> Result<Decimal, DomainError> {
    if old_ratio <= Decimal::ZERO || new_ratio <= Decimal::ZERO {
        return Err(DomainError::Validation(
            "Los ratios de puntos deben ser números positivos".to_string(),
        ));
    }
    new_ratio
        .checked_div(old_ratio)
        .ok_or_else(|| DomainError::Validation("Ratio fuera de rango".to_string()))
}

/// Rescale every ordinary user's `puntos` and `puntos_historicos` by
/// `new_ratio / old_ratio`.
///
/// Best effort: a user that fails to update is logged and skipped. Running it
/// twice with the same pair rescales twice.
#[tracing::instrument(skip(pool, settings))]
pub async fn recalculate_points(
    pool: &PgPool,
    settings: &RecalculationSettings,
    old_ratio: Decimal,
    new_ratio: Decimal,
    mode: RecalculationMode,
) -> Result<RecalculationReport, DomainError> {
    let multiplier = compute_multiplier(old_ratio, new_ratio)?;
    let user_ids = db::users::list_ordinary_user_ids(pool).await?;
    let total_users = user_ids.len() as u64;

    if old_ratio == new_ratio {
        info!(total_users, "Ratio unchanged, nothing to recalculate");
        return Ok(RecalculationReport {
            recalculated_users: total_users,
            total_users,
            failed_users: 0,
            multiplier,
            old_ratio,
            new_ratio,
        });
    }

    info!(total_users, %multiplier, ?mode, "Starting points recalculation");

    let report = match mode {
        RecalculationMode::PerRow => {
            let mapper = BatchedMapper::new(settings.row_batch_size, settings.pause);
            mapper
                .map_each(user_ids, |user_id| db::users::scale_user_points(pool, user_id, multiplier))
                .await
        }
        RecalculationMode::TransactionalBatches => {
            let mapper = BatchedMapper::new(settings.transactional_batch_size, settings.pause);
            let timeout = settings.batch_timeout;
            mapper
                .map_batches(user_ids, |batch| scale_batch(pool, batch, multiplier, timeout))
                .await
        }
    };

    log_report(&report);

    Ok(RecalculationReport {
        recalculated_users: report.succeeded,
        total_users,
        failed_users: report.failed,
        multiplier,
        old_ratio,
        new_ratio,
    })
}

/// One transaction for the batch, bounded by `timeout`; each user runs in a
/// savepoint so a failing row does not poison the rest of the batch.
async fn scale_batch(
    pool: &PgPool,
    user_ids: Vec<i64>,
    multiplier: Decimal,
    timeout: Duration,
) -> Result<u64, DatabaseError> {
    let work = async {
        let mut tx = pool.begin().await?;
        let mut succeeded = 0u64;

        for user_id in user_ids {
            let mut savepoint = (&mut *tx).begin().await?;
            match db::users::scale_user_points(&mut *savepoint, user_id, multiplier).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to recalculate user, continuing");
                    savepoint.rollback().await?;
                }
            }
        }

        tx.commit().await?;
        Ok::<u64, DatabaseError>(succeeded)
    };

    tokio::time::timeout(timeout, work).await.map_err(|_| {
        DatabaseError::TransactionError(format!("batch exceeded {}s timeout", timeout.as_secs()))
    })?
}

fn log_report(report: &BatchReport) {
    if report.failed > 0 {
        warn!(
            succeeded = report.succeeded,
            failed = report.failed,
            batches = report.batches,
            "Points recalculation finished with failures"
        );
    } else {
        info!(
            succeeded = report.succeeded,
            batches = report.batches,
            "Points recalculation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_compute_multiplier() {
        assert_eq!(compute_multiplier(dec!(1), dec!(2)).unwrap(), dec!(2));
        assert_eq!(compute_multiplier(dec!(0.1), dec!(0.05)).unwrap(), dec!(0.5));
        assert_eq!(compute_multiplier(dec!(0.3), dec!(0.3)).unwrap(), dec!(1));
    }

    #[test]
    fn test_compute_multiplier_rejects_non_positive() {
        assert!(matches!(
            compute_multiplier(dec!(0), dec!(1)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            compute_multiplier(dec!(1), dec!(-2)),
            Err(DomainError::Validation(_))
        ));
    }
}
