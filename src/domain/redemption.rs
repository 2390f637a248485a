use sqlx::PgPool;
use tracing::info;

use super::DomainError;
use crate::db::{self, with_retry};
use crate::models::{ClaimStatus, Reward, RewardClaim};

/// Outcome of a successful claim
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub claim: RewardClaim,
    pub remaining_points: i64,
}

/// Pure eligibility check for redeeming `reward` with `balance` points
pub fn check_redemption(reward: &Reward, balance: i64) -> Result<(), DomainError> {
    if !reward.active {
        return Err(DomainError::NotFound("Recompensa no disponible".to_string()));
    }
    if matches!(reward.stock, Some(stock) if stock <= 0) {
        return Err(DomainError::OutOfStock);
    }
    if balance < reward.points_cost {
        return Err(DomainError::InsufficientPoints {
            balance,
            required: reward.points_cost,
        });
    }
    Ok(())
}

/// Redeem a reward: debit the user, take one unit of stock and open a
/// `PENDING` claim, all under row locks in one transaction.
///
/// Reward is locked before the user, always in that order.
#[tracing::instrument(skip(pool))]
pub async fn create_claim(pool: &PgPool, user_id: i64, reward_id: i64) -> Result<ClaimReceipt, DomainError> {
    let receipt = with_retry(3, || create_claim_once(pool, user_id, reward_id)).await?;

    info!(
        claim_id = receipt.claim.id,
        points_spent = receipt.claim.points_spent,
        remaining_points = receipt.remaining_points,
        "Reward claimed"
    );
    Ok(receipt)
}

async fn create_claim_once(pool: &PgPool, user_id: i64, reward_id: i64) -> Result<ClaimReceipt, DomainError> {
    let mut tx = pool.begin().await?;

    let reward = db::catalog::lock_reward(&mut tx, reward_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Recompensa no encontrada".to_string()))?;
    let user = db::users::lock_user(&mut tx, user_id).await?;

    check_redemption(&reward, user.puntos)?;

    let remaining_points = db::users::adjust_spendable_points(&mut tx, user_id, -reward.points_cost).await?;
    db::catalog::adjust_reward_stock(&mut tx, reward_id, -1).await?;
    let claim = db::claims::insert_claim(&mut tx, user_id, reward_id, reward.points_cost).await?;

    tx.commit().await?;

    Ok(ClaimReceipt {
        claim,
        remaining_points,
    })
}

/// Move a claim along its lifecycle. Rejecting a pending claim refunds the
/// points and puts the unit back in stock.
#[tracing::instrument(skip(pool, admin_notes))]
pub async fn validate_claim(
    pool: &PgPool,
    claim_id: i64,
    next: ClaimStatus,
    admin_id: i64,
    admin_notes: Option<&str>,
) -> Result<RewardClaim, DomainError> {
    let mut tx = pool.begin().await?;

    let claim = db::claims::lock_claim(&mut tx, claim_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Canje no encontrado".to_string()))?;

    let current = claim
        .status()
        .ok_or_else(|| DomainError::Internal(format!("unknown claim status {}", claim.status)))?;

    if !current.can_transition_to(next) {
        return Err(DomainError::InvalidTransition {
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    if next == ClaimStatus::Rejected {
        db::users::adjust_spendable_points(&mut tx, claim.user_id, claim.points_spent).await?;
        db::catalog::adjust_reward_stock(&mut tx, claim.reward_id, 1).await?;
    }

    let updated = db::claims::update_claim_status(&mut tx, claim_id, next, admin_id, admin_notes).await?;
    tx.commit().await?;

    info!(
        claim_id,
        from = current.as_str(),
        to = next.as_str(),
        admin_id,
        "Claim status changed"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reward(points_cost: i64, stock: Option<i32>, active: bool) -> Reward {
        Reward {
            id: 1,
            name: "Taza".to_string(),
            description: None,
            points_cost,
            stock,
            image_url: None,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insufficient_points_rejected() {
        let result = check_redemption(&reward(100, Some(5), true), 50);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientPoints {
                balance: 50,
                required: 100
            })
        ));
    }

    #[test]
    fn test_exact_balance_is_enough() {
        assert!(check_redemption(&reward(100, Some(1), true), 100).is_ok());
        // unlimited stock
        assert!(check_redemption(&reward(100, None, true), 250).is_ok());
    }

    #[test]
    fn test_out_of_stock_and_inactive() {
        assert!(matches!(
            check_redemption(&reward(10, Some(0), true), 500),
            Err(DomainError::OutOfStock)
        ));
        assert!(matches!(
            check_redemption(&reward(10, None, false), 500),
            Err(DomainError::NotFound(_))
        ));
    }
}
