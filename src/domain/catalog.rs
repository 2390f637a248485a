use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use super::orders::MAX_AMOUNT;
use super::DomainError;
use crate::db;
use crate::models::{Product, ProductInput, Reward, RewardInput};

/// What a catalog delete actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    /// Row still referenced by history, hidden instead
    Deactivated,
}

fn clean_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn clean_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(DomainError::Validation("name: debe tener entre 1 y 200 caracteres".to_string()));
    }
    Ok(name.to_string())
}

fn check_stock(stock: Option<i32>) -> Result<(), DomainError> {
    match stock {
        Some(s) if s < 0 => Err(DomainError::Validation("stock: no puede ser negativo".to_string())),
        _ => Ok(()),
    }
}

pub fn normalize_product(input: &ProductInput) -> Result<ProductInput, DomainError> {
    if input.price < Decimal::ZERO {
        return Err(DomainError::Validation("price: no puede ser negativo".to_string()));
    }
    if input.price > MAX_AMOUNT {
        return Err(DomainError::Validation("price: excede el máximo permitido".to_string()));
    }
    check_stock(input.stock)?;

    Ok(ProductInput {
        name: clean_name(&input.name)?,
        description: clean_text(&input.description),
        price: input.price,
        stock: input.stock,
        image_url: clean_text(&input.image_url),
        active: input.active,
    })
}

pub fn normalize_reward(input: &RewardInput) -> Result<RewardInput, DomainError> {
    if input.points_cost <= 0 {
        return Err(DomainError::Validation("pointsCost: debe ser mayor a 0".to_string()));
    }
    check_stock(input.stock)?;

    Ok(RewardInput {
        name: clean_name(&input.name)?,
        description: clean_text(&input.description),
        points_cost: input.points_cost,
        stock: input.stock,
        image_url: clean_text(&input.image_url),
        active: input.active,
    })
}

pub async fn create_product(pool: &PgPool, input: &ProductInput) -> Result<Product, DomainError> {
    let input = normalize_product(input)?;
    Ok(db::catalog::insert_product(pool, &input).await?)
}

pub async fn update_product(pool: &PgPool, product_id: i64, input: &ProductInput) -> Result<Product, DomainError> {
    let input = normalize_product(input)?;
    Ok(db::catalog::update_product(pool, product_id, &input).await?)
}

/// Delete a product, or only deactivate it when past orders reference it
pub async fn remove_product(pool: &PgPool, product_id: i64) -> Result<Removal, DomainError> {
    let removal = if db::orders::product_has_orders(pool, product_id).await? {
        db::catalog::deactivate_product(pool, product_id)
            .await?
            .then_some(Removal::Deactivated)
    } else {
        db::catalog::delete_product(pool, product_id)
            .await?
            .then_some(Removal::Deleted)
    };

    let removal = removal.ok_or_else(|| DomainError::NotFound("Producto no encontrado".to_string()))?;
    info!(product_id, ?removal, "Product removed");
    Ok(removal)
}

pub async fn create_reward(pool: &PgPool, input: &RewardInput) -> Result<Reward, DomainError> {
    let input = normalize_reward(input)?;
    Ok(db::catalog::insert_reward(pool, &input).await?)
}

pub async fn update_reward(pool: &PgPool, reward_id: i64, input: &RewardInput) -> Result<Reward, DomainError> {
    let input = normalize_reward(input)?;
    Ok(db::catalog::update_reward(pool, reward_id, &input).await?)
}

/// Delete a reward, or only deactivate it when claims reference it
pub async fn remove_reward(pool: &PgPool, reward_id: i64) -> Result<Removal, DomainError> {
    let removal = if db::catalog::reward_has_claims(pool, reward_id).await? {
        db::catalog::deactivate_reward(pool, reward_id)
            .await?
            .then_some(Removal::Deactivated)
    } else {
        db::catalog::delete_reward(pool, reward_id)
            .await?
            .then_some(Removal::Deleted)
    };

    let removal = removal.ok_or_else(|| DomainError::NotFound("Recompensa no encontrada".to_string()))?;
    info!(reward_id, ?removal, "Reward removed");
    Ok(removal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_product() {
        let input = ProductInput {
            name: "  Café  ".to_string(),
            description: Some("   ".to_string()),
            price: dec!(45),
            stock: None,
            image_url: Some(" /img/cafe.png ".to_string()),
            active: None,
        };

        let clean = normalize_product(&input).unwrap();
        assert_eq!(clean.name, "Café");
        assert_eq!(clean.description, None);
        assert_eq!(clean.image_url.as_deref(), Some("/img/cafe.png"));

        let too_expensive = ProductInput {
            name: "Vitrina".to_string(),
            description: None,
            price: dec!(10000000000),
            stock: None,
            image_url: None,
            active: None,
        };
        assert!(normalize_product(&too_expensive).is_err());

        let negative = ProductInput {
            price: dec!(-1),
            ..clean
        };
        assert!(normalize_product(&negative).is_err());
    }

    #[test]
    fn test_normalize_reward() {
        let input = RewardInput {
            name: "Taza".to_string(),
            description: None,
            points_cost: 0,
            stock: Some(3),
            image_url: None,
            active: Some(true),
        };
        assert!(normalize_reward(&input).is_err());

        let ok = RewardInput { points_cost: 100, ..input };
        assert_eq!(normalize_reward(&ok).unwrap().points_cost, 100);

        let negative_stock = RewardInput { stock: Some(-1), ..ok };
        assert!(normalize_reward(&negative_stock).is_err());
    }
}
