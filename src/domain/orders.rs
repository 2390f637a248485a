//! Admin-side order ledger: creation with product snapshots, listing,
//! deletion of unscanned orders and export-then-delete backups.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;

use super::settings::{load_settings, points_for_amount};
use super::DomainError;
use crate::db::{self, orders::NewOrder, orders::NewOrderItem};
use crate::models::{CreateOrderRequest, OrderItemInput, OrderWithItems, Product};

const MAX_ITEMS_PER_ORDER: usize = 100;
const MAX_QUANTITY: i32 = 10_000;
const DEFAULT_BACKUP_AGE_DAYS: i64 = 90;

/// Largest value a `NUMERIC(12, 2)` money column holds
/// (999_999_999_999 scaled by 2; mantissa split as hi=0, mid=0xE8, lo=0xD4A5_0FFF)
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// A freshly created order and the payload to print in its QR code
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: OrderWithItems,
    pub qr_payload: String,
}

#[derive(Debug, Clone)]
pub struct OrderBackup {
    pub exported_at: DateTime<Utc>,
    pub orders: Vec<OrderWithItems>,
    pub deleted_orders: u64,
}

/// Random, URL-safe scan code
pub fn generate_scan_code() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Relative URL encoded in the QR; the scanning client resolves it against its own host
pub fn qr_payload(scan_code: &str) -> String {
    format!("/scan/{}", scan_code)
}

/// Resolve request lines into priced snapshots.
///
/// A line referencing a catalog product takes its name and price from the
/// product unless the request overrides them; a free-form line must carry both.
pub fn build_line_items(
    inputs: &[OrderItemInput],
    products: &HashMap<i64, Product>,
) -> Result<Vec<NewOrderItem>, DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::Validation("La orden debe tener al menos un producto".to_string()));
    }
    if inputs.len() > MAX_ITEMS_PER_ORDER {
        return Err(DomainError::Validation(format!(
            "La orden no puede tener más de {} productos",
            MAX_ITEMS_PER_ORDER
        )));
    }

    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            if input.quantity <= 0 || input.quantity > MAX_QUANTITY {
                return Err(DomainError::Validation(format!(
                    "items[{}].quantity: cantidad inválida",
                    index
                )));
            }

            let product = match input.product_id {
                Some(id) => Some(products.get(&id).filter(|p| p.active).ok_or_else(|| {
                    DomainError::Validation(format!("items[{}]: producto {} no disponible", index, id))
                })?),
                None => None,
            };

            let product_name = input
                .product_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .or_else(|| product.map(|p| p.name.clone()))
                .ok_or_else(|| DomainError::Validation(format!("items[{}].productName requerido", index)))?;

            let unit_price = input
                .unit_price
                .or_else(|| product.map(|p| p.price))
                .ok_or_else(|| DomainError::Validation(format!("items[{}].unitPrice requerido", index)))?;

            if unit_price < Decimal::ZERO {
                return Err(DomainError::Validation(format!(
                    "items[{}].unitPrice no puede ser negativo",
                    index
                )));
            }
            if unit_price > MAX_AMOUNT {
                return Err(DomainError::Validation(format!(
                    "items[{}].unitPrice excede el máximo permitido",
                    index
                )));
            }

            let line_total = unit_price
                .checked_mul(Decimal::from(input.quantity))
                .filter(|total| *total <= MAX_AMOUNT)
                .ok_or_else(|| {
                    DomainError::Validation(format!("items[{}]: el total de la línea excede el máximo", index))
                })?;

            Ok(NewOrderItem {
                product_id: input.product_id,
                product_name,
                unit_price,
                quantity: input.quantity,
                line_total,
            })
        })
        .collect()
}

/// Sum of the line totals, bounded by what the `total_amount` column holds
pub fn order_total(items: &[NewOrderItem]) -> Result<Decimal, DomainError> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total))
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| DomainError::Validation("El total de la orden excede el máximo permitido".to_string()))
}

/// Create an order, snapshotting product data and precomputing its points
/// with the ratio in effect now.
#[tracing::instrument(skip(pool, request), fields(items = request.items.len()))]
pub async fn create_order(
    pool: &PgPool,
    request: &CreateOrderRequest,
    admin_id: i64,
) -> Result<CreatedOrder, DomainError> {
    let settings = load_settings(pool).await?;
    let mut tx = pool.begin().await?;

    let mut product_ids: Vec<i64> = request.items.iter().filter_map(|i| i.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    let products: HashMap<i64, Product> = db::catalog::get_products_by_ids(&mut tx, &product_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let items = build_line_items(&request.items, &products)?;
    let total_amount = order_total(&items)?;
    let total_points = points_for_amount(total_amount, settings.points_per_peso)?;
    let scan_code = generate_scan_code();

    let order = db::orders::insert_order(
        &mut tx,
        &NewOrder {
            scan_code: &scan_code,
            customer_name: request.customer_name.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            notes: request.notes.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            total_amount,
            total_points,
            created_by: admin_id,
        },
    )
    .await?;
    let items = db::orders::insert_order_items(&mut tx, order.id, &items).await?;

    tx.commit().await?;

    info!(order_id = order.id, %total_amount, total_points, "Order created");

    Ok(CreatedOrder {
        qr_payload: qr_payload(&order.scan_code),
        order: OrderWithItems { order, items },
    })
}

pub async fn get_order(pool: &PgPool, order_id: i64) -> Result<OrderWithItems, DomainError> {
    db::orders::get_order(pool, order_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Orden no encontrada".to_string()))
}

/// Delete an order nobody has scanned. Scanned orders are part of the points
/// history and can only leave through a backup.
pub async fn delete_order(pool: &PgPool, order_id: i64) -> Result<(), DomainError> {
    let order = get_order(pool, order_id).await?;
    if order.order.is_scanned {
        return Err(DomainError::Conflict(
            "No se puede eliminar una orden ya escaneada".to_string(),
        ));
    }

    if !db::orders::delete_unscanned_order(pool, order_id).await? {
        // Scanned between the read and the delete
        return Err(DomainError::Conflict(
            "No se puede eliminar una orden ya escaneada".to_string(),
        ));
    }

    info!(order_id, "Order deleted");
    Ok(())
}

/// Export scanned orders older than `older_than_days` and delete them in the
/// same transaction. Their scan audit rows survive with a null order id.
#[tracing::instrument(skip(pool))]
pub async fn backup_orders(pool: &PgPool, older_than_days: Option<i64>) -> Result<OrderBackup, DomainError> {
    let days = older_than_days.unwrap_or(DEFAULT_BACKUP_AGE_DAYS);
    if days < 1 {
        return Err(DomainError::Validation(
            "olderThanDays debe ser mayor o igual a 1".to_string(),
        ));
    }

    let exported_at = Utc::now();
    let cutoff = exported_at - Duration::days(days);

    let mut tx = pool.begin().await?;
    let orders = db::orders::lock_orders_for_backup(&mut tx, cutoff).await?;
    let ids: Vec<i64> = orders.iter().map(|o| o.order.id).collect();
    let deleted_orders = db::orders::delete_orders(&mut tx, &ids).await?;
    tx.commit().await?;

    info!(deleted_orders, %cutoff, "Order backup exported");

    Ok(OrderBackup {
        exported_at,
        orders,
        deleted_orders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn product(id: i64, name: &str, price: Decimal, active: bool) -> Product {
        Product {
            id,
            name: name.to_string(),
            description: None,
            price,
            stock: None,
            image_url: None,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(product_id: Option<i64>, name: Option<&str>, price: Option<Decimal>, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id,
            product_name: name.map(str::to_string),
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn test_line_items_snapshot_catalog_products() {
        let mut products = HashMap::new();
        products.insert(7, product(7, "Café americano", dec!(45.50), true));

        let items = build_line_items(
            &[
                line(Some(7), None, None, 2),
                line(None, Some("Galleta"), Some(dec!(12)), 3),
            ],
            &products,
        )
        .unwrap();

        assert_eq!(
            items,
            vec![
                NewOrderItem {
                    product_id: Some(7),
                    product_name: "Café americano".to_string(),
                    unit_price: dec!(45.50),
                    quantity: 2,
                    line_total: dec!(91.00),
                },
                NewOrderItem {
                    product_id: None,
                    product_name: "Galleta".to_string(),
                    unit_price: dec!(12),
                    quantity: 3,
                    line_total: dec!(36),
                },
            ]
        );
        assert_eq!(order_total(&items).unwrap(), dec!(127.00));
    }

    #[test]
    fn test_line_items_validation() {
        let mut products = HashMap::new();
        products.insert(1, product(1, "Retirado", dec!(10), false));

        assert!(build_line_items(&[], &products).is_err());
        // inactive product
        assert!(build_line_items(&[line(Some(1), None, None, 1)], &products).is_err());
        // unknown product
        assert!(build_line_items(&[line(Some(99), None, None, 1)], &products).is_err());
        // free-form line without price
        assert!(build_line_items(&[line(None, Some("X"), None, 1)], &products).is_err());
        assert!(build_line_items(&[line(None, Some("X"), Some(dec!(1)), 0)], &products).is_err());
        assert!(build_line_items(&[line(None, Some("X"), Some(dec!(-1)), 1)], &products).is_err());
    }

    #[test]
    fn test_huge_amounts_are_rejected_not_panicking() {
        let products = HashMap::new();

        // would overflow the decimal multiplication
        let result = build_line_items(&[line(None, Some("X"), Some(Decimal::MAX), 2)], &products);
        assert!(matches!(result, Err(DomainError::Validation(_))));

        // above NUMERIC(12, 2)
        let result = build_line_items(&[line(None, Some("X"), Some(dec!(10000000000.00)), 1)], &products);
        assert!(matches!(result, Err(DomainError::Validation(_))));

        // each price fits, the line does not
        let result = build_line_items(&[line(None, Some("X"), Some(dec!(9999999999.99)), 2)], &products);
        assert!(matches!(result, Err(DomainError::Validation(_))));

        // each line fits, the order does not
        let items = build_line_items(
            &[
                line(None, Some("A"), Some(dec!(6000000000)), 1),
                line(None, Some("B"), Some(dec!(6000000000)), 1),
            ],
            &products,
        )
        .unwrap();
        assert!(matches!(order_total(&items), Err(DomainError::Validation(_))));

        let largest = build_line_items(&[line(None, Some("X"), Some(MAX_AMOUNT), 1)], &products).unwrap();
        assert_eq!(order_total(&largest).unwrap(), dec!(9999999999.99));
    }

    #[test]
    fn test_order_of_1000_at_ratio_point_one_is_worth_100() {
        let items = build_line_items(&[line(None, Some("Compra"), Some(dec!(1000)), 1)], &HashMap::new()).unwrap();
        assert_eq!(points_for_amount(order_total(&items).unwrap(), dec!(0.1)).unwrap(), 100);
    }

    #[test]
    fn test_scan_code_shape() {
        let code = generate_scan_code();
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(code, generate_scan_code());
        assert_eq!(qr_payload("ABC"), "/scan/ABC");
    }
}
