use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::db::errors::{DatabaseError, Result};
use crate::models::{Order, OrderItem, OrderWithItems, QrScan};

const ORDER_COLUMNS: &str = r#"
    id, scan_code, customer_name, notes, total_amount, total_points,
    is_scanned, scanned_at, scanned_by, created_by, created_at
"#;

/// Line item snapshot to persist with a new order
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: Option<i64>,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub scan_code: &'a str,
    pub customer_name: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub total_amount: Decimal,
    pub total_points: i64,
    pub created_by: i64,
}

pub async fn insert_order(conn: &mut PgConnection, order: &NewOrder<'_>) -> Result<Order> {
    let order = sqlx::query_as::<_, Order>(&format!(
        r#"
        INSERT INTO orders (scan_code, customer_name, notes, total_amount, total_points, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(order.scan_code)
    .bind(order.customer_name)
    .bind(order.notes)
    .bind(order.total_amount)
    .bind(order.total_points)
    .bind(order.created_by)
    .fetch_one(conn)
    .await
    .map_err(crate::db::users::map_unique_violation)?;

    info!(order_id = order.id, total_points = order.total_points, "Inserted order");
    Ok(order)
}

/// Bulk insert line items
pub async fn insert_order_items(
    conn: &mut PgConnection,
    order_id: i64,
    items: &[NewOrderItem],
) -> Result<Vec<OrderItem>> {
    if items.is_empty() {
        return Ok(vec![]);
    }

    let order_ids: Vec<i64> = vec![order_id; items.len()];
    let product_ids: Vec<Option<i64>> = items.iter().map(|i| i.product_id).collect();
    let names: Vec<String> = items.iter().map(|i| i.product_name.clone()).collect();
    let unit_prices: Vec<Decimal> = items.iter().map(|i| i.unit_price).collect();
    let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
    let line_totals: Vec<Decimal> = items.iter().map(|i| i.line_total).collect();

    let rows = sqlx::query_as::<_, OrderItem>(
        r#"
        INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity, line_total)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::numeric[], $5::int[], $6::numeric[])
        RETURNING id, order_id, product_id, product_name, unit_price, quantity, line_total
        "#,
    )
    .bind(&order_ids[..])
    .bind(&product_ids[..])
    .bind(&names[..])
    .bind(&unit_prices[..])
    .bind(&quantities[..])
    .bind(&line_totals[..])
    .fetch_all(conn)
    .await?;

    debug!("Inserted {} order items", rows.len());
    Ok(rows)
}

pub async fn get_order_items<'e, E>(executor: E, order_id: i64) -> Result<Vec<OrderItem>>
where
    E: Executor<'e, Database = Postgres>,
{
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT id, order_id, product_id, product_name, unit_price, quantity, line_total
        FROM order_items
        WHERE order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;

    Ok(items)
}

/// Items for many orders at once, grouped by order id
async fn get_items_for_orders<'e, E>(executor: E, order_ids: &[i64]) -> Result<HashMap<i64, Vec<OrderItem>>>
where
    E: Executor<'e, Database = Postgres>,
{
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT id, order_id, product_id, product_name, unit_price, quantity, line_total
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, id
        "#,
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    let mut grouped: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for item in items {
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

fn attach_items(orders: Vec<Order>, mut items: HashMap<i64, Vec<OrderItem>>) -> Vec<OrderWithItems> {
    orders
        .into_iter()
        .map(|order| {
            let items = items.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, items }
        })
        .collect()
}

pub async fn get_order_by_code(pool: &PgPool, scan_code: &str) -> Result<Option<OrderWithItems>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE scan_code = $1"
    ))
    .bind(scan_code)
    .fetch_optional(pool)
    .await?;

    match order {
        Some(order) => {
            let items = get_order_items(pool, order.id).await?;
            Ok(Some(OrderWithItems { order, items }))
        }
        None => Ok(None),
    }
}

/// Lock an order row by scan code for the remainder of the transaction
pub async fn lock_order_by_code(conn: &mut PgConnection, scan_code: &str) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE scan_code = $1 FOR UPDATE"
    ))
    .bind(scan_code)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// Flip the scan flag. The `is_scanned = FALSE` guard makes a second flip a no-op
/// that surfaces as `NotFound`.
pub async fn mark_order_scanned(conn: &mut PgConnection, order_id: i64, user_id: i64) -> Result<Order> {
    sqlx::query_as::<_, Order>(&format!(
        r#"
        UPDATE orders SET is_scanned = TRUE, scanned_at = NOW(), scanned_by = $2
        WHERE id = $1 AND is_scanned = FALSE
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("unscanned order {}", order_id)))
}

pub async fn insert_qr_scan(conn: &mut PgConnection, order: &Order, user_id: i64) -> Result<QrScan> {
    let scan = sqlx::query_as::<_, QrScan>(
        r#"
        INSERT INTO qr_scans (order_id, scan_code, user_id, points_earned, scanned_at)
        VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
        RETURNING id, order_id, scan_code, user_id, points_earned, scanned_at
        "#,
    )
    .bind(order.id)
    .bind(&order.scan_code)
    .bind(user_id)
    .bind(order.total_points)
    .bind(order.scanned_at)
    .fetch_one(conn)
    .await?;

    Ok(scan)
}

pub async fn get_order(pool: &PgPool, order_id: i64) -> Result<Option<OrderWithItems>> {
    let order = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

    match order {
        Some(order) => {
            let items = get_order_items(pool, order.id).await?;
            Ok(Some(OrderWithItems { order, items }))
        }
        None => Ok(None),
    }
}

pub async fn list_orders(
    pool: &PgPool,
    scanned: Option<bool>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<OrderWithItems>, i64)> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        r#"
        SELECT {ORDER_COLUMNS} FROM orders
        WHERE $1::boolean IS NULL OR is_scanned = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(scanned)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE $1::boolean IS NULL OR is_scanned = $1",
    )
    .bind(scanned)
    .fetch_one(pool)
    .await?;

    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    let items = get_items_for_orders(pool, &ids).await?;

    Ok((attach_items(orders, items), total))
}

/// Delete an order that nobody has scanned yet. Returns false when the order
/// does not exist or is already scanned.
pub async fn delete_unscanned_order(pool: &PgPool, order_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND is_scanned = FALSE")
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Scanned orders created before `cutoff`, locked for export-then-delete
pub async fn lock_orders_for_backup(
    conn: &mut PgConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<OrderWithItems>> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        r#"
        SELECT {ORDER_COLUMNS} FROM orders
        WHERE is_scanned = TRUE AND created_at < $1
        ORDER BY id
        FOR UPDATE
        "#
    ))
    .bind(cutoff)
    .fetch_all(&mut *conn)
    .await?;

    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    let items = get_items_for_orders(&mut *conn, &ids).await?;

    Ok(attach_items(orders, items))
}

pub async fn delete_orders(conn: &mut PgConnection, order_ids: &[i64]) -> Result<u64> {
    if order_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query("DELETE FROM orders WHERE id = ANY($1)")
        .bind(order_ids)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Whether any order line still references the product
pub async fn product_has_orders(pool: &PgPool, product_id: i64) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)",
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
