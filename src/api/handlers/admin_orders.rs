use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use super::page_window;
use crate::api::error::ApiResult;
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::api::state::AppState;
use crate::db;
use crate::domain::orders;
use crate::models::{
    CreateOrderRequest, MessageResponse, OrderBackupRequest, OrderBackupResponse, OrderListQuery, OrderResponse,
    OrderWithItems,
};

#[derive(Serialize)]
pub struct OrderListResponse {
    success: bool,
    orders: Vec<OrderWithItems>,
    total: i64,
    page: i64,
    limit: i64,
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.user_id))]
pub async fn create_order(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    let created = orders::create_order(&state.pool, &request, admin.user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            success: true,
            order: created.order,
            qr_payload: created.qr_payload,
        }),
    ))
}

pub async fn list_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> ApiResult<Json<OrderListResponse>> {
    let (page, limit, offset) = page_window(query.page, query.limit);
    let (orders, total) = db::orders::list_orders(&state.pool, query.scanned, limit, offset).await?;

    Ok(Json(OrderListResponse {
        success: true,
        orders,
        total,
        page,
        limit,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(order_id): ApiPath<i64>,
) -> ApiResult<Json<OrderResponse>> {
    let order = orders::get_order(&state.pool, order_id).await?;
    Ok(Json(OrderResponse {
        success: true,
        qr_payload: orders::qr_payload(&order.order.scan_code),
        order,
    }))
}

pub async fn delete_order(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(order_id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    orders::delete_order(&state.pool, order_id).await?;
    Ok(Json(MessageResponse::ok("Orden eliminada")))
}

/// Export old scanned orders as JSON and remove them
#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.user_id))]
pub async fn backup_orders(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<OrderBackupRequest>,
) -> ApiResult<Json<OrderBackupResponse>> {
    let backup = orders::backup_orders(&state.pool, request.older_than_days).await?;

    Ok(Json(OrderBackupResponse {
        success: true,
        exported_at: backup.exported_at,
        deleted_orders: backup.deleted_orders,
        orders: backup.orders,
    }))
}
