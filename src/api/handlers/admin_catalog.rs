use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::extract::{AdminUser, ApiJson, ApiPath};
use crate::api::state::AppState;
use crate::db;
use crate::domain::catalog::{self, Removal};
use crate::models::{DeleteResponse, Product, ProductInput, Reward, RewardInput, RewardListResponse};

#[derive(Serialize)]
pub struct ProductListResponse {
    success: bool,
    products: Vec<Product>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    success: bool,
    product: Product,
}

#[derive(Serialize)]
pub struct RewardResponse {
    success: bool,
    reward: Reward,
}

fn delete_response(removal: Removal, what: &str) -> DeleteResponse {
    match removal {
        Removal::Deleted => DeleteResponse {
            success: true,
            deleted: true,
            deactivated: false,
            message: format!("{} eliminado", what),
        },
        Removal::Deactivated => DeleteResponse {
            success: true,
            deleted: false,
            deactivated: true,
            message: format!("{} desactivado porque tiene historial asociado", what),
        },
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub async fn list_products(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<ProductListResponse>> {
    let products = db::catalog::list_products(&state.pool, true).await?;
    Ok(Json(ProductListResponse { success: true, products }))
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let product = catalog::create_product(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(ProductResponse { success: true, product })))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(product_id): ApiPath<i64>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<Json<ProductResponse>> {
    let product = catalog::update_product(&state.pool, product_id, &input).await?;
    Ok(Json(ProductResponse { success: true, product }))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(product_id): ApiPath<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    let removal = catalog::remove_product(&state.pool, product_id).await?;
    Ok(Json(delete_response(removal, "Producto")))
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

pub async fn list_rewards(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<RewardListResponse>> {
    let rewards = db::catalog::list_rewards(&state.pool, true).await?;
    Ok(Json(RewardListResponse { success: true, rewards }))
}

pub async fn create_reward(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiJson(input): ApiJson<RewardInput>,
) -> ApiResult<(StatusCode, Json<RewardResponse>)> {
    let reward = catalog::create_reward(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(RewardResponse { success: true, reward })))
}

pub async fn update_reward(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(reward_id): ApiPath<i64>,
    ApiJson(input): ApiJson<RewardInput>,
) -> ApiResult<Json<RewardResponse>> {
    let reward = catalog::update_reward(&state.pool, reward_id, &input).await?;
    Ok(Json(RewardResponse { success: true, reward }))
}

pub async fn delete_reward(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(reward_id): ApiPath<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    let removal = catalog::remove_reward(&state.pool, reward_id).await?;
    Ok(Json(delete_response(removal, "Recompensa")))
}
