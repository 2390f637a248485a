use axum::{extract::State, Json};

use super::page_window;
use crate::api::error::ApiResult;
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::api::state::AppState;
use crate::db;
use crate::domain::accounts;
use crate::models::{UpdateUserRequest, UserListQuery, UserListResponse, UserResponse};

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<Json<UserListResponse>> {
    let (page, limit, offset) = page_window(query.page, query.limit);
    let (users, total) = db::users::list_users(&state.pool, query.search.as_deref(), limit, offset).await?;

    Ok(Json(UserListResponse {
        success: true,
        users,
        total,
        page,
        limit,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(user_id): ApiPath<i64>,
) -> ApiResult<Json<UserResponse>> {
    let user = accounts::get_user(&state.pool, user_id).await?;
    Ok(Json(UserResponse { success: true, user }))
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = accounts::update_user(&state.pool, user_id, &request).await?;
    Ok(Json(UserResponse { success: true, user }))
}
