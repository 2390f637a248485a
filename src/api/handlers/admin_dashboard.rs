use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::extract::{AdminUser, ApiQuery};
use crate::api::state::AppState;
use crate::db;
use crate::models::DashboardStats;
use crate::security::SecurityAlert;

#[derive(Serialize)]
pub struct StatsResponse {
    success: bool,
    stats: DashboardStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct AlertListResponse {
    success: bool,
    alerts: Vec<SecurityAlert>,
}

pub async fn stats(State(state): State<AppState>, AdminUser(_admin): AdminUser) -> ApiResult<Json<StatsResponse>> {
    let stats = db::settings::dashboard_stats(&state.pool).await?;
    Ok(Json(StatsResponse { success: true, stats }))
}

pub async fn security_alerts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(query): ApiQuery<AlertQuery>,
) -> ApiResult<Json<AlertListResponse>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let alerts = state.security_log.recent(limit).await;
    Ok(Json(AlertListResponse { success: true, alerts }))
}
