use axum::{extract::State, Json};

use crate::api::error::ApiResult;
use crate::api::extract::{ApiPath, CurrentUser, RequestMeta};
use crate::api::guards::enforce_rate_limit;
use crate::api::state::AppState;
use crate::domain;
use crate::models::{ScanPreviewResponse, ScanResponse};
use crate::security::RateLimitPolicy;

/// Preview what a code is worth before claiming it
pub async fn preview(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
) -> ApiResult<Json<ScanPreviewResponse>> {
    let order = domain::preview_scan(&state.pool, &code).await?;
    Ok(Json(ScanPreviewResponse {
        success: true,
        already_scanned: order.order.is_scanned,
        order,
    }))
}

/// Credit the order behind `code` to the signed-in caller
#[tracing::instrument(skip(state, identity, meta), fields(user_id = identity.user_id))]
pub async fn credit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    meta: RequestMeta,
    ApiPath(code): ApiPath<String>,
) -> ApiResult<Json<ScanResponse>> {
    enforce_rate_limit(&state, &RateLimitPolicy::SCAN, &meta, Some(identity.user_id)).await?;

    let credit = domain::credit_scan(&state.pool, &code, &identity).await?;

    Ok(Json(ScanResponse {
        success: true,
        message: format!("¡Has ganado {} puntos!", credit.points_earned),
        points_earned: credit.points_earned,
        new_total_points: credit.new_total_points,
        points_warning: credit.points_warning,
        order: credit.order,
    }))
}
