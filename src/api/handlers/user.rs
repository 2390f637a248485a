use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::extract::{ApiJson, CurrentUser};
use crate::api::state::AppState;
use crate::db;
use crate::domain::accounts;
use crate::models::{ClaimDetail, CompleteProfileRequest, QrScan, UserResponse};

#[derive(Serialize)]
pub struct ScanHistoryResponse {
    success: bool,
    scans: Vec<QrScan>,
}

#[derive(Serialize)]
pub struct ClaimHistoryResponse {
    success: bool,
    claims: Vec<ClaimDetail>,
}

#[tracing::instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn complete_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiJson(request): ApiJson<CompleteProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = accounts::complete_profile(
        &state.pool,
        identity.user_id,
        &request,
        state.config.auth.password_iterations,
    )
    .await?;

    Ok(Json(UserResponse { success: true, user }))
}

pub async fn scan_history(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ScanHistoryResponse>> {
    let scans = db::users::list_scans_for_user(&state.pool, identity.user_id).await?;
    Ok(Json(ScanHistoryResponse { success: true, scans }))
}

pub async fn claim_history(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ClaimHistoryResponse>> {
    let claims = db::claims::list_claims_for_user(&state.pool, identity.user_id).await?;
    Ok(Json(ClaimHistoryResponse { success: true, claims }))
}
