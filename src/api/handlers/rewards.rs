use axum::{extract::State, http::StatusCode, Json};

use crate::api::error::ApiResult;
use crate::api::extract::{ApiPath, CurrentUser, RequestMeta};
use crate::api::guards::enforce_rate_limit;
use crate::api::state::AppState;
use crate::db;
use crate::domain;
use crate::models::{ClaimCreatedResponse, PublicConfigResponse, RewardListResponse};
use crate::security::RateLimitPolicy;

pub async fn list_active(State(state): State<AppState>) -> ApiResult<Json<RewardListResponse>> {
    let rewards = db::catalog::list_rewards(&state.pool, false).await?;
    Ok(Json(RewardListResponse { success: true, rewards }))
}

#[tracing::instrument(skip(state, identity, meta), fields(user_id = identity.user_id))]
pub async fn claim(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    meta: RequestMeta,
    ApiPath(reward_id): ApiPath<i64>,
) -> ApiResult<(StatusCode, Json<ClaimCreatedResponse>)> {
    enforce_rate_limit(&state, &RateLimitPolicy::CLAIM, &meta, Some(identity.user_id)).await?;

    let receipt = domain::create_claim(&state.pool, identity.user_id, reward_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ClaimCreatedResponse {
            success: true,
            message: "Canje registrado, pendiente de aprobación".to_string(),
            claim_id: receipt.claim.id,
            points_spent: receipt.claim.points_spent,
            remaining_points: receipt.remaining_points,
        }),
    ))
}

pub async fn public_config(State(state): State<AppState>) -> ApiResult<Json<PublicConfigResponse>> {
    let settings = domain::settings::load_settings(&state.pool).await?;
    Ok(Json(PublicConfigResponse {
        success: true,
        system_name: settings.system_name,
        welcome_message: settings.welcome_message,
        points_per_peso: settings.points_per_peso,
    }))
}
