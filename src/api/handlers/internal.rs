// Internal API handlers, called by the OAuth session library only.
// Guarded by a shared secret header instead of a user session.

use axum::{extract::State, http::HeaderMap, Json};
use constant_time_eq::constant_time_eq;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::domain::accounts;
use crate::models::{OAuthSessionSyncRequest, UserResponse};

pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

fn check_internal_key(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.internal_api_key.as_deref() else {
        return Err(ApiError::NotFound("Ruta no disponible".to_string()));
    };

    let provided = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("Rejected internal call with bad key");
        return Err(ApiError::Unauthorized("Clave interna inválida".to_string()));
    }
    Ok(())
}

/// Upsert the OAuth user and record its session token
#[tracing::instrument(skip(state, headers, request))]
pub async fn sync_oauth_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<OAuthSessionSyncRequest>,
) -> ApiResult<Json<UserResponse>> {
    check_internal_key(&state, &headers)?;

    let user = accounts::sync_oauth_session(&state.pool, &request).await?;
    info!(user_id = user.id, profile_completed = user.profile_completed, "OAuth session synced");

    Ok(Json(UserResponse { success: true, user }))
}
