use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::AppendHeaders,
    Json,
};
use constant_time_eq::constant_time_eq;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{AdminUser, ApiJson, ConfigAdmin, RequestMeta};
use crate::api::guards::enforce_rate_limit;
use crate::api::state::AppState;
use crate::auth::cookies::{build_cookie, CONFIG_ACCESS_COOKIE};
use crate::domain::settings::{self, is_valid_security_key_format, parse_positive_ratio, value_as_string};
use crate::domain::{recalculate_points, RecalculationMode, RecalculationReport};
use crate::models::{
    ConfigResponse, ConfigUpdateRequest, MessageResponse, RecalculateRequest, RecalculationResponse,
    SecurityKeyRequest,
};
use crate::security::{AlertKind, RateLimitPolicy};

pub async fn get_config(
    State(state): State<AppState>,
    ConfigAdmin(_admin): ConfigAdmin,
) -> ApiResult<Json<ConfigResponse>> {
    let configs = settings::load_admin_view(&state.pool).await?;
    Ok(Json(ConfigResponse { success: true, configs }))
}

#[tracing::instrument(skip(state, admin, request), fields(admin_id = admin.user_id))]
pub async fn update_config(
    State(state): State<AppState>,
    ConfigAdmin(admin): ConfigAdmin,
    ApiJson(request): ApiJson<ConfigUpdateRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let keys = settings::update_settings(&state.pool, &request.configs).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Configuración actualizada: {}",
        keys.join(", ")
    ))))
}

/// Unlock the configuration screen for this admin with the 4-digit key
#[tracing::instrument(skip(state, admin, meta, request), fields(admin_id = admin.user_id))]
pub async fn validate_security_key(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    meta: RequestMeta,
    ApiJson(request): ApiJson<SecurityKeyRequest>,
) -> ApiResult<(AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<MessageResponse>)> {
    enforce_rate_limit(&state, &RateLimitPolicy::SECURITY_KEY, &meta, Some(admin.user_id)).await?;

    let submitted = value_as_string(&request.security_key)
        .filter(|key| is_valid_security_key_format(key))
        .ok_or_else(|| {
            ApiError::Validation("La clave de seguridad debe tener exactamente 4 dígitos".to_string())
        })?;

    let expected = settings::load_settings(&state.pool).await?.security_key;
    if !constant_time_eq(submitted.as_bytes(), expected.as_bytes()) {
        state
            .security_log
            .record(
                AlertKind::InvalidSecurityKey,
                &meta.client.ip,
                &meta.path,
                "wrong configuration security key",
                Some(admin.user_id),
            )
            .await;
        return Err(ApiError::Forbidden("Clave de seguridad incorrecta".to_string()));
    }

    let ttl = state.config_access_ttl();
    let token = state
        .signer
        .issue_config_access(admin.user_id, ttl)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let cookie = build_cookie(
        CONFIG_ACCESS_COOKIE,
        &token,
        "/api/admin",
        ttl.num_seconds(),
        state.config.auth.cookie_secure,
    );

    info!("Configuration unlocked");
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(MessageResponse::ok("Clave de seguridad válida")),
    ))
}

/// Rescale balances one user at a time
pub async fn recalculate(
    State(state): State<AppState>,
    ConfigAdmin(admin): ConfigAdmin,
    ApiJson(request): ApiJson<RecalculateRequest>,
) -> ApiResult<Json<RecalculationResponse>> {
    run_recalculation(&state, admin.user_id, &request, RecalculationMode::PerRow).await
}

/// Rescale balances in transactional batches
pub async fn recalculate_batched(
    State(state): State<AppState>,
    ConfigAdmin(admin): ConfigAdmin,
    ApiJson(request): ApiJson<RecalculateRequest>,
) -> ApiResult<Json<RecalculationResponse>> {
    run_recalculation(&state, admin.user_id, &request, RecalculationMode::TransactionalBatches).await
}

#[tracing::instrument(skip(state, request))]
async fn run_recalculation(
    state: &AppState,
    admin_id: i64,
    request: &RecalculateRequest,
    mode: RecalculationMode,
) -> ApiResult<Json<RecalculationResponse>> {
    let old_ratio = parse_positive_ratio(&request.old_points_per_peso, "oldPointsPerPeso")?;
    let new_ratio = parse_positive_ratio(&request.new_points_per_peso, "newPointsPerPeso")?;

    let report = recalculate_points(&state.pool, &state.config.recalculation, old_ratio, new_ratio, mode).await?;
    Ok(Json(to_response(report)))
}

fn to_response(report: RecalculationReport) -> RecalculationResponse {
    let message = if report.old_ratio == report.new_ratio {
        "El ratio no cambió, no se modificaron puntos".to_string()
    } else {
        format!(
            "Puntos recalculados para {} de {} usuarios",
            report.recalculated_users, report.total_users
        )
    };

    RecalculationResponse {
        success: true,
        message,
        recalculated_users: report.recalculated_users,
        total_users: report.total_users,
        failed_users: report.failed_users,
        multiplier: report.multiplier.to_f64().unwrap_or_default(),
        old_ratio: report.old_ratio.to_f64().unwrap_or_default(),
        new_ratio: report.new_ratio.to_f64().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_to_response() {
        let response = to_response(RecalculationReport {
            recalculated_users: 9,
            total_users: 10,
            failed_users: 1,
            multiplier: dec!(2),
            old_ratio: dec!(0.1),
            new_ratio: dec!(0.2),
        });

        assert_eq!(response.recalculated_users, 9);
        assert_eq!(response.failed_users, 1);
        assert_eq!(response.multiplier, 2.0);
        assert_eq!(response.old_ratio, 0.1);
        assert!(response.message.contains("9 de 10"));
    }
}
