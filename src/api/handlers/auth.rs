use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::AppendHeaders,
    Json,
};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{ApiJson, CurrentUser, RequestMeta};
use crate::api::guards::{enforce_rate_limit, screen_form};
use crate::api::state::AppState;
use crate::auth::cookies::{
    build_cookie, clear_cookie, read_cookie, AUTH_COOKIE, CONFIG_ACCESS_COOKIE, OAUTH_SESSION_COOKIE,
    SECURE_OAUTH_SESSION_COOKIE,
};
use crate::db;
use crate::domain::accounts;
use crate::models::{LoginRequest, MessageResponse, RegisterRequest, User, UserResponse};
use crate::security::{AlertKind, CaptchaError, RateLimitPolicy};

type CookieHeaders = AppendHeaders<Vec<(axum::http::HeaderName, String)>>;

fn session_cookie(state: &AppState, user: &User) -> ApiResult<String> {
    let ttl = state.session_ttl();
    let token = state
        .signer
        .issue_session(user.id, &user.email, user.role(), ttl)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(build_cookie(AUTH_COOKIE, &token, "/", ttl.num_seconds(), state.config.auth.cookie_secure))
}

#[tracing::instrument(skip(state, meta, request), fields(ip = %meta.client.ip))]
pub async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieHeaders, Json<UserResponse>)> {
    enforce_rate_limit(&state, &RateLimitPolicy::REGISTER, &meta, None).await?;
    screen_form(&state, &meta, &request.signals).await?;

    if let Some(captcha) = &state.captcha {
        if let Err(e) = captcha
            .verify(request.captcha_token.as_deref(), Some(meta.client.ip.as_str()))
            .await
        {
            state
                .security_log
                .record(AlertKind::CaptchaFailed, &meta.client.ip, &meta.path, e.to_string(), None)
                .await;
            return Err(match e {
                CaptchaError::Unavailable(msg) => ApiError::Internal(msg),
                _ => ApiError::Validation("Verificación CAPTCHA fallida".to_string()),
            });
        }
    }

    let user = accounts::register(&state.pool, &request, state.config.auth.password_iterations).await?;
    let cookie = session_cookie(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders(vec![(SET_COOKIE, cookie)]),
        Json(UserResponse { success: true, user }),
    ))
}

#[tracing::instrument(skip(state, meta, request), fields(ip = %meta.client.ip))]
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<(CookieHeaders, Json<UserResponse>)> {
    enforce_rate_limit(&state, &RateLimitPolicy::LOGIN, &meta, None).await?;
    screen_form(&state, &meta, &request.signals).await?;

    let user = accounts::authenticate(&state.pool, &request.email, &request.password).await?;
    state.limiter.reset(&RateLimitPolicy::LOGIN, &meta.client).await;

    let cookie = session_cookie(&state, &user)?;
    Ok((
        AppendHeaders(vec![(SET_COOKIE, cookie)]),
        Json(UserResponse { success: true, user }),
    ))
}

/// Clears every session cookie; an OAuth session is also removed server-side
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(CookieHeaders, Json<MessageResponse>)> {
    let secure = state.config.auth.cookie_secure;

    if let Some(token) =
        read_cookie(&headers, SECURE_OAUTH_SESSION_COOKIE).or_else(|| read_cookie(&headers, OAUTH_SESSION_COOKIE))
    {
        db::users::delete_session(&state.pool, token).await?;
        info!("OAuth session removed on logout");
    }

    Ok((
        AppendHeaders(vec![
            (SET_COOKIE, clear_cookie(AUTH_COOKIE, "/", secure)),
            (SET_COOKIE, clear_cookie(CONFIG_ACCESS_COOKIE, "/api/admin", secure)),
        ]),
        Json(MessageResponse::ok("Sesión cerrada")),
    ))
}

pub async fn me(State(state): State<AppState>, CurrentUser(identity): CurrentUser) -> ApiResult<Json<UserResponse>> {
    let user = accounts::get_user(&state.pool, identity.user_id).await?;
    Ok(Json(UserResponse { success: true, user }))
}
