//! Request extractors: JSON/path/query wrappers that reject with [`ApiError`],
//! and the caller-identity extractors used as route guards.

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Query};
use axum::http::request::Parts;
use axum::http::header::USER_AGENT;
use std::net::SocketAddr;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::cookies::{read_cookie, CONFIG_ACCESS_COOKIE};
use crate::auth::{AuthenticatedIdentity, IdentitySource};
use crate::db;
use crate::models::Role;
use crate::security::ClientKey;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Any signed-in caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedIdentity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .identity
            .resolve(&parts.headers)
            .await?
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthenticated)
    }
}

/// Signed-in caller with the admin role.
///
/// A session token keeps the role it was issued with, so the role is read
/// again from `users` before an admin route runs.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedIdentity);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            tracing::warn!(user_id = identity.user_id, "Non-admin hit an admin route");
            return Err(ApiError::admin_only());
        }

        if identity.source == IdentitySource::Jwt {
            let role = db::users::get_user_by_id(&state.pool, identity.user_id)
                .await?
                .map(|user| user.role());
            if role != Some(Role::Admin) {
                tracing::warn!(user_id = identity.user_id, "Admin token for a user who is no longer admin");
                return Err(ApiError::admin_only());
            }
        }

        Ok(AdminUser(identity))
    }
}

/// Admin who has also unlocked the configuration screen with the security key
#[derive(Debug, Clone)]
pub struct ConfigAdmin(pub AuthenticatedIdentity);

impl FromRequestParts<AppState> for ConfigAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AdminUser(identity) = AdminUser::from_request_parts(parts, state).await?;

        let unlocked = read_cookie(&parts.headers, CONFIG_ACCESS_COOKIE)
            .map(|token| state.signer.verify_config_access(token, identity.user_id).is_ok())
            .unwrap_or(false);

        if !unlocked {
            return Err(ApiError::Forbidden(
                "Debes validar la clave de seguridad para acceder a la configuración".to_string(),
            ));
        }
        Ok(ConfigAdmin(identity))
    }
}

/// Client metadata for the abuse heuristics
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub client: ClientKey,
    pub user_agent: Option<String>,
    pub path: String,
}

impl FromRequestParts<AppState> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(RequestMeta {
            client: ClientKey::from_request(&parts.headers, peer, state.config.trusted_proxy_hops),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            path: parts.uri.path().to_string(),
        })
    }
}
