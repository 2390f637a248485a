//! Resolution of the caller behind a request.
//!
//! Two sources can vouch for a caller: the service's own `auth-token` JWT and
//! the external OAuth library's session cookie. Both converge on
//! [`AuthenticatedIdentity`]; handlers never look at cookies themselves.

use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::cookies::{read_cookie, AUTH_COOKIE, OAUTH_SESSION_COOKIE, SECURE_OAUTH_SESSION_COOKIE};
use super::jwt::{extract_bearer, TokenSigner};
use crate::db::{self, DatabaseError};
use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Jwt,
    OAuthSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub source: IdentitySource,
}

impl AuthenticatedIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// One way of recognising a caller. `Ok(None)` means "not mine, ask the next
/// resolver"; errors are reserved for infrastructure failures.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedIdentity>, DatabaseError>;
}

/// Trusts the signed claims of the `auth-token` cookie (or a bearer header)
pub struct JwtCookieResolver {
    signer: TokenSigner,
}

impl JwtCookieResolver {
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl IdentityResolver for JwtCookieResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedIdentity>, DatabaseError> {
        let token = read_cookie(headers, AUTH_COOKIE).or_else(|| {
            extract_bearer(
                headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok()),
            )
        });

        let Some(token) = token else {
            return Ok(None);
        };

        match self.signer.verify_session(token) {
            Ok(claims) => Ok(Some(AuthenticatedIdentity {
                user_id: claims.user_id,
                email: claims.email,
                role: claims.role,
                source: IdentitySource::Jwt,
            })),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid session cookie");
                Ok(None)
            }
        }
    }
}

/// Looks the OAuth session cookie up in the `sessions` table
pub struct OAuthSessionResolver {
    pool: PgPool,
}

impl OAuthSessionResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for OAuthSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedIdentity>, DatabaseError> {
        let Some(token) = read_cookie(headers, SECURE_OAUTH_SESSION_COOKIE)
            .or_else(|| read_cookie(headers, OAUTH_SESSION_COOKIE))
        else {
            return Ok(None);
        };

        let Some(session) = db::users::get_active_session(&self.pool, token).await? else {
            debug!("OAuth session cookie without a live session");
            return Ok(None);
        };

        let user = db::users::get_user_by_id(&self.pool, session.user_id).await?;
        Ok(user.map(|user| AuthenticatedIdentity {
            user_id: user.id,
            role: user.role(),
            email: user.email,
            source: IdentitySource::OAuthSession,
        }))
    }
}

/// Asks each resolver in turn; the first identity wins
#[derive(Clone)]
pub struct IdentityChain {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl IdentityChain {
    pub fn new(resolvers: Vec<Arc<dyn IdentityResolver>>) -> Self {
        Self { resolvers }
    }

    /// JWT first, then the OAuth session store
    pub fn standard(signer: TokenSigner, pool: PgPool) -> Self {
        Self::new(vec![
            Arc::new(JwtCookieResolver::new(signer)),
            Arc::new(OAuthSessionResolver::new(pool)),
        ])
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedIdentity>, DatabaseError> {
        for resolver in &self.resolvers {
            if let Some(identity) = resolver.resolve(headers).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;
    use chrono::Duration;

    struct Fixed(Option<AuthenticatedIdentity>);

    #[async_trait]
    impl IdentityResolver for Fixed {
        async fn resolve(&self, _: &HeaderMap) -> Result<Option<AuthenticatedIdentity>, DatabaseError> {
            Ok(self.0.clone())
        }
    }

    fn identity(user_id: i64, source: IdentitySource) -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            user_id,
            email: format!("user{}@example.com", user_id),
            role: Role::User,
            source,
        }
    }

    #[tokio::test]
    async fn test_jwt_cookie_resolver() {
        let signer = TokenSigner::new("test-secret-with-enough-length");
        let token = signer
            .issue_session(5, "ana@example.com", Role::Admin, Duration::hours(1))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("auth-token={}", token)).unwrap());

        let resolved = JwtCookieResolver::new(signer.clone()).resolve(&headers).await.unwrap().unwrap();
        assert_eq!(resolved.user_id, 5);
        assert!(resolved.is_admin());
        assert_eq!(resolved.source, IdentitySource::Jwt);

        // garbage is "not mine", not an error
        let mut bad = HeaderMap::new();
        bad.insert(COOKIE, HeaderValue::from_static("auth-token=not-a-jwt"));
        assert!(JwtCookieResolver::new(signer).resolve(&bad).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chain_first_match_wins() {
        let chain = IdentityChain::new(vec![
            Arc::new(Fixed(None)),
            Arc::new(Fixed(Some(identity(2, IdentitySource::OAuthSession)))),
            Arc::new(Fixed(Some(identity(3, IdentitySource::Jwt)))),
        ]);

        let resolved = chain.resolve(&HeaderMap::new()).await.unwrap().unwrap();
        assert_eq!(resolved.user_id, 2);

        let empty = IdentityChain::new(vec![Arc::new(Fixed(None))]);
        assert!(empty.resolve(&HeaderMap::new()).await.unwrap().is_none());
    }
}
