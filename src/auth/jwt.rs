use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::Role;

const CONFIG_ACCESS_SCOPE: &str = "config";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Claims of the `auth-token` session cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of the short-lived config-screen unlock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAccessClaims {
    pub user_id: i64,
    pub scope: String,
    pub exp: i64,
}

/// HS256 signing and verification for both token kinds
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue_session(&self, user_id: i64, email: &str, role: Role, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = SessionClaims {
            user_id,
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.encode(&claims)
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, TokenError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Session token rejected: {}", e);
                TokenError::Invalid(e.to_string())
            })
    }

    pub fn issue_config_access(&self, user_id: i64, ttl: Duration) -> Result<String, TokenError> {
        let claims = ConfigAccessClaims {
            user_id,
            scope: CONFIG_ACCESS_SCOPE.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        self.encode(&claims)
    }

    /// A config-access token only counts for the admin it was issued to
    pub fn verify_config_access(&self, token: &str, user_id: i64) -> Result<(), TokenError> {
        let claims = decode::<ConfigAccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?
            .claims;

        if claims.scope != CONFIG_ACCESS_SCOPE || claims.user_id != user_id {
            return Err(TokenError::Invalid("config access token does not match".to_string()));
        }
        Ok(())
    }

    fn encode<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

/// Extract a token from an `Authorization: Bearer <token>` header
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    auth_header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret-with-enough-length")
    }

    #[test]
    fn test_session_token_round_trip() {
        let token = signer()
            .issue_session(42, "ana@example.com", Role::Admin, Duration::hours(1))
            .unwrap();

        let claims = signer().verify_session(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_session_token_wrong_secret() {
        let token = signer()
            .issue_session(1, "a@b.co", Role::User, Duration::hours(1))
            .unwrap();
        let other = TokenSigner::new("another-secret-of-enough-length");
        assert!(other.verify_session(&token).is_err());
    }

    #[test]
    fn test_expired_session_token() {
        let token = signer()
            .issue_session(1, "a@b.co", Role::User, Duration::hours(-1))
            .unwrap();
        assert!(signer().verify_session(&token).is_err());
    }

    #[test]
    fn test_config_access_bound_to_user() {
        let token = signer().issue_config_access(7, Duration::minutes(5)).unwrap();
        assert!(signer().verify_config_access(&token, 7).is_ok());
        assert!(signer().verify_config_access(&token, 8).is_err());

        // a session token is not a config-access token
        let session = signer()
            .issue_session(7, "a@b.co", Role::Admin, Duration::hours(1))
            .unwrap();
        assert!(signer().verify_config_access(&session, 7).is_err());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("Token abc")), None);
        assert_eq!(extract_bearer(None), None);
    }
}
