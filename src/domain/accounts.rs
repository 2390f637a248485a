use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};

use super::DomainError;
use crate::auth::password::{hash_password, verify_password};
use crate::db::{self, users::NewUser, DatabaseError};
use crate::models::{
    CompleteProfileRequest, OAuthSessionSyncRequest, RegisterRequest, Role, UpdateUserRequest, User,
};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 120;

// Verified when the e-mail is unknown so both paths cost the same
const DUMMY_HASH: &str = "pbkdf2_sha256$600000$Xq3k9LmP2vRt7Wz1Yb5Nc8$q4V1m2b5aV2b0dWn4n9Zk1N0c2h5a1b2c3d4e5f6g7h=";

pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= 254
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        });

    if valid {
        Ok(email)
    } else {
        Err(DomainError::Validation("email: correo electrónico inválido".to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(DomainError::Validation(format!(
            "password: debe tener al menos {} caracteres",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(DomainError::Validation("password: demasiado larga".to_string()));
    }
    Ok(())
}

pub fn normalize_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "name: debe tener entre 1 y {} caracteres",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Strip separators and require 6 to 13 ASCII digits
pub fn normalize_cedula(raw: &str) -> Result<String, DomainError> {
    let cedula: String = raw.chars().filter(|c| !matches!(c, '-' | '.' | ' ')).collect();
    if (6..=13).contains(&cedula.len()) && cedula.bytes().all(|b| b.is_ascii_digit()) {
        Ok(cedula)
    } else {
        Err(DomainError::Validation("cedula: número de cédula inválido".to_string()))
    }
}

fn map_duplicate(e: DatabaseError) -> DomainError {
    if !e.is_unique_violation() {
        return e.into();
    }
    match e {
        DatabaseError::IntegrityError(constraint) if constraint.contains("cedula") => {
            DomainError::Validation("La cédula ya está registrada".to_string())
        }
        _ => DomainError::Validation("El correo electrónico ya está registrado".to_string()),
    }
}

async fn hash_blocking(password: String, iterations: u32) -> Result<String, DomainError> {
    tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?
        .map_err(|e| DomainError::Internal(e.to_string()))
}

async fn verify_blocking(password: String, stored: String) -> Result<bool, DomainError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))
}

/// Create a password account with a completed profile
#[tracing::instrument(skip(pool, request), fields(email = %request.email))]
pub async fn register(pool: &PgPool, request: &RegisterRequest, iterations: u32) -> Result<User, DomainError> {
    let email = normalize_email(&request.email)?;
    let name = normalize_name(&request.name)?;
    validate_password(&request.password)?;
    let cedula = request.cedula.as_deref().map(normalize_cedula).transpose()?;

    let password_hash = hash_blocking(request.password.clone(), iterations).await?;

    let user = db::users::insert_user(
        pool,
        &NewUser {
            email: &email,
            cedula: cedula.as_deref(),
            name: &name,
            password_hash: Some(&password_hash),
            profile_completed: cedula.is_some(),
        },
    )
    .await
    .map_err(map_duplicate)?;

    info!(user_id = user.id, "User registered");
    Ok(user)
}

/// Check e-mail and password. Unknown e-mail, OAuth-only account and wrong
/// password are indistinguishable to the caller.
#[tracing::instrument(skip(pool, password))]
pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<User, DomainError> {
    let email = normalize_email(email).map_err(|_| DomainError::InvalidCredentials)?;
    let user = db::users::get_user_by_email(pool, &email).await?;

    let stored = user
        .as_ref()
        .and_then(|u| u.password_hash.clone())
        .unwrap_or_else(|| DUMMY_HASH.to_string());

    let matches = verify_blocking(password.to_string(), stored).await?;

    match user {
        Some(user) if matches && user.password_hash.is_some() => {
            info!(user_id = user.id, "Login succeeded");
            Ok(user)
        }
        _ => {
            warn!("Login failed");
            Err(DomainError::InvalidCredentials)
        }
    }
}

#[tracing::instrument(skip(pool, request))]
pub async fn complete_profile(
    pool: &PgPool,
    user_id: i64,
    request: &CompleteProfileRequest,
    iterations: u32,
) -> Result<User, DomainError> {
    let cedula = normalize_cedula(&request.cedula)?;
    let name = request.name.as_deref().map(normalize_name).transpose()?;

    let password_hash = match &request.password {
        Some(password) => {
            validate_password(password)?;
            Some(hash_blocking(password.clone(), iterations).await?)
        }
        None => None,
    };

    let user = db::users::complete_profile(pool, user_id, &cedula, name.as_deref(), password_hash.as_deref())
        .await
        .map_err(map_duplicate)?;

    info!(user_id, "Profile completed");
    Ok(user)
}

/// Record an OAuth login: upsert the account (no password, profile
/// incomplete on first sight) and store the session token.
#[tracing::instrument(skip(pool, request), fields(email = %request.email))]
pub async fn sync_oauth_session(pool: &PgPool, request: &OAuthSessionSyncRequest) -> Result<User, DomainError> {
    let email = normalize_email(&request.email)?;
    let name = normalize_name(&request.name)?;

    if request.session_token.trim().is_empty() {
        return Err(DomainError::Validation("sessionToken requerido".to_string()));
    }
    if request.expires <= Utc::now() {
        return Err(DomainError::Validation("expires: la sesión ya expiró".to_string()));
    }

    let user = db::users::upsert_oauth_user(pool, &email, &name).await?;
    db::users::upsert_session(pool, &request.session_token, user.id, request.expires).await?;

    Ok(user)
}

pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<User, DomainError> {
    db::users::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Usuario no encontrado".to_string()))
}

/// Admin edit; users are never deleted
#[tracing::instrument(skip(pool, request))]
pub async fn update_user(pool: &PgPool, user_id: i64, request: &UpdateUserRequest) -> Result<User, DomainError> {
    let name = request.name.as_deref().map(normalize_name).transpose()?;
    let role = match request.role.as_deref() {
        Some(raw) => Some(
            Role::parse(raw).ok_or_else(|| DomainError::Validation("role: debe ser USER o ADMIN".to_string()))?,
        ),
        None => None,
    };

    let user = db::users::update_user_admin(
        pool,
        user_id,
        name.as_deref(),
        role.map(|r| r.as_str()),
        request.points_adjustment.unwrap_or(0),
    )
    .await?;

    info!(user_id, role = %user.role, balance = user.puntos, "User updated by admin");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(normalize_email("ana").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ana@localhost").is_err());
        assert!(normalize_email("ana maria@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_normalize_cedula() {
        assert_eq!(normalize_cedula("001-1234567-8").unwrap(), "00112345678");
        assert_eq!(normalize_cedula("12.345.678").unwrap(), "12345678");
        assert!(normalize_cedula("12345").is_err());
        assert!(normalize_cedula("12345abc").is_err());
    }

    #[test]
    fn test_duplicate_mapping() {
        assert!(matches!(
            map_duplicate(DatabaseError::IntegrityError("users_cedula_key".to_string())),
            DomainError::Validation(msg) if msg.contains("cédula")
        ));
        assert!(matches!(
            map_duplicate(DatabaseError::IntegrityError("users_email_key".to_string())),
            DomainError::Validation(msg) if msg.contains("correo")
        ));
        // anything else is not a duplicate
        assert!(matches!(
            map_duplicate(DatabaseError::NotFound("user".to_string())),
            DomainError::NotFound(_)
        ));
    }
}
