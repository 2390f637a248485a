use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::db::DatabaseError;
use crate::domain::DomainError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    AlreadyScanned { scanned_at: DateTime<Utc> },
    RateLimited { retry_after: Duration },
    Internal(String),
    Database(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::AlreadyScanned { scanned_at } => write!(f, "Already scanned at {}", scanned_at),
            ApiError::RateLimited { retry_after } => write!(f, "Rate limited for {}s", retry_after.as_secs()),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("Debes iniciar sesión".to_string())
    }

    pub fn admin_only() -> Self {
        ApiError::Forbidden("Acceso denegado. Se requieren permisos de administrador".to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scanned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut scanned_at = None;
        let mut retry_after = None;

        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::AlreadyScanned { scanned_at: at } => {
                scanned_at = Some(at);
                (
                    StatusCode::BAD_REQUEST,
                    "already_scanned",
                    "Este código QR ya fue utilizado".to_string(),
                )
            }
            ApiError::RateLimited { retry_after: after } => {
                retry_after = Some(after.as_secs().max(1));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    "Demasiadas solicitudes. Intenta de nuevo más tarde".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Error interno del servidor".to_string(),
                )
            }
            ApiError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Error interno del servidor".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_type,
            message,
            scanned_at,
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::Validation(msg),
            DomainError::NotFound(msg) => ApiError::NotFound(msg),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::InvalidCredentials => {
                ApiError::Unauthorized("Correo o contraseña incorrectos".to_string())
            }
            DomainError::Forbidden(msg) => ApiError::Forbidden(msg),
            DomainError::AlreadyScanned { scanned_at } => ApiError::AlreadyScanned { scanned_at },
            DomainError::InsufficientPoints { balance, required } => ApiError::BadRequest(format!(
                "Puntos insuficientes: tienes {} y se requieren {}",
                balance, required
            )),
            DomainError::OutOfStock => ApiError::BadRequest("Recompensa agotada".to_string()),
            DomainError::InvalidTransition { from, to } => ApiError::BadRequest(format!(
                "No se puede cambiar el estado de {} a {}",
                from, to
            )),
            DomainError::Transient(msg) | DomainError::Database(msg) => ApiError::Database(msg),
            DomainError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::from(DomainError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("Cuerpo de la solicitud inválido: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Parámetro de ruta inválido: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Parámetros de consulta inválidos: {}", rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_already_scanned_carries_timestamp() {
        let at = "2025-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let response = ApiError::from(DomainError::AlreadyScanned { scanned_at: at }).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "already_scanned");
        assert_eq!(body["scannedAt"], "2025-03-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_secs(90),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "90");
        assert_eq!(body_json(response).await["retryAfter"], 90);
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_leaked() {
        let response = ApiError::Database("relation \"users\" does not exist".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Error interno del servidor");
    }

    #[test]
    fn test_domain_mapping() {
        assert!(matches!(
            ApiError::from(DomainError::InsufficientPoints { balance: 50, required: 100 }),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(ApiError::from(DomainError::InvalidCredentials), ApiError::Unauthorized(_)));
        assert!(matches!(
            ApiError::from(DatabaseError::NotFound("user 3".to_string())),
            ApiError::NotFound(_)
        ));
    }
}
