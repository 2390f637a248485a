// Domain layer - business rules with no HTTP concerns
// Handlers call into these modules and translate DomainError into responses

pub mod accounts;
pub mod batch;
pub mod catalog;
pub mod crediting;
pub mod orders;
pub mod recalculation;
pub mod redemption;
pub mod settings;

use chrono::{DateTime, Utc};

use crate::db::{DatabaseError, Retryable};

// Domain error type - no HTTP concerns
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Order already scanned at {scanned_at}")]
    AlreadyScanned { scanned_at: DateTime<Utc> },

    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("Reward out of stock")]
    OutOfStock,

    #[error("Invalid claim transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Transient database error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DatabaseError> for DomainError {
    fn from(e: DatabaseError) -> Self {
        if e.is_retryable() {
            return DomainError::Transient(e.to_string());
        }
        match e {
            DatabaseError::NotFound(msg) => DomainError::NotFound(msg),
            DatabaseError::IntegrityError(constraint) => DomainError::Conflict(constraint),
            DatabaseError::QueryError(sqlx::Error::RowNotFound) => {
                DomainError::NotFound("Resource not found".to_string())
            }
            other => DomainError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        DomainError::from(DatabaseError::QueryError(e))
    }
}

impl Retryable for DomainError {
    fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Transient(_))
    }
}

pub use batch::{BatchReport, BatchedMapper};
pub use crediting::{credit_scan, preview_scan, ScanCredit};
pub use recalculation::{recalculate_points, RecalculationMode, RecalculationReport};
pub use redemption::{check_redemption, create_claim, validate_claim, ClaimReceipt};
