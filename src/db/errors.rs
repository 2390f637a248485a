use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Query execution error: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Integrity constraint violation: {0}")]
    IntegrityError(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl DatabaseError {
    /// Postgres SQLSTATE of the underlying error, if any
    fn sql_state(&self) -> Option<String> {
        match self {
            Self::QueryError(e) => e
                .as_database_error()
                .and_then(|db_error| db_error.code().map(|c| c.into_owned())),
            _ => None,
        }
    }

    /// Check if this is a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::IntegrityError(_))
            || self.sql_state().as_deref() == Some("23505")
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_) => true,
            Self::QueryError(_) => matches!(
                self.sql_state().as_deref(),
                Some("40001") | // serialization_failure
                Some("40P01")   // deadlock_detected
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DatabaseError::ConnectionError("reset".to_string()).is_retryable());
        assert!(!DatabaseError::NotFound("order".to_string()).is_retryable());
        assert!(!DatabaseError::QueryError(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_unique_violation_classification() {
        assert!(DatabaseError::IntegrityError("email".to_string()).is_unique_violation());
        assert!(!DatabaseError::QueryError(sqlx::Error::RowNotFound).is_unique_violation());
    }
}
