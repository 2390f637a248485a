use rand::Rng;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DatabaseSettings;
use crate::db::errors::{DatabaseError, Result};

/// Create the connection pool used by the whole application
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool> {
    info!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(300))
        .connect(&settings.url)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("Failed to create pool: {}", e)))?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Create a pool that does not connect until first use
pub fn create_lazy_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect_lazy(database_url)
        .map_err(|e| DatabaseError::ConnectionError(format!("Failed to create pool: {}", e)))
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// Health check for the database connection
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::QueryError)?;

    Ok(())
}

/// Execute a function with retry logic for handling transient errors
pub async fn with_retry<F, Fut, T, E>(max_retries: u8, mut operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!(
                    attempt = attempt,
                    max_retries = max_retries,
                    error = %e,
                    "Retryable error occurred, retrying..."
                );

                // Exponential backoff with jitter
                let delay_ms = (50 * 2_u64.pow(attempt as u32 - 1)).min(1000)
                    + rand::thread_rng().gen_range(0..50);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Errors that may succeed when the same operation is attempted again
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DatabaseError {
    fn is_retryable(&self) -> bool {
        DatabaseError::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_logic() {
        let mut call_count = 0;

        let result = with_retry(3, || {
            call_count += 1;
            let current = call_count;
            async move {
                if current < 3 {
                    Err(DatabaseError::ConnectionError("test error".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_limit() {
        let mut call_count = 0;

        let result: Result<()> = with_retry(2, || {
            call_count += 1;
            async move { Err(DatabaseError::ConnectionError("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(DatabaseError::ConnectionError(_))));
        assert_eq!(call_count, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let mut call_count = 0;

        let result: Result<()> = with_retry(5, || {
            call_count += 1;
            async move { Err(DatabaseError::NotFound("order".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
        assert_eq!(call_count, 1);
    }
}
