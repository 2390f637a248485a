use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Process configuration read from the environment at startup.
///
/// Business settings (points ratio, security key, ...) live in the
/// `system_config` table instead, see [`crate::domain::settings`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub recalculation: RecalculationSettings,
    pub rate_limit_sweep: Duration,
    /// Reverse proxies in front of the service that append to `X-Forwarded-For`.
    /// Zero ignores forwarding headers entirely.
    pub trusted_proxy_hops: usize,
    pub captcha: Option<CaptchaSettings>,
    /// Shared secret for `/internal/*` routes; those routes are disabled when unset
    pub internal_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    /// Validity of the config-screen unlock issued by the security key check
    pub config_access_ttl_minutes: i64,
    pub cookie_secure: bool,
    /// PBKDF2 work factor for newly hashed passwords
    pub password_iterations: u32,
}

#[derive(Debug, Clone)]
pub struct RecalculationSettings {
    pub row_batch_size: usize,
    pub transactional_batch_size: usize,
    pub pause: Duration,
    pub batch_timeout: Duration,
}

impl Default for RecalculationSettings {
    fn default() -> Self {
        Self {
            row_batch_size: 10,
            transactional_batch_size: 100,
            pause: Duration::from_millis(100),
            batch_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptchaSettings {
    pub secret: String,
    pub verify_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_ok() {
            info!("Loaded environment from .env file");
        }

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::Missing("JWT_SECRET"))?
            .trim_matches('"')
            .to_string();

        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                message: "must be at least 16 characters".to_string(),
            });
        }

        let captcha = env::var("CAPTCHA_SECRET").ok().map(|secret| CaptchaSettings {
            secret,
            verify_url: env::var("CAPTCHA_VERIFY_URL").unwrap_or_else(|_| {
                "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
            }),
        });

        Ok(Self {
            port: parse_or("PORT", 3000)?,
            database: DatabaseSettings {
                url: database_url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
                acquire_timeout_secs: parse_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 3)?,
                run_migrations: parse_or("RUN_MIGRATIONS", true)?,
            },
            auth: AuthSettings {
                jwt_secret,
                session_ttl_hours: parse_or("SESSION_TTL_HOURS", 24)?,
                config_access_ttl_minutes: parse_or("CONFIG_ACCESS_TTL_MINUTES", 15)?,
                cookie_secure: parse_or("COOKIE_SECURE", false)?,
                password_iterations: parse_or("PASSWORD_ITERATIONS", crate::auth::password::DEFAULT_ITERATIONS)?,
            },
            recalculation: RecalculationSettings {
                pause: Duration::from_millis(parse_or("RECALC_PAUSE_MS", 100)?),
                ..RecalculationSettings::default()
            },
            rate_limit_sweep: Duration::from_secs(parse_or("RATE_LIMIT_SWEEP_SECS", 60)?),
            trusted_proxy_hops: parse_or("TRUSTED_PROXY_HOPS", 0)?,
            captcha,
            internal_api_key: env::var("INTERNAL_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }

    /// Configuration for tests and local tooling
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            port: 0,
            database: DatabaseSettings {
                url: database_url.to_string(),
                max_connections: 5,
                acquire_timeout_secs: 3,
                run_migrations: false,
            },
            auth: AuthSettings {
                jwt_secret: "test-secret-with-enough-length".to_string(),
                session_ttl_hours: 1,
                config_access_ttl_minutes: 5,
                cookie_secure: false,
                password_iterations: 1_000,
            },
            recalculation: RecalculationSettings {
                pause: Duration::from_millis(1),
                ..RecalculationSettings::default()
            },
            rate_limit_sweep: Duration::from_secs(60),
            trusted_proxy_hops: 0,
            captcha: None,
            internal_api_key: Some("internal-test-key".to_string()),
        }
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        let value: u16 = parse_or("LOYALTY_TEST_UNSET_PORT", 4321).unwrap();
        assert_eq!(value, 4321);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        unsafe {
            std::env::set_var("LOYALTY_TEST_BAD_NUMBER", "not-a-number");
        }
        let result: Result<u64, _> = parse_or("LOYALTY_TEST_BAD_NUMBER", 1);
        assert!(matches!(result, Err(ConfigError::Invalid { key: "LOYALTY_TEST_BAD_NUMBER", .. })));
        unsafe {
            std::env::remove_var("LOYALTY_TEST_BAD_NUMBER");
        }
    }

    #[test]
    fn test_recalculation_defaults() {
        let settings = RecalculationSettings::default();
        assert_eq!(settings.row_batch_size, 10);
        assert_eq!(settings.transactional_batch_size, 100);
        assert_eq!(settings.batch_timeout, Duration::from_secs(30));
    }
}
