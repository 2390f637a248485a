use chrono::Duration;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{IdentityChain, TokenSigner};
use crate::config::AppConfig;
use crate::security::{BotDetector, CaptchaVerifier, CounterStore, InMemoryCounterStore, RateLimiter, SecurityLog};

/// Everything a handler may need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub signer: TokenSigner,
    pub identity: IdentityChain,
    pub limiter: RateLimiter,
    pub bot_detector: BotDetector,
    pub security_log: Arc<SecurityLog>,
    pub captcha: Option<CaptchaVerifier>,
}

impl AppState {
    /// Wire the default in-process collaborators around a pool
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let signer = TokenSigner::new(&config.auth.jwt_secret);
        let identity = IdentityChain::standard(signer.clone(), pool.clone());
        let store: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());

        let captcha = config.captcha.clone().and_then(|settings| match CaptchaVerifier::new(settings) {
            Ok(verifier) => Some(verifier),
            Err(e) => {
                tracing::error!("CAPTCHA disabled, client setup failed: {}", e);
                None
            }
        });

        Self {
            pool,
            config: Arc::new(config),
            signer,
            identity,
            limiter: RateLimiter::new(store),
            bot_detector: BotDetector,
            security_log: Arc::new(SecurityLog::default()),
            captcha,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.config.auth.session_ttl_hours)
    }

    pub fn config_access_ttl(&self) -> Duration {
        Duration::minutes(self.config.auth.config_access_ttl_minutes)
    }
}
