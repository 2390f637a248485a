// Abuse heuristics consulted before login, registration, scans, claims
// and security-key checks. All state is in-process and best effort.

pub mod bot_detection;
pub mod captcha;
pub mod counter_store;
pub mod rate_limit;
pub mod security_log;

pub use bot_detection::{BotAssessment, BotDetector, BotVerdict, RequestSignals};
pub use captcha::{CaptchaError, CaptchaVerifier};
pub use counter_store::{CounterStore, InMemoryCounterStore};
pub use rate_limit::{spawn_sweeper, ClientKey, RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use security_log::{AlertKind, SecurityAlert, SecurityLog};
