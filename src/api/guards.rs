use chrono::Utc;

use super::error::{ApiError, ApiResult};
use super::extract::RequestMeta;
use super::state::AppState;
use crate::models::FormSignals;
use crate::security::{AlertKind, BotVerdict, RateLimitDecision, RateLimitPolicy, RequestSignals};

/// Count the request against `policy`; blocked clients get 429
pub async fn enforce_rate_limit(
    state: &AppState,
    policy: &RateLimitPolicy,
    meta: &RequestMeta,
    user_id: Option<i64>,
) -> ApiResult<()> {
    match state.limiter.check(policy, &meta.client).await {
        RateLimitDecision::Allowed { .. } => Ok(()),
        RateLimitDecision::Blocked { retry_after } => {
            state
                .security_log
                .record(
                    AlertKind::RateLimited,
                    &meta.client.ip,
                    &meta.path,
                    format!("policy {} exhausted, retry in {}s", policy.name, retry_after.as_secs()),
                    user_id,
                )
                .await;
            Err(ApiError::RateLimited { retry_after })
        }
    }
}

/// Score a public form submission. Bots are rejected, suspicious clients are
/// logged and let through.
pub async fn screen_form(state: &AppState, meta: &RequestMeta, form: &FormSignals) -> ApiResult<()> {
    let signals = RequestSignals::from_form(meta.user_agent.as_deref(), form, Utc::now().timestamp_millis());
    let assessment = state.bot_detector.assess(&signals);

    match assessment.verdict() {
        BotVerdict::Human => Ok(()),
        BotVerdict::Suspicious => {
            state
                .security_log
                .record(
                    AlertKind::BotSuspected,
                    &meta.client.ip,
                    &meta.path,
                    format!("score {:.2}: {}", assessment.score, assessment.reasons.join(", ")),
                    None,
                )
                .await;
            Ok(())
        }
        BotVerdict::Bot => {
            state
                .security_log
                .record(
                    AlertKind::BotBlocked,
                    &meta.client.ip,
                    &meta.path,
                    format!("score {:.2}: {}", assessment.score, assessment.reasons.join(", ")),
                    None,
                )
                .await;
            Err(ApiError::Forbidden("Solicitud bloqueada por actividad sospechosa".to_string()))
        }
    }
}
