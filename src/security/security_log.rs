use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    RateLimited,
    BotBlocked,
    BotSuspected,
    CaptchaFailed,
    InvalidSecurityKey,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub kind: AlertKind,
    pub ip: String,
    pub endpoint: String,
    pub detail: String,
    pub user_id: Option<i64>,
    pub at: DateTime<Utc>,
}

/// Most recent security alerts, oldest dropped first
#[derive(Debug)]
pub struct SecurityLog {
    alerts: Mutex<VecDeque<SecurityAlert>>,
    capacity: usize,
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SecurityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(
        &self,
        kind: AlertKind,
        ip: &str,
        endpoint: &str,
        detail: impl Into<String>,
        user_id: Option<i64>,
    ) {
        let alert = SecurityAlert {
            kind,
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
            detail: detail.into(),
            user_id,
            at: Utc::now(),
        };

        warn!(
            kind = ?alert.kind,
            ip = %alert.ip,
            endpoint = %alert.endpoint,
            detail = %alert.detail,
            user_id = ?alert.user_id,
            "Security alert"
        );

        let mut alerts = self.alerts.lock().await;
        if alerts.len() == self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    /// Newest first
    pub async fn recent(&self, limit: usize) -> Vec<SecurityAlert> {
        let alerts = self.alerts.lock().await;
        alerts.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_and_newest_first() {
        let log = SecurityLog::with_capacity(3);
        for i in 0..5 {
            log.record(AlertKind::RateLimited, "10.0.0.1", "/api/auth/login", format!("attempt {}", i), None)
                .await;
        }

        let recent = log.recent(10).await;
        let details: Vec<&str> = recent.iter().map(|a| a.detail.as_str()).collect();
        assert_eq!(details, vec!["attempt 4", "attempt 3", "attempt 2"]);

        assert_eq!(log.recent(1).await.len(), 1);
    }

    #[test]
    fn test_alert_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AlertKind::InvalidSecurityKey).unwrap(),
            "\"INVALID_SECURITY_KEY\""
        );
    }
}
