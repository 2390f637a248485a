use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CaptchaSettings;

#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("captcha token missing")]
    Missing,

    #[error("captcha rejected: {0}")]
    Rejected(String),

    #[error("captcha service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Server-side verification of CAPTCHA tokens against a siteverify endpoint
#[derive(Debug, Clone)]
pub struct CaptchaVerifier {
    client: Client,
    settings: CaptchaSettings,
}

impl CaptchaVerifier {
    pub fn new(settings: CaptchaSettings) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        Ok(Self { client, settings })
    }

    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Result<(), CaptchaError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(CaptchaError::Missing)?;

        let response = self
            .client
            .post(&self.settings.verify_url)
            .json(&VerifyRequest {
                secret: &self.settings.secret,
                response: token,
                remoteip: remote_ip,
            })
            .send()
            .await
            .map_err(|e| {
                warn!("CAPTCHA verification request failed: {}", e);
                CaptchaError::Unavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(CaptchaError::Unavailable(format!("status {}", response.status())));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        if body.success {
            debug!("CAPTCHA verified");
            Ok(())
        } else {
            Err(CaptchaError::Rejected(body.error_codes.join(",")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CaptchaVerifier {
        CaptchaVerifier::new(CaptchaSettings {
            secret: "secret".to_string(),
            verify_url: "http://127.0.0.1:9/siteverify".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_network() {
        assert!(matches!(verifier().verify(None, None).await, Err(CaptchaError::Missing)));
        assert!(matches!(verifier().verify(Some("  "), None).await, Err(CaptchaError::Missing)));
    }

    #[test]
    fn test_parse_verify_response() {
        let body: VerifyResponse =
            serde_json::from_str(r#"{"success":false,"error-codes":["invalid-input-response"]}"#).unwrap();
        assert!(!body.success);
        assert_eq!(body.error_codes, vec!["invalid-input-response"]);
    }
}
