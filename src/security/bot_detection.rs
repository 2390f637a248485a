//! Heuristic bot scoring for public forms.
//!
//! Pure functions over request metadata; the caller decides what to do with
//! the verdict and records it in the security log.

use crate::models::FormSignals;

pub const BLOCK_THRESHOLD: f64 = 0.9;
pub const WARN_THRESHOLD: f64 = 0.5;

/// Humans need at least this long to fill a form
const MIN_FILL_MILLIS: i64 = 2_000;
const MAX_FORM_AGE_MILLIS: i64 = 24 * 60 * 60 * 1_000;

const AUTOMATION_MARKERS: [&str; 14] = [
    "bot",
    "crawler",
    "spider",
    "scrapy",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "java/",
    "httpclient",
    "headless",
    "phantomjs",
    "selenium",
];

#[derive(Debug, Clone, Default)]
pub struct RequestSignals<'a> {
    pub user_agent: Option<&'a str>,
    pub honeypot: Option<&'a str>,
    pub form_started_at_ms: Option<i64>,
    pub fingerprint: Option<&'a str>,
    pub now_ms: i64,
}

impl<'a> RequestSignals<'a> {
    pub fn from_form(user_agent: Option<&'a str>, form: &'a FormSignals, now_ms: i64) -> Self {
        Self {
            user_agent,
            honeypot: form.website.as_deref(),
            form_started_at_ms: form.form_started_at,
            fingerprint: form.fingerprint.as_deref(),
            now_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotVerdict {
    Human,
    Suspicious,
    Bot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotAssessment {
    pub score: f64,
    pub reasons: Vec<&'static str>,
}

impl BotAssessment {
    pub fn verdict(&self) -> BotVerdict {
        if self.score >= BLOCK_THRESHOLD {
            BotVerdict::Bot
        } else if self.score >= WARN_THRESHOLD {
            BotVerdict::Suspicious
        } else {
            BotVerdict::Human
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BotDetector;

impl BotDetector {
    pub fn assess(&self, signals: &RequestSignals<'_>) -> BotAssessment {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if signals.honeypot.is_some_and(|v| !v.trim().is_empty()) {
            // Nothing legitimate fills the hidden field
            return BotAssessment {
                score: 1.0,
                reasons: vec!["honeypot field filled"],
            };
        }

        match signals.user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
            None => {
                score += 0.4;
                reasons.push("missing user agent");
            }
            Some(ua) => {
                let ua = ua.to_ascii_lowercase();
                if AUTOMATION_MARKERS.iter().any(|marker| ua.contains(marker)) {
                    score += 0.5;
                    reasons.push("automation user agent");
                }
            }
        }

        if let Some(started) = signals.form_started_at_ms {
            // client supplied, so the difference may not fit an i64
            match signals.now_ms.checked_sub(started) {
                Some(elapsed) if (0..=MAX_FORM_AGE_MILLIS).contains(&elapsed) => {
                    if elapsed < MIN_FILL_MILLIS {
                        score += 0.4;
                        reasons.push("form submitted too fast");
                    }
                }
                _ => {
                    score += 0.2;
                    reasons.push("implausible form timestamp");
                }
            }
        }

        if signals.fingerprint.map_or(true, |f| f.trim().is_empty()) {
            score += 0.1;
            reasons.push("missing fingerprint");
        }

        BotAssessment {
            score: f64::min(score, 1.0),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const BROWSER: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0";

    fn human() -> RequestSignals<'static> {
        RequestSignals {
            user_agent: Some(BROWSER),
            honeypot: None,
            form_started_at_ms: Some(NOW - 15_000),
            fingerprint: Some("fp-123"),
            now_ms: NOW,
        }
    }

    #[test]
    fn test_human_passes() {
        let assessment = BotDetector.assess(&human());
        assert_eq!(assessment.score, 0.0);
        assert!(assessment.reasons.is_empty());
        assert_eq!(assessment.verdict(), BotVerdict::Human);
    }

    #[test]
    fn test_honeypot_blocks() {
        let signals = RequestSignals {
            honeypot: Some("http://spam.example"),
            ..human()
        };
        let assessment = BotDetector.assess(&signals);
        assert_eq!(assessment.score, 1.0);
        assert_eq!(assessment.verdict(), BotVerdict::Bot);

        // whitespace only is not filled
        let blank = RequestSignals {
            honeypot: Some("  "),
            ..human()
        };
        assert_eq!(BotDetector.assess(&blank).verdict(), BotVerdict::Human);
    }

    #[test]
    fn test_scripted_fast_submission_blocks() {
        let signals = RequestSignals {
            user_agent: Some("python-requests/2.31"),
            form_started_at_ms: Some(NOW - 300),
            fingerprint: None,
            ..human()
        };
        let assessment = BotDetector.assess(&signals);
        assert!(assessment.score >= BLOCK_THRESHOLD, "score {}", assessment.score);
        assert_eq!(assessment.verdict(), BotVerdict::Bot);
        assert_eq!(
            assessment.reasons,
            vec!["automation user agent", "form submitted too fast", "missing fingerprint"]
        );
    }

    #[test]
    fn test_curl_alone_is_suspicious() {
        let signals = RequestSignals {
            user_agent: Some("curl/8.4.0"),
            ..human()
        };
        assert_eq!(BotDetector.assess(&signals).verdict(), BotVerdict::Suspicious);
    }

    #[test]
    fn test_missing_user_agent_and_future_timestamp() {
        let signals = RequestSignals {
            user_agent: None,
            form_started_at_ms: Some(NOW + 60_000),
            ..human()
        };
        let assessment = BotDetector.assess(&signals);
        assert_eq!(assessment.reasons, vec!["missing user agent", "implausible form timestamp"]);
        assert_eq!(assessment.verdict(), BotVerdict::Suspicious);
    }

    #[test]
    fn test_extreme_form_timestamps_are_implausible() {
        for started in [i64::MIN, i64::MAX, -1] {
            let signals = RequestSignals {
                form_started_at_ms: Some(started),
                ..human()
            };
            let assessment = BotDetector.assess(&signals);
            assert_eq!(assessment.reasons, vec!["implausible form timestamp"], "started {}", started);
            assert_eq!(assessment.verdict(), BotVerdict::Human);
        }
    }
}
