use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::counter_store::CounterStore;

/// Budget for one kind of request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u64,
    pub window: Duration,
    /// How long a client stays blocked once the budget is exhausted
    pub block_for: Duration,
}

impl RateLimitPolicy {
    pub const LOGIN: Self = Self {
        name: "login",
        max_requests: 5,
        window: Duration::from_secs(15 * 60),
        block_for: Duration::from_secs(15 * 60),
    };

    pub const REGISTER: Self = Self {
        name: "register",
        max_requests: 3,
        window: Duration::from_secs(60 * 60),
        block_for: Duration::from_secs(60 * 60),
    };

    pub const SCAN: Self = Self {
        name: "scan",
        max_requests: 10,
        window: Duration::from_secs(60),
        block_for: Duration::from_secs(5 * 60),
    };

    pub const SECURITY_KEY: Self = Self {
        name: "security-key",
        max_requests: 5,
        window: Duration::from_secs(15 * 60),
        block_for: Duration::from_secs(30 * 60),
    };

    pub const CLAIM: Self = Self {
        name: "claim",
        max_requests: 10,
        window: Duration::from_secs(60),
        block_for: Duration::from_secs(5 * 60),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u64 },
    Blocked { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, RateLimitDecision::Blocked { .. })
    }
}

/// Identifies a client: source IP plus a digest of its User-Agent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub ip: String,
    pub user_agent: String,
    ua_digest: String,
}

impl ClientKey {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let digest = Sha256::digest(user_agent.as_bytes());
        let ua_digest = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();

        Self {
            ip: ip.into(),
            user_agent,
            ua_digest,
        }
    }

    /// Resolve the client address. With `trusted_hops == 0` forwarding headers
    /// are ignored and the socket address is used. Otherwise the client is the
    /// `trusted_hops`-th `X-Forwarded-For` entry counted from the right, since
    /// anything left of it was written by the client itself.
    pub fn from_request(headers: &HeaderMap, peer: Option<IpAddr>, trusted_hops: usize) -> Self {
        let forwarded = (trusted_hops > 0)
            .then(|| {
                headers
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.rsplit(',').nth(trusted_hops - 1))
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            })
            .flatten();

        let real_ip = (trusted_hops > 0)
            .then(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            })
            .flatten();

        let ip = forwarded
            .or(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|p| p.to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        Self::new(ip, user_agent)
    }

    pub fn as_key(&self) -> String {
        format!("{}:{}", self.ip, self.ua_digest)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count one request against `policy` and decide whether it may proceed
    pub async fn check(&self, policy: &RateLimitPolicy, client: &ClientKey) -> RateLimitDecision {
        let client_key = client.as_key();
        let block_key = format!("rl:block:{}:{}", policy.name, client_key);

        if self.store.get(&block_key).await.is_some() {
            let retry_after = self.store.ttl(&block_key).await.unwrap_or(policy.block_for);
            return RateLimitDecision::Blocked { retry_after };
        }

        let count_key = format!("rl:{}:{}", policy.name, client_key);
        let count = self.store.incr(&count_key, policy.window).await;

        if count > policy.max_requests {
            self.store.set(&block_key, 1, policy.block_for).await;
            warn!(
                policy = policy.name,
                ip = %client.ip,
                count,
                "Rate limit exceeded, blocking client"
            );
            return RateLimitDecision::Blocked {
                retry_after: policy.block_for,
            };
        }

        RateLimitDecision::Allowed {
            remaining: policy.max_requests - count,
        }
    }

    /// Forget the client's count for `policy`, e.g. after a successful login
    pub async fn reset(&self, policy: &RateLimitPolicy, client: &ClientKey) {
        let count_key = format!("rl:{}:{}", policy.name, client.as_key());
        self.store.set(&count_key, 0, policy.window).await;
    }
}

/// Periodically evict expired counters until the task is aborted
pub fn spawn_sweeper(store: Arc<dyn CounterStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = store.sweep().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired rate-limit counters");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::counter_store::InMemoryCounterStore;
    use axum::http::HeaderValue;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryCounterStore::new()))
    }

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        name: "test",
        max_requests: 3,
        window: Duration::from_secs(60),
        block_for: Duration::from_secs(300),
    };

    #[tokio::test(start_paused = true)]
    async fn test_budget_then_block() {
        let limiter = limiter();
        let client = ClientKey::new("10.0.0.1", "Mozilla/5.0");

        assert_eq!(limiter.check(&POLICY, &client).await, RateLimitDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check(&POLICY, &client).await, RateLimitDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check(&POLICY, &client).await, RateLimitDecision::Allowed { remaining: 0 });
        assert_eq!(
            limiter.check(&POLICY, &client).await,
            RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(300)
            }
        );

        // block outlives the window
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(
            limiter.check(&POLICY, &client).await,
            RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(180)
            }
        );

        tokio::time::advance(Duration::from_secs(181)).await;
        assert!(!limiter.check(&POLICY, &client).await.is_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = limiter();
        let a = ClientKey::new("10.0.0.1", "curl/8.0");
        let b = ClientKey::new("10.0.0.1", "Mozilla/5.0");

        for _ in 0..4 {
            limiter.check(&POLICY, &a).await;
        }
        assert!(limiter.check(&POLICY, &a).await.is_blocked());
        assert!(!limiter.check(&POLICY, &b).await.is_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_budget() {
        let limiter = limiter();
        let client = ClientKey::new("10.0.0.2", "ua");
        limiter.check(&POLICY, &client).await;
        limiter.check(&POLICY, &client).await;

        limiter.reset(&POLICY, &client).await;
        assert_eq!(limiter.check(&POLICY, &client).await, RateLimitDecision::Allowed { remaining: 2 });
    }

    #[test]
    fn test_client_key_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.9, 203.0.113.7"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
        let peer: IpAddr = "127.0.0.1".parse().unwrap();

        let key = ClientKey::from_request(&headers, Some(peer), 1);
        assert_eq!(key.ip, "203.0.113.7");
        assert_eq!(key.user_agent, "Mozilla/5.0");

        let two_hops = ClientKey::from_request(&headers, Some(peer), 2);
        assert_eq!(two_hops.ip, "198.51.100.9");

        // chain shorter than the configured hops
        let short = ClientKey::from_request(&headers, Some(peer), 3);
        assert_eq!(short.ip, "127.0.0.1");

        let bare = ClientKey::from_request(&HeaderMap::new(), None, 1);
        assert_eq!(bare.ip, "unknown");
        assert!(bare.as_key().starts_with("unknown:"));
    }

    #[test]
    fn test_forwarding_headers_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.8"));

        let key = ClientKey::from_request(&headers, Some("192.0.2.1".parse().unwrap()), 0);
        assert_eq!(key.ip, "192.0.2.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spoofed_forwarded_entries_share_one_budget() {
        let limiter = limiter();
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        // the client rotates the left-most entry, the proxy appends the real address
        for fake in ["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4"] {
            let mut headers = HeaderMap::new();
            let chain = format!("{}, 203.0.113.7", fake);
            headers.insert("x-forwarded-for", HeaderValue::from_str(&chain).unwrap());
            let client = ClientKey::from_request(&headers, Some(peer), 1);
            assert_eq!(client.ip, "203.0.113.7");
            limiter.check(&POLICY, &client).await;
        }

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("5.5.5.5, 203.0.113.7"));
        let client = ClientKey::from_request(&headers, Some(peer), 1);
        assert!(limiter.check(&POLICY, &client).await.is_blocked());
    }
}
