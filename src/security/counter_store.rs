use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Expiring counters keyed by string, the storage behind rate limiting.
///
/// Semantics follow the usual key/value store contract: a counter that has
/// expired reads as absent and `incr` on it starts over at 1.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<u64>;

    /// Increment and return the new value; a fresh counter lives for `window`
    async fn incr(&self, key: &str, window: Duration) -> u64;

    /// Reset the remaining lifetime of an existing counter
    async fn expire(&self, key: &str, ttl: Duration) -> bool;

    async fn ttl(&self, key: &str) -> Option<Duration>;

    /// Store `value` for `ttl`, replacing whatever was there
    async fn set(&self, key: &str, value: u64, ttl: Duration);

    /// Drop expired counters, returning how many were removed
    async fn sweep(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store; counters are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value)
    }

    async fn incr(&self, key: &str, window: Duration) -> u64 {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: now + window,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: 0,
                expires_at: now + window,
            };
        }
        entry.value += 1;
        entry.value
    }

    async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                entry.expires_at = now + ttl;
                true
            }
            None => false,
        }
    }

    async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) {
        let now = Instant::now();
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_incr_within_window() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.incr("k", Duration::from_secs(60)).await, 1);
        assert_eq!(store.incr("k", Duration::from_secs(60)).await, 2);
        assert_eq!(store.get("k").await, Some(2));
        assert_eq!(store.get("other").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires() {
        let store = InMemoryCounterStore::new();
        store.incr("k", Duration::from_secs(10)).await;
        store.incr("k", Duration::from_secs(10)).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await, None);
        // starts over
        assert_eq!(store.incr("k", Duration::from_secs(10)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_and_ttl() {
        let store = InMemoryCounterStore::new();
        assert!(!store.expire("missing", Duration::from_secs(5)).await);

        store.incr("k", Duration::from_secs(10)).await;
        assert!(store.expire("k", Duration::from_secs(300)).await);
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let store = InMemoryCounterStore::new();
        store.incr("short", Duration::from_secs(1)).await;
        store.set("long", 3, Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("long").await, Some(3));
    }
}
