//! TTL cache for upstream payloads
//!
//! Entries are replaced wholesale on each successful fetch and never evicted;
//! staleness is only checked on read. Fills for one key are serialised through
//! a per-key gate so overlapping misses share a single upstream call.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: String,
    pub subject: String,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            subject: subject.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.operation, self.subject)
    }
}

/// Outcome of consulting the cache before going to the network
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Value),
    Miss,
}

struct CachedPayload {
    payload: Value,
    stored_at: Instant,
}

pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CachedPayload>>,
    fill_gates: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fill_gates: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Exclusive right to fill `key`; callers re-check `lookup` once it is held.
    pub async fn fill_gate(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.fill_gates.lock().await;
            gates.entry(key.clone()).or_default().clone()
        };
        gate.lock_owned().await
    }

    pub async fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                CacheLookup::Hit(entry.payload.clone())
            }
            _ => CacheLookup::Miss,
        }
    }

    pub async fn store(&self, key: CacheKey, payload: Value) {
        let entry = CachedPayload {
            payload,
            stored_at: Instant::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_then_miss() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = CacheKey::new("fetch_net_worth", "user-1");

        assert_eq!(cache.lookup(&key).await, CacheLookup::Miss);

        cache.store(key.clone(), json!({"total": 10})).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.lookup(&key).await, CacheLookup::Hit(json!({"total": 10})));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.lookup(&key).await, CacheLookup::Miss);
        // stale entries stay until replaced
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_scoped_by_subject() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache
            .store(CacheKey::new("fetch_net_worth", "a"), json!(1))
            .await;

        assert_eq!(
            cache.lookup(&CacheKey::new("fetch_net_worth", "b")).await,
            CacheLookup::Miss
        );
        assert_eq!(CacheKey::new("portfolio", "a").to_string(), "portfolio_a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_gate_is_exclusive_per_key() {
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let key = CacheKey::new("fetch_net_worth", "a");

        let held = cache.fill_gate(&key).await;

        let other = CacheKey::new("fetch_net_worth", "b");
        let _other_gate = cache.fill_gate(&other).await;

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _gate = cache.fill_gate(&key).await;
                cache.lookup(&key).await
            })
        };

        cache.store(key.clone(), json!("filled")).await;
        drop(held);

        assert_eq!(waiter.await.unwrap(), CacheLookup::Hit(json!("filled")));
    }
}
