//! Response cache: avoid burning tokens on repeated design requests.
//!
//! Entries are keyed by `(request, domain)` and expire after a fixed TTL.
//! When the map grows past its sweep threshold, every expired entry is
//! evicted in one pass; there is no LRU ordering. The cache lives entirely
//! in process memory.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::time::Instant;

use schemaflow_types::DesignDomain;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SWEEP_THRESHOLD: usize = 50;

struct CacheEntry {
    response: String,
    inserted_at: Instant,
}

pub struct ResponseCache {
    entries: StdMutex<HashMap<(String, DesignDomain), CacheEntry>>,
    ttl: Duration,
    sweep_threshold: usize,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_limits(ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
            ttl,
            sweep_threshold,
        }
    }

    /// Look up a cached response. Returns `None` on miss or if the entry
    /// has expired.
    pub fn get(&self, request: &str, domain: DesignDomain) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&(request.to_string(), domain))?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.response.clone())
    }

    /// Store a response, sweeping out every expired entry once the map
    /// grows past the threshold.
    pub fn put(&self, request: &str, domain: DesignDomain, response: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(
            (request.to_string(), domain),
            CacheEntry {
                response: response.to_string(),
                inserted_at: Instant::now(),
            },
        );
        if entries.len() > self.sweep_threshold {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let cache = ResponseCache::new();
        cache.put("orders db", DesignDomain::Relational, "CREATE TABLE orders;");
        assert_eq!(
            cache.get("orders db", DesignDomain::Relational).as_deref(),
            Some("CREATE TABLE orders;")
        );
    }

    #[tokio::test]
    async fn key_varies_by_domain() {
        let cache = ResponseCache::new();
        cache.put("orders db", DesignDomain::Relational, "sql");
        assert!(cache.get("orders db", DesignDomain::Document).is_none());
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = ResponseCache::new();
        assert!(cache.get("nonexistent", DesignDomain::Vector).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_returns_none() {
        let cache = ResponseCache::new();
        cache.put("orders db", DesignDomain::Relational, "sql");

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(cache.get("orders db", DesignDomain::Relational).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_expired_entries_past_threshold() {
        let cache = ResponseCache::with_limits(Duration::from_secs(60), 5);
        for i in 0..5 {
            cache.put(&format!("req {i}"), DesignDomain::Relational, "old");
        }

        tokio::time::advance(Duration::from_secs(61)).await;

        // The sixth insert pushes the map past the threshold; all five
        // expired entries go in one sweep.
        cache.put("fresh", DesignDomain::Relational, "new");
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("fresh", DesignDomain::Relational).as_deref(),
            Some("new")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_live_entries() {
        let cache = ResponseCache::with_limits(Duration::from_secs(60), 3);
        cache.put("a", DesignDomain::Relational, "1");
        cache.put("b", DesignDomain::Relational, "2");

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.put("c", DesignDomain::Relational, "3");
        cache.put("d", DesignDomain::Relational, "4");

        // a and b are halfway through their TTL, still live.
        assert_eq!(cache.len(), 4);
    }
}
