use crate::application::advisor::schema::AdvisorReport;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Process-local TTL cache for advisor responses, keyed by the hash of the
/// prompt. Hits bypass the entire provider-selection path. Expiry is
/// handled by the cache on read.
pub struct ResponseCache {
    inner: Cache<String, AdvisorReport>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, prompt: &str) -> Option<AdvisorReport> {
        self.inner.get(&Self::key(prompt))
    }

    pub fn insert(&self, prompt: &str, report: AdvisorReport) {
        self.inner.insert(Self::key(prompt), report);
    }

    fn key(prompt: &str) -> String {
        hex::encode(Sha256::digest(prompt.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::advisor::provider::ProviderId;

    fn report() -> AdvisorReport {
        AdvisorReport {
            provider: ProviderId::Requesty,
            model: "test-model".to_string(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60), 128);
        cache.insert("analyze AAPL", report());

        assert!(cache.get("analyze AAPL").is_some());
        assert!(cache.get("analyze TSLA").is_none());
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = ResponseCache::new(Duration::from_millis(10), 128);
        cache.insert("analyze AAPL", report());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("analyze AAPL").is_none());
    }

    #[test]
    fn test_key_is_prompt_hash() {
        // Same prompt, same key; the raw prompt never appears in the key.
        let key = ResponseCache::key("analyze AAPL");
        assert_eq!(key, ResponseCache::key("analyze AAPL"));
        assert_eq!(key.len(), 64);
        assert!(!key.contains("AAPL"));
    }
}
