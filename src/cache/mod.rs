use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub uri: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<T> {
    content_hash: String,
    template_hash: String,
    cached_at: DateTime<Utc>,
    payload: T,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub mismatched: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Content-addressed, TTL-bound cache of LLM analysis results (C4, §4.3).
/// Grounded on the pack's `QueryCache`: a bounded LRU with a TTL check
/// layered on top of each lookup, plus hit-rate accounting.
pub struct AnalysisCache<T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync> {
    entries: Mutex<LruCache<(String, String), CacheEntry<T>>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl<T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync> AnalysisCache<T> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap();
        AnalysisCache {
            entries: Mutex::new(LruCache::new(cap)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }

    pub fn content_hash(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect::<String>().chars().take(16).collect()
    }

    /// Returns the payload iff both hashes match and the entry is not older
    /// than TTL. Mismatch deletes the entry; corrupt/expired entries are
    /// treated as misses (§4.3).
    pub fn get(&self, key: &CacheKey, content_hash: &str, template_hash: &str) -> Option<T> {
        let raw_key = (key.uri.clone(), key.model_name.clone());
        let mut entries = self.entries.lock();
        let entry = entries.peek(&raw_key).cloned();
        match entry {
            None => {
                self.stats.lock().misses += 1;
                None
            }
            Some(entry) => {
                let expired = Utc::now().signed_duration_since(entry.cached_at).to_std().unwrap_or(Duration::MAX) > self.ttl;
                let hash_mismatch = entry.content_hash != content_hash || entry.template_hash != template_hash;
                if expired || hash_mismatch {
                    entries.pop(&raw_key);
                    let mut stats = self.stats.lock();
                    if expired {
                        stats.expired += 1;
                    } else {
                        stats.mismatched += 1;
                    }
                    None
                } else {
                    entries.promote(&raw_key);
                    self.stats.lock().hits += 1;
                    Some(entry.payload)
                }
            }
        }
    }

    /// Overwrites any existing entry for `key` (last-writer-wins, §5).
    pub fn set(&self, key: CacheKey, content_hash: String, payload: T, template_hash: String) {
        let raw_key = (key.uri, key.model_name);
        self.entries.lock().put(
            raw_key,
            CacheEntry { content_hash, template_hash, cached_at: Utc::now(), payload },
        );
    }

    pub fn delete(&self, key: &CacheKey) {
        let raw_key = (key.uri.clone(), key.model_name.clone());
        self.entries.lock().pop(&raw_key);
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.entries = self.entries.lock().len();
        stats
    }

    /// Sweeps entries older than TTL; returns the number removed (§4.3).
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Utc::now();
        let ttl = self.ttl;
        let stale: Vec<(String, String)> = entries
            .iter()
            .filter(|(_, v)| now.signed_duration_since(v.cached_at).to_std().unwrap_or(Duration::MAX) > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            entries.pop(k);
        }
        stale.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        *self.stats.lock() = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey { uri: "https://ex.com/a1".into(), model_name: "m1".into() }
    }

    #[test]
    fn set_then_get_roundtrips() {
        let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
        cache.set(key(), "h1".into(), "payload".to_string(), "t1".into());
        assert_eq!(cache.get(&key(), "h1", "t1"), Some("payload".to_string()));
    }

    #[test]
    fn content_hash_mismatch_is_a_miss_and_deletes() {
        let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
        cache.set(key(), "h1".into(), "payload".to_string(), "t1".into());
        assert_eq!(cache.get(&key(), "h2", "t1"), None);
        assert_eq!(cache.get(&key(), "h1", "t1"), None);
    }

    #[test]
    fn delete_then_get_returns_none() {
        let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
        cache.set(key(), "h1".into(), "payload".to_string(), "t1".into());
        cache.delete(&key());
        assert_eq!(cache.get(&key(), "h1", "t1"), None);
    }

    #[test]
    fn expired_entry_is_treated_as_miss() {
        let cache: AnalysisCache<String> = AnalysisCache::new(10, Duration::from_secs(0));
        cache.set(key(), "h1".into(), "payload".to_string(), "t1".into());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key(), "h1", "t1"), None);
    }
}
