//! Pattern cache keyed by document identity and content hash.
//!
//! Entries expire after a fixed lifetime. The cache is an explicit value owned by the
//! pipeline, never a global.

use crate::patterns::DetectedPatterns;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Identifies one analysis: the document and the exact text it was run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    document_id: String,
    content_hash: String,
}

impl CacheKey {
    pub fn new(document_id: impl Into<String>, text: &str) -> Self {
        Self {
            document_id: document_id.into(),
            content_hash: content_hash(text),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

#[derive(Debug, Clone)]
struct Entry {
    patterns: DetectedPatterns,
    stored_at: Instant,
}

/// Detected patterns per document, with expiry.
#[derive(Debug, Clone)]
pub struct PatternCache {
    ttl: Duration,
    entries: HashMap<CacheKey, Entry>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600))
    }
}

impl PatternCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Changes the lifetime; existing entries are judged against the new value.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Looks up a live entry.
    pub fn get(&self, key: &CacheKey) -> Option<&DetectedPatterns> {
        self.get_at(key, Instant::now())
    }

    /// Looks up an entry as of `now`.
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<&DetectedPatterns> {
        self.entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .map(|entry| &entry.patterns)
    }

    pub fn insert(&mut self, key: CacheKey, patterns: DetectedPatterns) {
        self.insert_at(key, patterns, Instant::now());
    }

    pub fn insert_at(&mut self, key: CacheKey, patterns: DetectedPatterns, now: Instant) {
        self.entries.insert(
            key,
            Entry {
                patterns,
                stored_at: now,
            },
        );
    }

    /// Drops one entry, returning it if it was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> Option<DetectedPatterns> {
        self.entries.remove(key).map(|entry| entry.patterns)
    }

    /// Drops every entry that has expired as of `now`; returns how many were dropped.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::DetectionSource;

    fn patterns() -> DetectedPatterns {
        DetectedPatterns {
            has_index: true,
            source: DetectionSource::Oracle,
            ..DetectedPatterns::default()
        }
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_key_distinguishes_content() {
        let a = CacheKey::new("doc", "text one");
        let b = CacheKey::new("doc", "text two");
        let c = CacheKey::new("other", "text one");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, CacheKey::new("doc", "text one"));
    }

    #[test]
    fn test_entries_expire() {
        let mut cache = PatternCache::new(Duration::from_secs(60));
        let key = CacheKey::new("doc", "body");
        let start = Instant::now();
        cache.insert_at(key.clone(), patterns(), start);

        assert!(cache.get_at(&key, start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&key, start + Duration::from_secs(60)).is_none());
        assert_eq!(cache.purge_expired(start + Duration::from_secs(61)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let mut cache = PatternCache::default();
        let key = CacheKey::new("doc", "body");
        cache.insert(key.clone(), patterns());
        assert!(cache.get(&key).is_some_and(|p| p.has_index));
        assert!(cache.invalidate(&key).is_some());
        assert!(cache.get(&key).is_none());
    }
}
