//! In-process TTL cache in front of the remote-backed accessors.
//!
//! Keys are `collection`, `collection:id`, or compound keys such as
//! `collection:list:<userId>`. The cache is invalidate-on-write: mutations
//! remove affected entries rather than updating them in place.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::models::Record;

/// Freshness window for keys that don't belong to a known collection.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached read result: a single record or a list.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    One(Record),
    Many(Vec<Record>),
}

struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// TTL-based read-through cache, process-lifetime, independent of the
/// local store.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An unexpired entry for the key, or `None`. An entry exactly at its
    /// expiry instant counts as expired; expired entries are evicted here.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value under the key for `ttl`.
    pub fn insert(&self, key: impl Into<String>, value: CachedValue, ttl: Duration) {
        self.lock_entries().insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove one entry by exact key.
    pub fn invalidate(&self, key: &str) {
        self.lock_entries().remove(key);
    }

    /// Remove the collection's own entry and every entry whose key is
    /// prefixed by `collection:` (item keys, user- and dog-scoped lists).
    pub fn invalidate_collection(&self, collection: &str) {
        let prefix = format!("{collection}:");
        self.lock_entries()
            .retain(|key, _| key != collection && !key.starts_with(&prefix));
    }

    /// Drop everything, e.g. after a full sync refreshed the local store.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next lookup).
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn dog(name: &str) -> Record {
        Record::from_value(json!({"id": "d1", "userId": "u1", "name": name})).unwrap()
    }

    #[test]
    fn hit_within_ttl_returns_cached_value() {
        let cache = TtlCache::new();
        cache.insert(
            "dogs:list:u1",
            CachedValue::Many(vec![dog("Rex")]),
            Duration::from_secs(60),
        );

        let hit = cache.get("dogs:list:u1").unwrap();
        assert_eq!(hit, CachedValue::Many(vec![dog("Rex")]));
    }

    #[test]
    fn expired_entry_is_absent_and_evicted() {
        let cache = TtlCache::new();
        cache.insert(
            "dogs:d1",
            CachedValue::One(dog("Rex")),
            Duration::from_millis(10),
        );

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("dogs:d1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_entry_is_immediately_expired() {
        let cache = TtlCache::new();
        cache.insert("dogs", CachedValue::Many(Vec::new()), Duration::ZERO);
        assert_eq!(cache.get("dogs"), None);
    }

    #[test]
    fn invalidate_removes_exact_key_only() {
        let cache = TtlCache::new();
        cache.insert(
            "dogs:d1",
            CachedValue::One(dog("Rex")),
            Duration::from_secs(60),
        );
        cache.insert(
            "dogs:d2",
            CachedValue::One(dog("Fido")),
            Duration::from_secs(60),
        );

        cache.invalidate("dogs:d1");

        assert_eq!(cache.get("dogs:d1"), None);
        assert!(cache.get("dogs:d2").is_some());
    }

    #[test]
    fn invalidate_collection_sweeps_prefixed_keys() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.insert("dogs", CachedValue::Many(Vec::new()), ttl);
        cache.insert("dogs:d1", CachedValue::One(dog("Rex")), ttl);
        cache.insert("dogs:list:u1", CachedValue::Many(Vec::new()), ttl);
        cache.insert("activities:list:u1", CachedValue::Many(Vec::new()), ttl);

        cache.invalidate_collection("dogs");

        assert_eq!(cache.get("dogs"), None);
        assert_eq!(cache.get("dogs:d1"), None);
        assert_eq!(cache.get("dogs:list:u1"), None);
        // other collections untouched
        assert!(cache.get("activities:list:u1").is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new();
        cache.insert("dogs", CachedValue::Many(Vec::new()), Duration::from_secs(60));
        cache.insert(
            "vaccinations",
            CachedValue::Many(Vec::new()),
            Duration::from_secs(60),
        );

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
