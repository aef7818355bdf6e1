//! Clock-driven TTL cache
//!
//! Shared by the consensus engine (keyed by name and region), the region
//! coordinator (keyed by name and country) and the integration facade
//! (packages by name). Each entry carries its own TTL. Concurrent writers for
//! the same key simply overwrite each other.

use chrono::{DateTime, Duration, Utc};
use pinpoint_common::Clock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Drop one entry, returning whether it existed
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Entry count, including expired entries not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
