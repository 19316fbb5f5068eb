use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default bound on stored entries.
pub const MAX_CACHE_SIZE: usize = 10_000;

/// TtlCache
///
/// A bounded, thread-safe map whose entries expire a fixed `ttl` after insertion.
/// Expired entries are never served. When an insert finds the cache full, expired
/// entries are evicted first, then a tenth of the remaining ones.
///
/// Used for values that are read on every request but change rarely: role definitions,
/// the security settings document and computed analytics reports.
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    ttl: Duration,
    capacity: usize,
    entries: DashMap<K, (Instant, V)>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, MAX_CACHE_SIZE)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ttl,
            capacity,
            entries: DashMap::with_capacity(capacity),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a clone of the cached value if it has not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let (fresh, value) = {
            let entry = self.entries.get(key)?;
            let (inserted, value) = entry.value();
            (inserted.elapsed() < self.ttl, value.clone())
        };
        if fresh {
            Some(value)
        } else {
            // The shard guard is released above; removing here cannot deadlock.
            self.entries
                .remove_if(key, |_, (inserted, _)| inserted.elapsed() >= self.ttl);
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();

            if self.entries.len() >= self.capacity {
                let to_remove: Vec<K> = self
                    .entries
                    .iter()
                    .take((self.capacity / 10).max(1))
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in to_remove {
                    self.entries.remove(&key);
                }
            }
        }

        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
