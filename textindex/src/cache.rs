//! Short-lived memo table scoped to a single request or query evaluation.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

/// A map that counts hits, misses and stores. Not shared between threads.
#[derive(Debug)]
pub struct RequestCache<K, V> {
    entries: HashMap<K, V>,
    stats: CacheStats,
}

impl<K, V> Default for RequestCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new(), stats: CacheStats::default() }
    }
}

impl<K: Eq + Hash, V> RequestCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.entries.get(key) {
            Some(v) => {
                self.stats.hits += 1;
                Some(v)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
        self.stats.sets += 1;
    }

    /// Look `key` up, computing and storing it on a miss.
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, make: F) -> &V {
        if self.entries.contains_key(&key) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            self.stats.sets += 1;
        }
        self.entries.entry(key).or_insert_with(make)
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> fmt::Display for RequestCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<RequestCache {} items (hits: {}, misses: {}, sets: {})>",
            self.entries.len(),
            self.stats.hits,
            self.stats.misses,
            self.stats.sets
        )
    }
}
