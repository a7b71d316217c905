//! Per-key cache hit/miss counters

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

/// Snapshot of every counter, keyed `employee_<id>` / `employee_search_<fp>`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheCounterSnapshot {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub counter_hits: HashMap<String, u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub counter_misses: HashMap<String, u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    hit: u64,
    miss: u64,
}

/// Thread-safe hit/miss counters.
///
/// The read-through orchestrator is the only writer: one hit per
/// cache-served read, one miss per terminal cache miss.
#[derive(Debug, Default)]
pub struct CacheCounters {
    counters: RwLock<HashMap<String, Counter>>,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the hit count for a key, returning the new count
    pub fn increment_hit(&self, key: &str) -> u64 {
        let mut counters = self.counters.write().unwrap();
        let counter = counters.entry(key.to_string()).or_default();
        counter.hit += 1;
        counter.hit
    }

    /// Increments the miss count for a key, returning the new count
    pub fn increment_miss(&self, key: &str) -> u64 {
        let mut counters = self.counters.write().unwrap();
        let counter = counters.entry(key.to_string()).or_default();
        counter.miss += 1;
        counter.miss
    }

    /// Reads the (hit, miss) pair for a single key
    pub fn read(&self, key: &str) -> Option<(u64, u64)> {
        self.counters
            .read()
            .unwrap()
            .get(key)
            .map(|c| (c.hit, c.miss))
    }

    /// Snapshots all counters
    pub fn read_all(&self) -> CacheCounterSnapshot {
        let counters = self.counters.read().unwrap();
        let mut snapshot = CacheCounterSnapshot::default();
        for (key, counter) in counters.iter() {
            snapshot.counter_hits.insert(key.clone(), counter.hit);
            snapshot.counter_misses.insert(key.clone(), counter.miss);
        }
        snapshot
    }

    /// Removes a single key
    pub fn reset(&self, key: &str) {
        self.counters.write().unwrap().remove(key);
    }

    /// Removes every counter
    pub fn clear(&self) {
        self.counters.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_read() {
        let counters = CacheCounters::new();

        assert_eq!(counters.increment_hit("employee_42"), 1);
        assert_eq!(counters.increment_hit("employee_42"), 2);
        assert_eq!(counters.increment_miss("employee_42"), 1);

        assert_eq!(counters.read("employee_42"), Some((2, 1)));
        assert_eq!(counters.read("employee_7"), None);
    }

    #[test]
    fn test_read_all_snapshot() {
        let counters = CacheCounters::new();
        counters.increment_hit("a");
        counters.increment_miss("b");

        let snapshot = counters.read_all();
        assert_eq!(snapshot.counter_hits.get("a"), Some(&1));
        assert_eq!(snapshot.counter_hits.get("b"), Some(&0));
        assert_eq!(snapshot.counter_misses.get("b"), Some(&1));
    }

    #[test]
    fn test_reset_and_clear() {
        let counters = CacheCounters::new();
        counters.increment_hit("a");
        counters.increment_hit("b");

        counters.reset("a");
        assert_eq!(counters.read("a"), None);
        assert_eq!(counters.read("b"), Some((1, 0)));

        counters.clear();
        assert!(counters.read_all().counter_hits.is_empty());
    }
}
