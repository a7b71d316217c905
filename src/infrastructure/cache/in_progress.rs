//! In-progress registry table for the in-memory backend

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as epoch nanos, the format stored per in-progress entry
pub fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Table of keys whose fill is in flight, each with its start time.
///
/// `set_if_absent` is the leader-election primitive: the caller that
/// inserts the entry is the leader for that key until it publishes or the
/// entry outlives the TTL and is pruned.
#[derive(Debug, Default)]
pub struct InProgressTable {
    entries: HashMap<String, u128>,
}

impl InProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the key if absent; true designates the caller leader
    pub fn set_if_absent(&mut self, key: String, started_at: u128) -> bool {
        use std::collections::hash_map::Entry;
        match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(started_at);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Removes a published or evicted key
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes entries older than the TTL, returning how many were dropped
    pub fn prune(&mut self, ttl: Duration) -> usize {
        let cutoff = now_nanos().saturating_sub(ttl.as_nanos());
        let before = self.entries.len();
        self.entries.retain(|_, started_at| *started_at > cutoff);
        before - self.entries.len()
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
