//! In-memory cache backend

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::domain::cache::{CacheError, EmployeeCache, MissKind};
use crate::domain::employee::{Employee, EmployeeSearch};

use super::in_progress::{now_nanos, InProgressTable};
use super::pruner::PrunerHandle;

/// Configuration for the in-memory cache backend
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Whether misses enter the single-flight protocol
    pub in_progress_enabled: bool,
    /// How often the pruner sweeps the in-progress table
    pub prune_interval: Duration,
    /// Age past which an unpublished in-progress entry is removed
    pub in_progress_ttl: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            in_progress_enabled: false,
            prune_interval: Duration::from_secs(10),
            in_progress_ttl: Duration::from_secs(30),
        }
    }
}

impl InMemoryCacheConfig {
    /// Reads the recognized keys from a flat environment map
    pub fn from_env_map(envs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(enabled) = envs.get("CACHE_ENABLE_IN_PROGRESS") {
            config.in_progress_enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(secs) = envs.get("CACHE_PRUNE_INTERVAL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.prune_interval = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = envs.get("CACHE_SET_READ_TTL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.in_progress_ttl = Duration::from_secs(secs);
            }
        }
        config
    }

    /// Enables or disables single-flight coordination
    pub fn with_in_progress(mut self, enabled: bool) -> Self {
        self.in_progress_enabled = enabled;
        self
    }

    /// Sets the pruner sweep interval
    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Sets the in-progress entry TTL
    pub fn with_in_progress_ttl(mut self, ttl: Duration) -> Self {
        self.in_progress_ttl = ttl;
        self
    }
}

#[derive(Debug, Default)]
struct ValueTiers {
    /// Per-record tier: id → record
    employees: HashMap<i64, Employee>,
    /// Per-search tier: fingerprint → ordered id list
    searches: HashMap<String, Vec<i64>>,
}

/// In-memory two-tier cache.
///
/// The value tiers share one reader-writer lock; the in-progress table has
/// its own lock so followers parked in leader election never contend with
/// value reads. Neither lock is held across an await point.
#[derive(Debug)]
pub struct InMemoryCache {
    tiers: RwLock<ValueTiers>,
    in_progress: Arc<Mutex<InProgressTable>>,
    pruner: Mutex<Option<PrunerHandle>>,
    config: InMemoryCacheConfig,
}

impl InMemoryCache {
    /// Creates a backend with default configuration (single-flight off)
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    /// Creates a backend, spawning the pruner when single-flight is enabled.
    ///
    /// Must be called from within a tokio runtime when `in_progress_enabled`
    /// is set.
    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let in_progress = Arc::new(Mutex::new(InProgressTable::new()));
        let pruner = if config.in_progress_enabled {
            Some(Self::spawn_pruner(in_progress.clone(), &config))
        } else {
            None
        };
        Self {
            tiers: RwLock::new(ValueTiers::default()),
            in_progress,
            pruner: Mutex::new(pruner),
            config,
        }
    }

    fn spawn_pruner(
        in_progress: Arc<Mutex<InProgressTable>>,
        config: &InMemoryCacheConfig,
    ) -> PrunerHandle {
        let ttl = config.in_progress_ttl;
        PrunerHandle::spawn(config.prune_interval, move || {
            let in_progress = in_progress.clone();
            async move {
                let pruned = in_progress.lock().unwrap().prune(ttl);
                if pruned > 0 {
                    debug!(pruned, "pruned expired in-progress entries");
                }
            }
        })
    }

    /// Runs leader election for a missed key, returning the miss signal
    fn leader_election(&self, key: String, not_cached: MissKind) -> CacheError {
        if !self.config.in_progress_enabled {
            return CacheError::miss(not_cached);
        }
        let assigned = match not_cached {
            MissKind::SearchNotCached => MissKind::SearchLeaderAssigned,
            _ => MissKind::ReadLeaderAssigned,
        };
        let already = match not_cached {
            MissKind::SearchNotCached => MissKind::SearchLeaderAlreadyAssigned,
            _ => MissKind::ReadLeaderAlreadyAssigned,
        };
        let mut in_progress = self.in_progress.lock().unwrap();
        if in_progress.set_if_absent(key, now_nanos()) {
            CacheError::miss(assigned)
        } else {
            CacheError::miss(already)
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmployeeCache for InMemoryCache {
    async fn read_one(&self, emp_no: i64) -> Result<Employee, CacheError> {
        {
            let tiers = self.tiers.read().unwrap();
            if let Some(employee) = tiers.employees.get(&emp_no) {
                trace!(emp_no, "cache hit for employee");
                return Ok(employee.clone());
            }
        }
        trace!(emp_no, "cache miss for employee");
        Err(self.leader_election(emp_no.to_string(), MissKind::NotCached))
    }

    async fn read_many(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, CacheError> {
        let fingerprint = search.fingerprint()?;
        let resolved = {
            let tiers = self.tiers.read().unwrap();
            match tiers.searches.get(&fingerprint) {
                None => None,
                Some(emp_nos) => {
                    let mut employees = Vec::with_capacity(emp_nos.len());
                    let mut complete = true;
                    for emp_no in emp_nos {
                        match tiers.employees.get(emp_no) {
                            Some(employee) => employees.push(employee.clone()),
                            None => {
                                complete = false;
                                break;
                            }
                        }
                    }
                    Some((employees, complete))
                }
            }
        };
        match resolved {
            Some((employees, true)) => {
                trace!(fingerprint, "cache hit for employee search");
                Ok(employees)
            }
            Some((_, false)) => {
                // Partially evicted result set: drop the stale search entry
                // so the next fill republishes it.
                self.tiers
                    .write()
                    .unwrap()
                    .searches
                    .remove(&fingerprint);
                trace!(fingerprint, "dropped stale employee search entry");
                Err(self.leader_election(fingerprint, MissKind::SearchNotCached))
            }
            None => {
                trace!(fingerprint, "cache miss for employee search");
                Err(self.leader_election(fingerprint, MissKind::SearchNotCached))
            }
        }
    }

    async fn write_many(
        &self,
        search: &EmployeeSearch,
        employees: &[Employee],
    ) -> Result<(), CacheError> {
        let fingerprint = search.fingerprint()?;
        let mut tiers = self.tiers.write().unwrap();
        let mut emp_nos = Vec::with_capacity(employees.len());
        for employee in employees {
            tiers.employees.insert(employee.emp_no, employee.clone());
            emp_nos.push(employee.emp_no);
            trace!(emp_no = employee.emp_no, "cached employee");
        }
        tiers.searches.insert(fingerprint.clone(), emp_nos.clone());
        trace!(fingerprint, "cached employee search");
        if self.config.in_progress_enabled {
            // Publish and registry clear share the value-tier critical
            // section; a follower that next observes the registry empty
            // is guaranteed to observe the published value.
            let mut in_progress = self.in_progress.lock().unwrap();
            for emp_no in &emp_nos {
                in_progress.remove(&emp_no.to_string());
            }
            in_progress.remove(&fingerprint);
        }
        Ok(())
    }

    async fn delete(&self, emp_nos: &[i64]) -> Result<(), CacheError> {
        let mut tiers = self.tiers.write().unwrap();
        for emp_no in emp_nos {
            tiers.employees.remove(emp_no);
            trace!(emp_no, "evicted cached employee");
        }
        if self.config.in_progress_enabled {
            let mut in_progress = self.in_progress.lock().unwrap();
            for emp_no in emp_nos {
                in_progress.remove(&emp_no.to_string());
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut tiers = self.tiers.write().unwrap();
        tiers.employees.clear();
        tiers.searches.clear();
        self.in_progress.lock().unwrap().clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        let pruner = self.pruner.lock().unwrap().take();
        if let Some(pruner) = pruner {
            pruner.stop().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(emp_no: i64) -> Employee {
        Employee {
            emp_no,
            birth_date: 479001600,
            first_name: format!("First{}", emp_no),
            last_name: format!("Last{}", emp_no),
            gender: "M".to_string(),
            hire_date: 820454400,
        }
    }

    fn single_flight_config() -> InMemoryCacheConfig {
        InMemoryCacheConfig::default()
            .with_in_progress(true)
            .with_prune_interval(Duration::from_millis(25))
            .with_in_progress_ttl(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let cache = InMemoryCache::new();
        let e = employee(42);

        cache
            .write_many(&EmployeeSearch::default(), std::slice::from_ref(&e))
            .await
            .unwrap();

        let read = cache.read_one(42).await.unwrap();
        assert_eq!(read, e);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_cached() {
        let cache = InMemoryCache::new();
        let err = cache.read_one(7).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::NotCached));
    }

    #[tokio::test]
    async fn test_search_projection() {
        let cache = InMemoryCache::new();
        let search = EmployeeSearch::by_emp_nos(vec![1, 2, 3]);
        let employees = vec![employee(1), employee(2), employee(3)];

        cache.write_many(&search, &employees).await.unwrap();

        let mut read = cache.read_many(&search).await.unwrap();
        read.sort_by_key(|e| e.emp_no);
        assert_eq!(read, employees);
    }

    #[tokio::test]
    async fn test_search_self_heals_on_partial_eviction() {
        let cache = InMemoryCache::new();
        let search = EmployeeSearch::by_emp_nos(vec![1, 2, 3]);
        cache
            .write_many(&search, &[employee(1), employee(2), employee(3)])
            .await
            .unwrap();

        cache.delete(&[2]).await.unwrap();

        let err = cache.read_many(&search).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::SearchNotCached));

        // The stale entry is gone: a republish restores the search
        cache
            .write_many(&search, &[employee(1), employee(2), employee(3)])
            .await
            .unwrap();
        assert_eq!(cache.read_many(&search).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_evicts_record() {
        let cache = InMemoryCache::new();
        cache
            .write_many(&EmployeeSearch::default(), &[employee(42)])
            .await
            .unwrap();

        cache.delete(&[42]).await.unwrap();

        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::NotCached));
    }

    #[tokio::test]
    async fn test_leader_election_on_cold_read() {
        let cache = InMemoryCache::with_config(single_flight_config());

        let first = cache.read_one(42).await.unwrap_err();
        assert_eq!(first.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        let second = cache.read_one(42).await.unwrap_err();
        assert_eq!(
            second.miss_kind(),
            Some(MissKind::ReadLeaderAlreadyAssigned)
        );

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_exactly_one_leader_across_concurrent_readers() {
        let cache = Arc::new(InMemoryCache::with_config(single_flight_config()));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.read_one(42).await.unwrap_err().miss_kind().unwrap()
            }));
        }

        let mut leaders = 0;
        let mut followers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                MissKind::ReadLeaderAssigned => leaders += 1,
                MissKind::ReadLeaderAlreadyAssigned => followers += 1,
                other => panic!("unexpected miss kind: {:?}", other),
            }
        }
        assert_eq!(leaders, 1);
        assert_eq!(followers, 49);

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_clears_in_progress() {
        let cache = InMemoryCache::with_config(single_flight_config());

        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        cache
            .write_many(&EmployeeSearch::default(), &[employee(42)])
            .await
            .unwrap();

        // Followers now hit; a later eviction restores leader election
        assert!(cache.read_one(42).await.is_ok());
        cache.delete(&[42]).await.unwrap();
        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pruner_recovers_crashed_leader() {
        let cache = InMemoryCache::with_config(single_flight_config());

        // Leader takes the assignment and never publishes
        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAlreadyAssigned));

        // After TTL + a prune sweep a fresh reader becomes leader
        tokio::time::sleep(Duration::from_millis(200)).await;
        let err = cache.read_one(42).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_is_idempotent_and_resets_registry() {
        let cache = InMemoryCache::with_config(single_flight_config());
        cache
            .write_many(
                &EmployeeSearch::by_emp_nos(vec![1]),
                &[employee(1)],
            )
            .await
            .unwrap();
        let _ = cache.read_one(99).await; // registers a leader for 99

        cache.clear().await.unwrap();
        cache.clear().await.unwrap();

        let err = cache.read_one(1).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));
        let err = cache.read_one(99).await.unwrap_err();
        assert_eq!(err.miss_kind(), Some(MissKind::ReadLeaderAssigned));

        cache.close().await.unwrap();
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_defensive_copies() {
        let cache = InMemoryCache::new();
        cache
            .write_many(&EmployeeSearch::default(), &[employee(42)])
            .await
            .unwrap();

        let mut first = cache.read_one(42).await.unwrap();
        first.first_name = "Mutated".to_string();

        let second = cache.read_one(42).await.unwrap();
        assert_eq!(second.first_name, "First42");
    }

    #[test]
    fn test_config_from_env_map() {
        let mut envs = HashMap::new();
        envs.insert("CACHE_ENABLE_IN_PROGRESS".to_string(), "true".to_string());
        envs.insert("CACHE_PRUNE_INTERVAL".to_string(), "5".to_string());
        envs.insert("CACHE_SET_READ_TTL".to_string(), "15".to_string());

        let config = InMemoryCacheConfig::from_env_map(&envs);
        assert!(config.in_progress_enabled);
        assert_eq!(config.prune_interval, Duration::from_secs(5));
        assert_eq!(config.in_progress_ttl, Duration::from_secs(15));
    }
}
