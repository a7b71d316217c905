//! Read-through employee service
//!
//! Consults the cache under a bounded retry/backoff policy, falls through
//! to the record store on a terminal miss, and invalidates on writes. Miss
//! signals drive the policy: retryable kinds park the caller, a leader
//! assignment short-circuits straight to the store, and genuine backend
//! faults degrade to a pass-through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::domain::cache::{employee_counter_key, search_counter_key, CacheError, EmployeeCache};
use crate::domain::employee::{Employee, EmployeePartial, EmployeeSearch};
use crate::domain::store::EmployeeStore;
use crate::domain::DomainError;
use crate::infrastructure::metrics::CacheCounters;

/// Orchestrator tuning, read from the flat environment map
#[derive(Debug, Clone)]
pub struct LogicConfig {
    /// Master switch; disabled means every read passes through
    pub cache_enabled: bool,
    /// Delay before the first cache re-read
    pub retry_interval: Duration,
    /// Total number of cache read attempts per operation
    pub max_retries: u32,
    /// Double the delay after each attempt instead of a fixed schedule
    pub exponential_backoff: bool,
    /// Reject create/update/delete, for read-only scenario rigs
    pub mutate_disabled: bool,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            cache_enabled: false,
            retry_interval: Duration::from_secs(1),
            max_retries: 2,
            exponential_backoff: true,
            mutate_disabled: false,
        }
    }
}

impl LogicConfig {
    /// Reads the recognized keys from a flat environment map
    pub fn from_env_map(envs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(enabled) = envs.get("LOGIC_CACHE_ENABLED") {
            config.cache_enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(secs) = envs.get("CACHE_RETRY_INTERVAL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.retry_interval = Duration::from_secs(secs);
            }
        }
        if let Some(retries) = envs.get("CACHE_MAX_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.max_retries = retries;
            }
        }
        if let Some(backoff) = envs.get("CACHE_RETRY_EXP_BACKOFF") {
            config.exponential_backoff = backoff.parse().unwrap_or(true);
        }
        if let Some(disabled) = envs.get("MUTATE_DISABLED") {
            config.mutate_disabled = disabled.parse().unwrap_or(false);
        }
        config
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }
}

/// Read-through, write-invalidating orchestrator over a record store and
/// an optional cache backend
#[derive(Debug)]
pub struct EmployeeService {
    store: Arc<dyn EmployeeStore>,
    cache: Option<Arc<dyn EmployeeCache>>,
    counters: Option<Arc<CacheCounters>>,
    config: LogicConfig,
}

impl EmployeeService {
    /// Creates a service without a cache; attach one with `with_cache` and
    /// check the wiring at startup via `verify`
    pub fn new(store: Arc<dyn EmployeeStore>, config: LogicConfig) -> Self {
        Self {
            store,
            cache: None,
            counters: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn EmployeeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_counters(mut self, counters: Arc<CacheCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Startup check: an enabled cache must actually be wired in
    pub fn verify(&self) -> Result<(), DomainError> {
        if self.config.cache_enabled && self.cache.is_none() {
            return Err(DomainError::configuration(
                "cache enabled, but no cache set",
            ));
        }
        Ok(())
    }

    fn cache(&self) -> Option<&Arc<dyn EmployeeCache>> {
        if self.config.cache_enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn increment_hit(&self, key: &str) {
        if let Some(counters) = &self.counters {
            counters.increment_hit(key);
        }
    }

    fn increment_miss(&self, key: &str) {
        if let Some(counters) = &self.counters {
            counters.increment_miss(key);
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        if self.config.exponential_backoff {
            delay.saturating_mul(2)
        } else {
            delay
        }
    }

    /// Creates a record; the cache needs no invalidation for a fresh id
    pub async fn create(&self, partial: &EmployeePartial) -> Result<Employee, DomainError> {
        if self.config.mutate_disabled {
            return Err(DomainError::MutationDisabled);
        }
        self.store.create(partial).await
    }

    /// Reads a record through the cache
    pub async fn read(&self, emp_no: i64) -> Result<Employee, DomainError> {
        let Some(cache) = self.cache() else {
            return self.store.read(emp_no).await;
        };

        let counter_key = employee_counter_key(emp_no);
        let mut delay = self.config.retry_interval;
        let tries = self.config.max_retries.max(1);
        let mut cached = None;
        for attempt in 0..tries {
            match cache.read_one(emp_no).await {
                Ok(employee) => {
                    cached = Some(employee);
                    break;
                }
                Err(CacheError::Miss(kind)) if kind.is_leader_assigned() => {
                    trace!(emp_no, "designated leader for employee fill");
                    break;
                }
                Err(CacheError::Miss(kind)) => {
                    trace!(emp_no, attempt, %kind, "cache miss for employee, retrying");
                    if attempt + 1 < tries {
                        tokio::time::sleep(delay).await;
                        delay = self.next_delay(delay);
                    }
                }
                Err(e) => {
                    warn!(emp_no, "cache read failed, falling through: {}", e);
                    break;
                }
            }
        }

        if let Some(employee) = cached {
            trace!(emp_no, "employee read cache hit");
            self.increment_hit(&counter_key);
            return Ok(employee);
        }
        trace!(emp_no, "employee read cache miss");
        self.increment_miss(&counter_key);

        let employee = self.store.read(emp_no).await?;
        if let Err(e) = cache
            .write_many(&EmployeeSearch::default(), std::slice::from_ref(&employee))
            .await
        {
            debug!(emp_no, "error while writing employee to cache: {}", e);
        }
        Ok(employee)
    }

    /// Resolves a search through the cache
    pub async fn search(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, DomainError> {
        let Some(cache) = self.cache() else {
            return self.store.search(search).await;
        };

        let fingerprint = search
            .fingerprint()
            .map_err(|e| DomainError::cache(e.to_string()))?;
        let counter_key = search_counter_key(&fingerprint);
        let mut delay = self.config.retry_interval;
        let tries = self.config.max_retries.max(1);
        let mut cached = None;
        for attempt in 0..tries {
            match cache.read_many(search).await {
                Ok(employees) => {
                    cached = Some(employees);
                    break;
                }
                Err(CacheError::Miss(kind)) if kind.is_leader_assigned() => {
                    trace!(fingerprint, "designated leader for search fill");
                    break;
                }
                Err(CacheError::Miss(kind)) => {
                    trace!(fingerprint, attempt, %kind, "search cache miss, retrying");
                    if attempt + 1 < tries {
                        tokio::time::sleep(delay).await;
                        delay = self.next_delay(delay);
                    }
                }
                Err(e) => {
                    warn!(fingerprint, "cache search failed, falling through: {}", e);
                    break;
                }
            }
        }

        if let Some(employees) = cached {
            trace!(fingerprint, "employee search cache hit");
            self.increment_hit(&counter_key);
            return Ok(employees);
        }
        trace!(fingerprint, "employee search cache miss");
        self.increment_miss(&counter_key);

        let employees = self.store.search(search).await?;
        if let Err(e) = cache.write_many(search, &employees).await {
            debug!(fingerprint, "error while writing employees to cache: {}", e);
        }
        Ok(employees)
    }

    /// Updates a record, then invalidates its cache entry best-effort
    pub async fn update(
        &self,
        emp_no: i64,
        partial: &EmployeePartial,
    ) -> Result<Employee, DomainError> {
        if self.config.mutate_disabled {
            return Err(DomainError::MutationDisabled);
        }
        let employee = self.store.update(emp_no, partial).await?;
        self.invalidate(emp_no).await;
        Ok(employee)
    }

    /// Deletes a record, then invalidates its cache entry best-effort
    pub async fn delete(&self, emp_no: i64) -> Result<(), DomainError> {
        if self.config.mutate_disabled {
            return Err(DomainError::MutationDisabled);
        }
        self.store.delete(emp_no).await?;
        self.invalidate(emp_no).await;
        Ok(())
    }

    async fn invalidate(&self, emp_no: i64) {
        let Some(cache) = self.cache() else {
            return;
        };
        match cache.delete(&[emp_no]).await {
            Ok(()) => trace!(emp_no, "cache invalidated"),
            // The record store is authoritative; a failed invalidation
            // only extends staleness until the next write or TTL.
            Err(e) => warn!(emp_no, "error while invalidating cached employee: {}", e),
        }
    }
}
