//! Pluggable cache backend over a generic key-value store

use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{trace, warn};

use crate::domain::cache::{CacheError, EmployeeCache, MissKind};
use crate::domain::employee::{Employee, EmployeeSearch};

/// Generic key-value store with its own eviction policy.
///
/// The stash backend leans on the store's native lookup-or-miss semantics
/// instead of an in-progress registry; eviction (LRU, TTL, capacity) is
/// whatever the store provides.
#[async_trait]
pub trait Stash: Send + Sync + Debug {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Configuration for the moka-backed stash
#[derive(Debug, Clone)]
pub struct MokaStashConfig {
    /// Maximum number of entries before LRU-like eviction
    pub max_capacity: u64,
    /// Time-to-live for every entry
    pub time_to_live: Duration,
    /// Entries not accessed for this long are evicted
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStashConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(3600),
            time_to_idle: None,
        }
    }
}

impl MokaStashConfig {
    /// Reads the recognized keys from a flat environment map
    pub fn from_env_map(envs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(capacity) = envs.get("STASH_MAX_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.max_capacity = capacity;
            }
        }
        if let Some(secs) = envs.get("STASH_TTL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.time_to_live = Duration::from_secs(secs);
            }
        }
        config
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }
}

/// In-process stash backed by moka
#[derive(Debug)]
pub struct MokaStash {
    cache: MokaCache<String, String>,
}

impl MokaStash {
    pub fn new() -> Self {
        Self::with_config(MokaStashConfig::default())
    }

    pub fn with_config(config: MokaStashConfig) -> Self {
        let mut builder = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live);
        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }
        Self {
            cache: builder.build(),
        }
    }
}

impl Default for MokaStash {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stash for MokaStash {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), value.to_string()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

/// Configuration for the redis-backed stash
#[derive(Debug, Clone)]
pub struct RedisStashConfig {
    pub url: String,
    /// Namespace prefix for every key
    pub key_prefix: String,
    /// Server-side TTL applied on write
    pub time_to_live: Duration,
    pub timeout: Duration,
}

impl Default for RedisStashConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            key_prefix: "stash".to_string(),
            time_to_live: Duration::from_secs(3600),
            timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStashConfig {
    /// Reads the recognized keys from a flat environment map; reuses the
    /// remote backend's connection settings
    pub fn from_env_map(envs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        let address = envs
            .get("REDIS_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "localhost".to_string());
        let port = envs
            .get("REDIS_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(6379);
        let database = envs
            .get("REDIS_DATABASE")
            .and_then(|d| d.parse::<i64>().ok())
            .unwrap_or(0);
        config.url = match envs.get("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, address, port, database),
            None => format!("redis://{}:{}/{}", address, port, database),
        };
        if let Some(secs) = envs.get("REDIS_TIMEOUT") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.timeout = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = envs.get("STASH_TTL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.time_to_live = Duration::from_secs(secs);
            }
        }
        config
    }
}

/// Remote stash over flat, prefixed redis keys with native TTL eviction
pub struct RedisStash {
    connection: ConnectionManager,
    config: RedisStashConfig,
}

impl fmt::Debug for RedisStash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStash")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStash {
    pub async fn new(config: RedisStashConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::backend(format!("failed to create redis client: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::backend(format!("failed to connect to redis: {}", e)))?;
        Ok(Self { connection, config })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result.map_err(|e| CacheError::backend(e.to_string())),
            Err(_) => Err(CacheError::backend("redis operation timed out")),
        }
    }
}

#[async_trait]
impl Stash for RedisStash {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = self.bounded(conn.get(self.prefixed(key))).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let ttl = self.config.time_to_live.as_secs().max(1);
        let _: () = self
            .bounded(conn.set_ex(self.prefixed(key), value, ttl))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let deleted: i64 = self.bounded(conn.del(self.prefixed(key))).await?;
        Ok(deleted > 0)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let pattern = self.prefixed("*");
        let mut cursor = 0u64;
        loop {
            let (new_cursor, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;
            if !keys.is_empty() {
                let _: i64 = self.bounded(conn.del(&keys)).await?;
            }
            cursor = new_cursor;
            if cursor == 0 {
                return Ok(());
            }
        }
    }
}

/// Two-tier cache delegating storage and eviction to a `Stash`.
///
/// The per-search tier stores the ordered id list as JSON; a search hit
/// referencing an evicted record deletes the search entry and reports a
/// miss, which the next fill repairs.
#[derive(Debug)]
pub struct StashCache {
    stash: Arc<dyn Stash>,
}

impl StashCache {
    pub fn new(stash: Arc<dyn Stash>) -> Self {
        Self { stash }
    }
}

#[async_trait]
impl EmployeeCache for StashCache {
    async fn read_one(&self, emp_no: i64) -> Result<Employee, CacheError> {
        match self.stash.read(&emp_no.to_string()).await? {
            Some(value) => {
                trace!(emp_no, "cache hit for employee");
                Ok(Employee::from_bytes(value.as_bytes())?)
            }
            None => {
                trace!(emp_no, "cache miss for employee");
                Err(CacheError::miss(MissKind::NotCached))
            }
        }
    }

    async fn read_many(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, CacheError> {
        let fingerprint = search.fingerprint()?;
        let Some(value) = self.stash.read(&fingerprint).await? else {
            trace!(fingerprint, "cache miss for employee search");
            return Err(CacheError::miss(MissKind::SearchNotCached));
        };
        let emp_nos: Vec<i64> = serde_json::from_str(&value)?;
        let mut employees = Vec::with_capacity(emp_nos.len());
        for emp_no in emp_nos {
            match self.stash.read(&emp_no.to_string()).await? {
                Some(value) => employees.push(Employee::from_bytes(value.as_bytes())?),
                None => {
                    // A member was evicted underneath the search entry;
                    // drop the entry so the next fill republishes it.
                    trace!(fingerprint, "dropped stale employee search entry");
                    if let Err(e) = self.stash.delete(&fingerprint).await {
                        warn!("failed to drop stale search entry: {}", e);
                    }
                    return Err(CacheError::miss(MissKind::SearchNotCached));
                }
            }
        }
        trace!(fingerprint, "cache hit for employee search");
        Ok(employees)
    }

    async fn write_many(
        &self,
        search: &EmployeeSearch,
        employees: &[Employee],
    ) -> Result<(), CacheError> {
        let fingerprint = search.fingerprint()?;
        let emp_nos: Vec<i64> = employees.iter().map(|e| e.emp_no).collect();
        self.stash
            .write(&fingerprint, &serde_json::to_string(&emp_nos)?)
            .await?;
        trace!(fingerprint, "cached employee search");
        for employee in employees {
            let bytes = employee.to_bytes()?;
            let value = String::from_utf8_lossy(&bytes);
            // A failed record write leaves the fill incomplete; the search
            // entry self-invalidates on the next read.
            if let Err(e) = self
                .stash
                .write(&employee.emp_no.to_string(), &value)
                .await
            {
                warn!(emp_no = employee.emp_no, "failed to cache employee: {}", e);
            }
        }
        Ok(())
    }

    async fn delete(&self, emp_nos: &[i64]) -> Result<(), CacheError> {
        for emp_no in emp_nos {
            if let Err(e) = self.stash.delete(&emp_no.to_string()).await {
                warn!(emp_no, "failed to evict cached employee: {}", e);
                continue;
            }
            trace!(emp_no, "evicted cached employee");
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.stash.clear().await
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
