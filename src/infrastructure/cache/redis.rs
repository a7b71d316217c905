//! Redis cache backend

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::domain::cache::{CacheError, EmployeeCache, MissKind};
use crate::domain::employee::{Employee, EmployeeSearch};

use super::in_progress::now_nanos;
use super::pruner::PrunerHandle;

/// Per-record tier: field per stringified id, value JSON record bytes
const HASH_EMPLOYEES: &str = "employees";
/// Per-search tier: field per fingerprint, value comma-joined id list
const HASH_SEARCH: &str = "search";
/// In-progress registry: field per id/fingerprint, value epoch nanos
const HASH_IN_PROGRESS: &str = "in_progress_employees";
/// Cross-process mutex cell guarding multi-key registry mutations
const MUTEX_KEY: &str = "in_progress_mutex";

/// Release only when the stored token is ours; an expired-and-reacquired
/// mutex must never be deleted by the previous holder.
const MUTEX_RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Configuration for the Redis cache backend
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub address: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
    /// Per-operation deadline for every server call
    pub timeout: Duration,
    pub in_progress_enabled: bool,
    pub prune_interval: Duration,
    pub in_progress_ttl: Duration,
    pub mutex_expiration: Duration,
    pub mutex_retry_interval: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            timeout: Duration::from_secs(5),
            in_progress_enabled: false,
            prune_interval: Duration::from_secs(10),
            in_progress_ttl: Duration::from_secs(30),
            mutex_expiration: Duration::from_secs(10),
            mutex_retry_interval: Duration::from_secs(1),
        }
    }
}

impl RedisCacheConfig {
    /// Reads the recognized keys from a flat environment map
    pub fn from_env_map(envs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(address) = envs.get("REDIS_ADDRESS") {
            config.address = address.clone();
        }
        if let Some(port) = envs.get("REDIS_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Some(password) = envs.get("REDIS_PASSWORD") {
            if !password.is_empty() {
                config.password = Some(password.clone());
            }
        }
        if let Some(database) = envs.get("REDIS_DATABASE") {
            if let Ok(database) = database.parse() {
                config.database = database;
            }
        }
        if let Some(secs) = envs.get("REDIS_TIMEOUT") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.timeout = Duration::from_secs(secs);
            }
        }
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
        if let Some(secs) = envs.get("CACHE_REDIS_MUTEX_EXPIRATION") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.mutex_expiration = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = envs.get("REDIS_MUTEX_RETRY_INTERVAL") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.mutex_retry_interval = Duration::from_secs(secs);
            }
        }
        config
    }

    /// Connection URL for the redis client
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.address, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.address, self.port, self.database),
        }
    }
}

/// Redis-backed two-tier cache.
///
/// Four server-side structures: the `employees` and `search` hashes for the
/// value tiers, the `in_progress_employees` hash for the single-flight
/// registry, and the `in_progress_mutex` cell serializing multi-key registry
/// mutations across processes.
pub struct RedisCache {
    connection: ConnectionManager,
    config: RedisCacheConfig,
    pruner: Mutex<Option<PrunerHandle>>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCache {
    /// Connects to the server and, when single-flight is enabled, spawns
    /// the in-progress pruner
    pub async fn new(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url())
            .map_err(|e| CacheError::backend(format!("failed to create redis client: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::backend(format!("failed to connect to redis: {}", e)))?;

        let mut ping_conn = connection.clone();
        tokio::time::timeout(
            config.timeout,
            redis::cmd("PING").query_async::<()>(&mut ping_conn),
        )
        .await
        .map_err(|_| CacheError::backend("timed out pinging redis"))?
        .map_err(|e| CacheError::backend(format!("failed to ping redis: {}", e)))?;

        let pruner = if config.in_progress_enabled {
            Some(Self::spawn_pruner(connection.clone(), config.clone()))
        } else {
            None
        };

        Ok(Self {
            connection,
            config,
            pruner: Mutex::new(pruner),
        })
    }

    fn spawn_pruner(connection: ConnectionManager, config: RedisCacheConfig) -> PrunerHandle {
        let prune_interval = config.prune_interval;
        PrunerHandle::spawn(prune_interval, move || {
            let mut conn = connection.clone();
            let config = config.clone();
            async move {
                if let Err(e) = Self::prune_expired(&mut conn, &config).await {
                    debug!("in-progress prune sweep failed: {}", e);
                }
            }
        })
    }

    async fn prune_expired(
        conn: &mut ConnectionManager,
        config: &RedisCacheConfig,
    ) -> Result<(), CacheError> {
        let token = Self::acquire_mutex(conn, config).await?;
        let result = Self::prune_expired_inner(conn, config).await;
        Self::release_mutex(conn, config, &token).await;
        result
    }

    async fn prune_expired_inner(
        conn: &mut ConnectionManager,
        config: &RedisCacheConfig,
    ) -> Result<(), CacheError> {
        let entries: HashMap<String, String> =
            Self::bounded(config, conn.hgetall(HASH_IN_PROGRESS)).await?;
        let cutoff = now_nanos().saturating_sub(config.in_progress_ttl.as_nanos());
        let expired: Vec<String> = entries
            .into_iter()
            .filter(|(_, started_at)| {
                started_at
                    .parse::<u128>()
                    .map(|t| t <= cutoff)
                    .unwrap_or(true)
            })
            .map(|(field, _)| field)
            .collect();
        if !expired.is_empty() {
            let count = expired.len();
            let _: i64 = Self::bounded(config, conn.hdel(HASH_IN_PROGRESS, expired)).await?;
            debug!(pruned = count, "pruned expired in-progress entries");
        }
        Ok(())
    }

    /// Acquires the cross-process mutex via SET NX PX with a fresh token.
    ///
    /// Attempts are paced by `mutex_retry_interval` and bounded by the
    /// per-operation timeout; the server-side expiration reclaims the cell
    /// if this process dies while holding it.
    async fn acquire_mutex(
        conn: &mut ConnectionManager,
        config: &RedisCacheConfig,
    ) -> Result<String, CacheError> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + config.timeout;
        loop {
            let acquired: Option<String> = Self::bounded(
                config,
                redis::cmd("SET")
                    .arg(MUTEX_KEY)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(config.mutex_expiration.as_millis() as u64)
                    .query_async(conn),
            )
            .await?;
            if acquired.is_some() {
                return Ok(token);
            }
            if Instant::now() + config.mutex_retry_interval >= deadline {
                return Err(CacheError::backend(
                    "timed out acquiring in-progress mutex",
                ));
            }
            tokio::time::sleep(config.mutex_retry_interval).await;
        }
    }

    /// Releases the mutex via an atomic compare-and-delete. A non-matching
    /// token means the lock expired and was taken over; that is a benign
    /// no-op.
    async fn release_mutex(
        conn: &mut ConnectionManager,
        config: &RedisCacheConfig,
        token: &str,
    ) {
        let script = redis::Script::new(MUTEX_RELEASE_SCRIPT);
        let released: Result<i64, CacheError> =
            Self::bounded(config, script.key(MUTEX_KEY).arg(token).invoke_async(conn)).await;
        match released {
            Ok(1) => {}
            Ok(_) => debug!("in-progress mutex expired before release; skipped"),
            Err(e) => warn!("failed to release in-progress mutex: {}", e),
        }
    }

    async fn bounded<T, F>(config: &RedisCacheConfig, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(config.timeout, fut).await {
            Ok(result) => result.map_err(|e| CacheError::backend(e.to_string())),
            Err(_) => Err(CacheError::backend("redis operation timed out")),
        }
    }

    /// Runs leader election for a missed key under the cross-process mutex
    async fn leader_election(&self, key: &str, not_cached: MissKind) -> CacheError {
        if !self.config.in_progress_enabled {
            return CacheError::miss(not_cached);
        }
        let (assigned, already) = match not_cached {
            MissKind::SearchNotCached => (
                MissKind::SearchLeaderAssigned,
                MissKind::SearchLeaderAlreadyAssigned,
            ),
            _ => (
                MissKind::ReadLeaderAssigned,
                MissKind::ReadLeaderAlreadyAssigned,
            ),
        };
        let mut conn = self.connection.clone();
        let token = match Self::acquire_mutex(&mut conn, &self.config).await {
            Ok(token) => token,
            Err(e) => return e,
        };
        let outcome: Result<bool, CacheError> = Self::bounded(
            &self.config,
            conn.hset_nx(HASH_IN_PROGRESS, key, now_nanos().to_string()),
        )
        .await;
        Self::release_mutex(&mut conn, &self.config, &token).await;
        match outcome {
            Ok(true) => CacheError::miss(assigned),
            Ok(false) => CacheError::miss(already),
            Err(e) => e,
        }
    }

    /// Clears in-progress entries covered by a publish or eviction
    async fn clear_in_progress(&self, fields: Vec<String>) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let token = Self::acquire_mutex(&mut conn, &self.config).await?;
        let outcome: Result<i64, CacheError> =
            Self::bounded(&self.config, conn.hdel(HASH_IN_PROGRESS, fields)).await;
        Self::release_mutex(&mut conn, &self.config, &token).await;
        outcome.map(|_| ())
    }
}

#[async_trait]
impl EmployeeCache for RedisCache {
    async fn read_one(&self, emp_no: i64) -> Result<Employee, CacheError> {
        let key = emp_no.to_string();
        let mut conn = self.connection.clone();
        let value: Option<String> =
            Self::bounded(&self.config, conn.hget(HASH_EMPLOYEES, &key)).await?;
        match value {
            // An empty field is indistinguishable from a missing one on
            // some write paths; treat it as not found.
            Some(value) if !value.is_empty() => {
                trace!(emp_no, "cache hit for employee");
                Ok(Employee::from_bytes(value.as_bytes())?)
            }
            _ => {
                trace!(emp_no, "cache miss for employee");
                Err(self.leader_election(&key, MissKind::NotCached).await)
            }
        }
    }

    async fn read_many(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, CacheError> {
        let fingerprint = search.fingerprint()?;
        let mut conn = self.connection.clone();
        let value: Option<String> =
            Self::bounded(&self.config, conn.hget(HASH_SEARCH, &fingerprint)).await?;
        let Some(id_list) = value.filter(|v| !v.is_empty()) else {
            trace!(fingerprint, "cache miss for employee search");
            return Err(
                self.leader_election(&fingerprint, MissKind::SearchNotCached)
                    .await,
            );
        };
        let mut employees = Vec::new();
        for emp_no in id_list.split(',') {
            let value: Option<String> =
                Self::bounded(&self.config, conn.hget(HASH_EMPLOYEES, emp_no)).await?;
            match value {
                Some(value) if !value.is_empty() => {
                    employees.push(Employee::from_bytes(value.as_bytes())?);
                }
                _ => {
                    // Partially evicted result set: drop the stale entry
                    // so the next fill republishes it.
                    trace!(fingerprint, "dropped stale employee search entry");
                    let dropped: Result<i64, CacheError> =
                        Self::bounded(&self.config, conn.hdel(HASH_SEARCH, &fingerprint)).await;
                    if let Err(e) = dropped {
                        warn!("failed to drop stale search entry: {}", e);
                    }
                    return Err(self
                        .leader_election(&fingerprint, MissKind::SearchNotCached)
                        .await);
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
        let mut conn = self.connection.clone();
        let mut fields = Vec::with_capacity(employees.len());
        let mut emp_nos = Vec::with_capacity(employees.len());
        for employee in employees {
            let bytes = employee.to_bytes()?;
            let key = employee.emp_no.to_string();
            fields.push((key.clone(), String::from_utf8_lossy(&bytes).into_owned()));
            emp_nos.push(key);
        }
        if !fields.is_empty() {
            let _: () =
                Self::bounded(&self.config, conn.hset_multiple(HASH_EMPLOYEES, &fields)).await?;
        }
        let _: () = Self::bounded(
            &self.config,
            conn.hset(HASH_SEARCH, &fingerprint, emp_nos.join(",")),
        )
        .await?;
        trace!(fingerprint, records = employees.len(), "cached employees");
        if self.config.in_progress_enabled {
            let mut covered = emp_nos;
            covered.push(fingerprint);
            self.clear_in_progress(covered).await?;
        }
        Ok(())
    }

    async fn delete(&self, emp_nos: &[i64]) -> Result<(), CacheError> {
        if emp_nos.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = emp_nos.iter().map(|n| n.to_string()).collect();
        let mut conn = self.connection.clone();
        let _: i64 = Self::bounded(&self.config, conn.hdel(HASH_EMPLOYEES, &keys)).await?;
        trace!(?emp_nos, "evicted cached employees");
        if self.config.in_progress_enabled {
            self.clear_in_progress(keys).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = Self::bounded(
            &self.config,
            conn.del(&[HASH_EMPLOYEES, HASH_SEARCH, HASH_IN_PROGRESS, MUTEX_KEY]),
        )
        .await?;
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
