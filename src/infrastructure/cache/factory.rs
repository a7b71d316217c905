//! Cache factory for runtime backend selection

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::cache::EmployeeCache;
use crate::domain::DomainError;

use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};
use super::stash::{MokaStash, MokaStashConfig, RedisStash, RedisStashConfig, StashCache};

/// Supported cache backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheType {
    /// In-memory maps with in-process single-flight
    #[default]
    Memory,
    /// Remote key-value store with cross-process single-flight
    Redis,
    /// Generic store backed by an in-process LRU+TTL cache
    StashMemory,
    /// Generic store backed by flat remote keys with native TTL
    StashRedis,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Memory => write!(f, "memory"),
            CacheType::Redis => write!(f, "redis"),
            CacheType::StashMemory => write!(f, "stash-memory"),
            CacheType::StashRedis => write!(f, "stash-redis"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CacheType::Memory),
            "redis" => Ok(CacheType::Redis),
            "stash-memory" => Ok(CacheType::StashMemory),
            "stash-redis" => Ok(CacheType::StashRedis),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache type: {}. Valid types: memory, redis, stash-memory, stash-redis",
                s
            ))),
        }
    }
}

/// Factory building a cache backend from the flat environment map
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates the backend named by `CACHE_TYPE`, configured from the map
    pub async fn from_env_map(
        &self,
        envs: &HashMap<String, String>,
    ) -> Result<Arc<dyn EmployeeCache>, DomainError> {
        let cache_type = envs
            .get("CACHE_TYPE")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();
        self.create(cache_type, envs).await
    }

    /// Creates a backend of the given type, configured from the map
    pub async fn create(
        &self,
        cache_type: CacheType,
        envs: &HashMap<String, String>,
    ) -> Result<Arc<dyn EmployeeCache>, DomainError> {
        match cache_type {
            CacheType::Memory => {
                let config = InMemoryCacheConfig::from_env_map(envs);
                Ok(Arc::new(InMemoryCache::with_config(config)))
            }
            CacheType::Redis => {
                let config = RedisCacheConfig::from_env_map(envs);
                let cache = RedisCache::new(config)
                    .await
                    .map_err(|e| DomainError::cache(e.to_string()))?;
                Ok(Arc::new(cache))
            }
            CacheType::StashMemory => {
                let config = MokaStashConfig::from_env_map(envs);
                let stash = Arc::new(MokaStash::with_config(config));
                Ok(Arc::new(StashCache::new(stash)))
            }
            CacheType::StashRedis => {
                let config = RedisStashConfig::from_env_map(envs);
                let stash = RedisStash::new(config)
                    .await
                    .map_err(|e| DomainError::cache(e.to_string()))?;
                Ok(Arc::new(StashCache::new(Arc::new(stash))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::employee::{Employee, EmployeeSearch};

    #[test]
    fn test_cache_type_from_str() {
        assert_eq!("memory".parse::<CacheType>().unwrap(), CacheType::Memory);
        assert_eq!("redis".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert_eq!(
            "stash-memory".parse::<CacheType>().unwrap(),
            CacheType::StashMemory
        );
        assert_eq!(
            "STASH-REDIS".parse::<CacheType>().unwrap(),
            CacheType::StashRedis
        );
        assert!("mongo".parse::<CacheType>().is_err());
    }

    #[test]
    fn test_cache_type_display_round_trip() {
        for cache_type in [
            CacheType::Memory,
            CacheType::Redis,
            CacheType::StashMemory,
            CacheType::StashRedis,
        ] {
            let parsed: CacheType = cache_type.to_string().parse().unwrap();
            assert_eq!(parsed, cache_type);
        }
    }

    #[tokio::test]
    async fn test_factory_create_memory() {
        let factory = CacheFactory::new();
        let mut envs = HashMap::new();
        envs.insert("CACHE_TYPE".to_string(), "memory".to_string());

        let cache = factory.from_env_map(&envs).await.unwrap();

        let employee = Employee {
            emp_no: 1,
            birth_date: 0,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            gender: "M".to_string(),
            hire_date: 0,
        };
        cache
            .write_many(&EmployeeSearch::default(), &[employee.clone()])
            .await
            .unwrap();
        assert_eq!(cache.read_one(1).await.unwrap(), employee);
    }

    #[tokio::test]
    async fn test_factory_create_stash_memory() {
        let factory = CacheFactory::new();
        let mut envs = HashMap::new();
        envs.insert("CACHE_TYPE".to_string(), "stash-memory".to_string());

        let cache = factory.from_env_map(&envs).await;
        assert!(cache.is_ok());
    }

    #[tokio::test]
    async fn test_factory_defaults_to_memory() {
        let factory = CacheFactory::new();
        let cache = factory.from_env_map(&HashMap::new()).await;
        assert!(cache.is_ok());
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_type() {
        let factory = CacheFactory::new();
        let mut envs = HashMap::new();
        envs.insert("CACHE_TYPE".to_string(), "memcached".to_string());

        let result = factory.from_env_map(&envs).await;
        assert!(result.is_err());
    }
}
