//! Employee Cache Service
//!
//! A read-through, write-invalidating caching layer in front of an employee
//! record store, with:
//! - Pluggable cache backends (in-memory, redis, stash)
//! - Single-flight coordination taming thundering herds on cache misses
//! - Write-path invalidation with lazily self-healing search entries
//! - Hit/miss counters and elapsed-time diagnostics

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use api::state::AppState;
use domain::store::EmployeeStore;
use infrastructure::cache::CacheFactory;
use infrastructure::metrics::{CacheCounters, Timers};
use infrastructure::services::{EmployeeService, LogicConfig};
use infrastructure::store::{InMemoryEmployeeStore, PostgresConfig, PostgresEmployeeStore};

/// Collects the process environment into the flat map every component is
/// configured from
pub fn env_map() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Create the application state from the process environment
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_envs(&env_map()).await
}

/// Create the application state from a flat environment map
pub async fn create_app_state_with_envs(
    envs: &HashMap<String, String>,
) -> anyhow::Result<AppState> {
    let store = create_store(envs).await?;

    let logic_config = LogicConfig::from_env_map(envs);
    let cache_enabled = logic_config.cache_enabled;

    // Open-time connectivity failure with the cache enabled is fatal
    let cache = if cache_enabled {
        let cache = CacheFactory::new().from_env_map(envs).await?;
        info!("cache enabled");
        Some(cache)
    } else {
        None
    };

    let counters = Arc::new(CacheCounters::new());
    let timers = Arc::new(Timers::new());

    let mut service = EmployeeService::new(store, logic_config).with_counters(counters.clone());
    if let Some(cache) = &cache {
        service = service.with_cache(cache.clone());
    }
    service.verify()?;

    Ok(AppState::new(Arc::new(service), cache, counters, timers))
}

async fn create_store(
    envs: &HashMap<String, String>,
) -> anyhow::Result<Arc<dyn EmployeeStore>> {
    match envs.get("DATABASE_URL") {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let store = PostgresEmployeeStore::connect(&PostgresConfig::new(url)).await?;
            store.ensure_schema().await?;
            info!("PostgreSQL connection established");
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                "DATABASE_URL not set; using in-memory record store. \
                 This should only be used for testing."
            );
            Ok(Arc::new(InMemoryEmployeeStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_app_state_without_cache() {
        let envs = HashMap::new();
        let state = create_app_state_with_envs(&envs).await.unwrap();
        assert!(state.cache.is_none());
    }

    #[tokio::test]
    async fn test_create_app_state_with_memory_cache() {
        let mut envs = HashMap::new();
        envs.insert("LOGIC_CACHE_ENABLED".to_string(), "true".to_string());
        envs.insert("CACHE_TYPE".to_string(), "memory".to_string());
        envs.insert("CACHE_ENABLE_IN_PROGRESS".to_string(), "true".to_string());

        let state = create_app_state_with_envs(&envs).await.unwrap();
        assert!(state.cache.is_some());

        if let Some(cache) = &state.cache {
            cache.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_app_state_rejects_unknown_cache_type() {
        let mut envs = HashMap::new();
        envs.insert("LOGIC_CACHE_ENABLED".to_string(), "true".to_string());
        envs.insert("CACHE_TYPE".to_string(), "carrier-pigeon".to_string());

        assert!(create_app_state_with_envs(&envs).await.is_err());
    }
}
