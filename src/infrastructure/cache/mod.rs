//! Cache backends: in-memory, redis, and the pluggable stash

pub mod factory;
pub mod in_memory;
mod in_progress;
mod pruner;
pub mod redis;
pub mod stash;

pub use factory::{CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis::{RedisCache, RedisCacheConfig};
pub use stash::{MokaStash, MokaStashConfig, RedisStash, RedisStashConfig, Stash, StashCache};
