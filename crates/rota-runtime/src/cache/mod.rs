//! Rule-cache backends
//!
//! Both backends store the JSON payloads the rule cache writes; the engine only
//! sees them through `rota_core::CacheStore`.

use crate::config::{CacheType, CachingConfig};
use rota_core::CacheStore;
use std::sync::Arc;
use tracing::info;

pub mod in_memory_provider;

#[cfg(feature = "redis-cache")]
pub mod redis_provider;

pub use in_memory_provider::MokaCacheStore;

#[cfg(feature = "redis-cache")]
pub use redis_provider::RedisCacheStore;

/// Build the cache backend named by the configuration.
pub fn build_cache_store(config: &CachingConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    match config.cache_type {
        CacheType::InMemory => {
            info!(
                max_entries = config.max_entries,
                ttl_minutes = config.rule_cache_ttl_minutes,
                "Using in-memory rule cache"
            );
            Ok(Arc::new(MokaCacheStore::new(config.max_entries, config.rule_cache_ttl_minutes)))
        }
        CacheType::Redis => redis_store(config),
    }
}

#[cfg(feature = "redis-cache")]
fn redis_store(config: &CachingConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("cache_type is 'redis' but no redis_url is configured"))?;
    info!(ttl_minutes = config.rule_cache_ttl_minutes, "Using Redis rule cache");
    Ok(Arc::new(RedisCacheStore::new(url, config.rule_cache_ttl_minutes)?))
}

#[cfg(not(feature = "redis-cache"))]
fn redis_store(_config: &CachingConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    anyhow::bail!("cache_type is 'redis' but rota-runtime was built without the 'redis-cache' feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_in_memory_store() {
        let store = build_cache_store(&CachingConfig::default()).unwrap();
        store.set("k", "v".to_string()).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_redis_without_url_is_an_error() {
        let config = CachingConfig { cache_type: CacheType::Redis, redis_url: None, ..CachingConfig::default() };
        assert!(build_cache_store(&config).is_err());
    }
}
