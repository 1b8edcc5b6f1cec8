use redis::{Commands, Connection, RedisResult};
use rota_core::{CacheStore, RotaError, RotaResult};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Redis-backed rule cache.
///
/// Entries live under `rota:` prefixed keys and expire after the configured
/// TTL. Failures surface as `RotaError::Store`, which the rule cache treats as
/// a miss.
pub struct RedisCacheStore {
    conn: Mutex<Connection>,
    ttl_sec: u64,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore").field("ttl_sec", &self.ttl_sec).finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Create a new store.
    pub fn new(redis_url: &str, ttl_min: u64) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection()?;
        Ok(Self { conn: Mutex::new(conn), ttl_sec: (ttl_min * 60).max(1) })
    }

    pub fn redis_key(key: &str) -> String {
        format!("rota:{key}")
    }

    fn with_conn<T>(&self, operation: &str, f: impl FnOnce(&mut Connection) -> RedisResult<T>) -> RotaResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| RotaError::store(operation, "redis connection lock poisoned"))?;
        f(&mut *conn).map_err(|e| {
            warn!(operation, "Redis command failed: {}", e);
            RotaError::store(operation, e.to_string())
        })
    }
}

impl CacheStore for RedisCacheStore {
    fn get(&self, key: &str) -> RotaResult<Option<String>> {
        let redis_key = Self::redis_key(key);
        let value: Option<String> = self.with_conn("cache get", |conn| conn.get(&redis_key))?;
        debug!(key = %redis_key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    fn set(&self, key: &str, value: String) -> RotaResult<()> {
        let redis_key = Self::redis_key(key);
        let ttl_sec = self.ttl_sec;
        self.with_conn("cache set", |conn| conn.set_ex::<_, _, ()>(&redis_key, value, ttl_sec))?;
        debug!(key = %redis_key, "Cache set OK");
        Ok(())
    }

    fn delete(&self, key: &str) -> RotaResult<()> {
        let redis_key = Self::redis_key(key);
        self.with_conn("cache delete", |conn| conn.del::<_, ()>(&redis_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_prefixed() {
        assert_eq!(RedisCacheStore::redis_key("assignment_rule_map::Issue"), "rota:assignment_rule_map::Issue");
    }

    #[test]
    fn test_unreachable_server_fails_to_connect() {
        assert!(RedisCacheStore::new("redis://127.0.0.1:1/", 60).is_err());
    }
}
