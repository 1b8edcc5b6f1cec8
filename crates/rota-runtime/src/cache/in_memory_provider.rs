use moka::sync::Cache;
use rota_core::{CacheStore, RotaResult};
use std::time::Duration;

/// An in-process rule cache backed by `moka`.
#[derive(Clone, Debug)]
pub struct MokaCacheStore {
    cache: Cache<String, String>,
}

impl MokaCacheStore {
    pub fn new(max_capacity: u64, time_to_live_minutes: u64) -> Self {
        let ttl = Duration::from_secs(time_to_live_minutes * 60);
        Self { cache: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build() }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl CacheStore for MokaCacheStore {
    fn get(&self, key: &str) -> RotaResult<Option<String>> {
        Ok(self.cache.get(key))
    }

    fn set(&self, key: &str, value: String) -> RotaResult<()> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> RotaResult<()> {
        self.cache.invalidate(key);
        Ok(())
    }
}
