//! In-memory discovery cache for tests and single-process runs
//!
//! Observable behavior mirrors the Redis implementation, including INCR
//! semantics on missing keys (treated as zero).

use crate::cache::DiscoveryCache;
use crate::error::{CacheError, CacheResult};

use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct CacheState {
    values: HashMap<String, Vec<u8>>,
    tiles: HashMap<u32, HashSet<String>>,
}

impl CacheState {
    fn bump_counter(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
        let current = match self.values.get(key) {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| CacheError::InvalidCounter {
                        key: key.to_string(),
                        value: text.to_string(),
                    })?
            }
            None => 0,
        };
        let next = current + delta;
        self.values
            .insert(key.to_string(), next.to_string().into_bytes());
        Ok(next)
    }
}

/// In-memory twin of the Redis discovery cache
#[derive(Default)]
pub struct InMemoryDiscoveryCache {
    state: Mutex<CacheState>,
}

impl InMemoryDiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of raw keys held (tests only care about rough shape)
    pub async fn len(&self) -> usize {
        self.state.lock().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.values.is_empty()
    }
}

#[async_trait::async_trait]
impl DiscoveryCache for InMemoryDiscoveryCache {
    async fn contains_key(&self, key: &str) -> CacheResult<bool> {
        Ok(self.state.lock().await.values.contains_key(key))
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.state.lock().await.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.state
            .lock()
            .await
            .values
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn add(&self, tile: u32, key: &str, timestamp_millis: i64) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state
            .values
            .insert(key.to_string(), timestamp_millis.to_string().into_bytes());
        state.tiles.entry(tile).or_default().insert(key.to_string());
        Ok(())
    }

    async fn remove(&self, tile: u32, key: &str) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state.values.remove(key);
        if let Some(members) = state.tiles.get_mut(&tile) {
            members.remove(key);
        }
        Ok(())
    }

    async fn incr_by_one(&self, key: &str) -> CacheResult<i64> {
        self.state.lock().await.bump_counter(key, 1)
    }

    async fn decr_by_one(&self, key: &str) -> CacheResult<i64> {
        self.state.lock().await.bump_counter(key, -1)
    }

    async fn size(&self, tile: u32) -> CacheResult<u64> {
        Ok(self
            .state
            .lock()
            .await
            .tiles
            .get(&tile)
            .map(|members| members.len() as u64)
            .unwrap_or(0))
    }
}
