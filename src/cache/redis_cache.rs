//! Redis-backed discovery cache implementation
//!
//! Plain keys carry the wire conventions from the cache module doc; the
//! per-tile membership set uses SADD/SREM/SCARD so `size` and tile-scoped
//! removal stay O(1). Counters ride on INCR/DECR, which operate on the
//! decimal strings the protocol stores.

use crate::cache::{tile_members_key, DiscoveryCache};
use crate::error::{CacheError, CacheResult};

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration for the Redis discovery cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl RedisCacheConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

/// Redis-backed discovery cache
pub struct RedisDiscoveryCache {
    connection: Arc<RwLock<MultiplexedConnection>>,
}

impl RedisDiscoveryCache {
    /// Connect to Redis
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            CacheError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
        })
    }
}

#[async_trait::async_trait]
impl DiscoveryCache for RedisDiscoveryCache {
    async fn contains_key(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.write().await;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.write().await;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let mut conn = self.connection.write().await;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn add(&self, tile: u32, key: &str, timestamp_millis: i64) -> CacheResult<()> {
        let mut conn = self.connection.write().await;
        conn.set::<_, _, ()>(key, timestamp_millis.to_string())
            .await?;
        conn.sadd::<_, _, ()>(tile_members_key(tile), key).await?;
        Ok(())
    }

    async fn remove(&self, tile: u32, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.write().await;
        conn.del::<_, ()>(key).await?;
        conn.srem::<_, _, ()>(tile_members_key(tile), key).await?;
        Ok(())
    }

    async fn incr_by_one(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.connection.write().await;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn decr_by_one(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.connection.write().await;
        let value: i64 = conn.decr(key, 1).await?;
        Ok(value)
    }

    async fn size(&self, tile: u32) -> CacheResult<u64> {
        let mut conn = self.connection.write().await;
        let count: u64 = conn.scard(tile_members_key(tile)).await?;
        Ok(count)
    }
}
