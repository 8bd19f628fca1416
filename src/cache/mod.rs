//! Distributed discovery cache
//!
//! Sibling tiles coordinate through a shared cache so each partition is
//! discovered exactly once across the fleet. The cache holds three kinds
//! of entries, all under fixed pipe-delimited key conventions:
//!
//! - `"{partition_key}"` -> discovery timestamp (epoch millis, decimal)
//! - `"{tile}|totalChunks"` -> per-tile chunk counter (decimal string)
//! - `"pksChunk|{tile}|{chunk}"` -> compressed encoded partition-key batch
//!
//! Chunk indices below the counter are densely numbered; readers must
//! bound chunk lookups by the counter, since emptied chunks decrement it
//! without deleting stale chunk keys above it.

mod buffer;
mod memory;
mod redis_cache;

pub use buffer::{chunk_flush_strategy, ChunkBuffer, FlushStrategy};
pub use memory::InMemoryDiscoveryCache;
pub use redis_cache::{RedisCacheConfig, RedisDiscoveryCache};

use crate::error::{CacheError, CacheResult};

/// Key of the per-tile chunk counter: "{tile}|totalChunks"
pub fn total_chunks_key(tile: u32) -> String {
    format!("{}|totalChunks", tile)
}

/// Key of one discovery chunk: "pksChunk|{tile}|{chunk}"
pub fn chunk_key(tile: u32, chunk: i64) -> String {
    format!("pksChunk|{}|{}", tile, chunk)
}

/// Key of the tile's membership set, backing `size` and tile-scoped removes
pub fn tile_members_key(tile: u32) -> String {
    format!("tileKeys|{}", tile)
}

/// Trait for discovery cache implementations
#[async_trait::async_trait]
pub trait DiscoveryCache: Send + Sync {
    /// Membership probe for a raw key
    async fn contains_key(&self, key: &str) -> CacheResult<bool>;

    /// Fetch a raw value; absent keys are None
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a raw value
    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Record a discovered partition key, attributed to a tile
    async fn add(&self, tile: u32, key: &str, timestamp_millis: i64) -> CacheResult<()>;

    /// Remove a partition key and its tile attribution
    async fn remove(&self, tile: u32, key: &str) -> CacheResult<()>;

    /// Increment a decimal counter, returning the new value
    async fn incr_by_one(&self, key: &str) -> CacheResult<i64>;

    /// Decrement a decimal counter, returning the new value
    async fn decr_by_one(&self, key: &str) -> CacheResult<i64>;

    /// Number of keys attributed to a tile
    async fn size(&self, tile: u32) -> CacheResult<u64>;
}

/// Read a decimal counter value, requiring it to exist.
///
/// Counters are stored as decimal strings; surrounding whitespace is
/// tolerated, anything else is an error.
pub async fn read_counter(cache: &dyn DiscoveryCache, key: &str) -> CacheResult<i64> {
    let bytes = cache.get(key).await?.ok_or_else(|| CacheError::Missing {
        key: key.to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes);
    text.trim()
        .parse::<i64>()
        .map_err(|_| CacheError::InvalidCounter {
            key: key.to_string(),
            value: text.to_string(),
        })
}

// Re-export async_trait for consumers
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_conventions() {
        assert_eq!(total_chunks_key(4), "4|totalChunks");
        assert_eq!(chunk_key(4, 0), "pksChunk|4|0");
        assert_eq!(chunk_key(12, 37), "pksChunk|12|37");
        assert_eq!(tile_members_key(4), "tileKeys|4");
    }

    #[tokio::test]
    async fn test_read_counter_parses_and_trims() {
        let cache = InMemoryDiscoveryCache::new();
        cache.put("0|totalChunks", b" 42 ").await.unwrap();
        assert_eq!(read_counter(&cache, "0|totalChunks").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_read_counter_missing_key() {
        let cache = InMemoryDiscoveryCache::new();
        assert!(matches!(
            read_counter(&cache, "9|totalChunks").await,
            Err(CacheError::Missing { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_counter_rejects_garbage() {
        let cache = InMemoryDiscoveryCache::new();
        cache.put("0|totalChunks", b"not-a-number").await.unwrap();
        assert!(matches!(
            read_counter(&cache, "0|totalChunks").await,
            Err(CacheError::InvalidCounter { .. })
        ));
    }
}
