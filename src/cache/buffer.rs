//! Batching flush buffer for discovered partition keys
//!
//! Newly discovered keys are buffered in memory and written to the cache
//! in chunks, so the shared cache sees one compressed batch instead of
//! thousands of tiny values. The flush behavior is an injected strategy;
//! the production strategy appends the batch as the next densely numbered
//! chunk for the tile and bumps the per-tile chunk counter.

use crate::cache::{chunk_key, read_counter, total_chunks_key, DiscoveryCache};
use crate::codec;
use crate::compress;
use crate::error::Result;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Strategy invoked with each drained batch
#[async_trait::async_trait]
pub trait FlushStrategy: Send + Sync {
    async fn flush(&self, batch: Vec<String>, cache: &dyn DiscoveryCache) -> Result<()>;
}

/// Capacity-gated buffer of partition-key strings.
///
/// `put` appends and flushes automatically once the buffer reaches its
/// capacity; `flush` drains whatever remains. Items are flushed in
/// insertion order.
pub struct ChunkBuffer {
    capacity: usize,
    items: Mutex<Vec<String>>,
    cache: Arc<dyn DiscoveryCache>,
    strategy: Box<dyn FlushStrategy>,
}

impl ChunkBuffer {
    pub fn new(
        capacity: usize,
        cache: Arc<dyn DiscoveryCache>,
        strategy: Box<dyn FlushStrategy>,
    ) -> Self {
        Self {
            capacity,
            items: Mutex::new(Vec::with_capacity(capacity)),
            cache,
            strategy,
        }
    }

    /// Append one key, flushing if the buffer fills
    pub async fn put(&self, key: impl Into<String>) -> Result<()> {
        let batch = {
            let mut items = self.items.lock().await;
            items.push(key.into());
            if items.len() >= self.capacity {
                std::mem::take(&mut *items)
            } else {
                return Ok(());
            }
        };
        self.strategy.flush(batch, self.cache.as_ref()).await
    }

    /// Number of buffered keys
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Drain the remainder; a no-op when nothing is buffered
    pub async fn flush(&self) -> Result<()> {
        let batch = {
            let mut items = self.items.lock().await;
            if items.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *items)
        };
        self.strategy.flush(batch, self.cache.as_ref()).await
    }
}

struct ChunkFlush {
    tile: u32,
}

#[async_trait::async_trait]
impl FlushStrategy for ChunkFlush {
    async fn flush(&self, batch: Vec<String>, cache: &dyn DiscoveryCache) -> Result<()> {
        let counter_key = total_chunks_key(self.tile);
        let current = read_counter(cache, &counter_key).await?;
        debug!("{}:{}", counter_key, current);

        let encoded = codec::encode_key_list(&batch)?;
        let compressed = compress::compress_bytes(&encoded)?;
        cache.put(&chunk_key(self.tile, current), &compressed).await?;
        cache.incr_by_one(&counter_key).await?;
        Ok(())
    }
}

/// Production flush strategy: compressed chunk write plus counter bump
pub fn chunk_flush_strategy(tile: u32) -> Box<dyn FlushStrategy> {
    Box::new(ChunkFlush { tile })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryDiscoveryCache;

    struct RecordingStrategy {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait::async_trait]
    impl FlushStrategy for RecordingStrategy {
        async fn flush(&self, batch: Vec<String>, _cache: &dyn DiscoveryCache) -> Result<()> {
            self.batches.lock().await.push(batch);
            Ok(())
        }
    }

    fn recording_buffer(capacity: usize) -> (ChunkBuffer, Arc<Mutex<Vec<Vec<String>>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let strategy = RecordingStrategy {
            batches: batches.clone(),
        };
        let cache: Arc<dyn DiscoveryCache> = Arc::new(InMemoryDiscoveryCache::new());
        (ChunkBuffer::new(capacity, cache, Box::new(strategy)), batches)
    }

    #[tokio::test]
    async fn test_put_flushes_at_capacity() {
        let (buffer, batches) = recording_buffer(3);

        buffer.put("pk-1").await.unwrap();
        buffer.put("pk-2").await.unwrap();
        assert_eq!(buffer.len().await, 2);
        assert!(batches.lock().await.is_empty());

        buffer.put("pk-3").await.unwrap();
        assert_eq!(buffer.len().await, 0);

        let flushed = batches.lock().await;
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0], vec!["pk-1", "pk-2", "pk-3"]);
    }

    #[tokio::test]
    async fn test_flush_drains_remainder() {
        let (buffer, batches) = recording_buffer(10);

        buffer.put("pk-1").await.unwrap();
        buffer.put("pk-2").await.unwrap();
        buffer.flush().await.unwrap();

        assert!(buffer.is_empty().await);
        assert_eq!(batches.lock().await.as_slice(), &[vec![
            "pk-1".to_string(),
            "pk-2".to_string()
        ]]);
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_is_noop() {
        let (buffer, batches) = recording_buffer(4);
        buffer.flush().await.unwrap();
        assert!(batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_batches_keep_insertion_order() {
        let (buffer, batches) = recording_buffer(2);
        for i in 0..5 {
            buffer.put(format!("pk-{}", i)).await.unwrap();
        }
        buffer.flush().await.unwrap();

        let flushed = batches.lock().await;
        assert_eq!(flushed.len(), 3);
        assert_eq!(flushed[0], vec!["pk-0", "pk-1"]);
        assert_eq!(flushed[1], vec!["pk-2", "pk-3"]);
        assert_eq!(flushed[2], vec!["pk-4"]);
    }

    #[tokio::test]
    async fn test_chunk_flush_strategy_writes_dense_chunks() {
        let cache = Arc::new(InMemoryDiscoveryCache::new());
        cache.put(&total_chunks_key(5), b"0").await.unwrap();

        let buffer = ChunkBuffer::new(2, cache.clone(), chunk_flush_strategy(5));
        buffer.put("pk-a").await.unwrap();
        buffer.put("pk-b").await.unwrap(); // flush -> chunk 0
        buffer.put("pk-c").await.unwrap();
        buffer.flush().await.unwrap(); // remainder -> chunk 1

        assert_eq!(read_counter(cache.as_ref(), &total_chunks_key(5)).await.unwrap(), 2);

        let chunk0 = cache.get(&chunk_key(5, 0)).await.unwrap().unwrap();
        let decoded = codec::decode_key_list(&compress::decompress_bytes(&chunk0).unwrap()).unwrap();
        assert_eq!(decoded, vec!["pk-a", "pk-b"]);

        let chunk1 = cache.get(&chunk_key(5, 1)).await.unwrap().unwrap();
        let decoded = codec::decode_key_list(&compress::decompress_bytes(&chunk1).unwrap()).unwrap();
        assert_eq!(decoded, vec!["pk-c"]);
    }

    #[tokio::test]
    async fn test_chunk_flush_requires_counter() {
        let cache: Arc<dyn DiscoveryCache> = Arc::new(InMemoryDiscoveryCache::new());
        let buffer = ChunkBuffer::new(1, cache, chunk_flush_strategy(0));
        // Counter was never initialized
        assert!(buffer.put("pk-a").await.is_err());
    }
}
