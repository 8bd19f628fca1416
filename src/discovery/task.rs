//! Partition discovery task
//!
//! One task instance owns one tile. A run has two stages: scan the tile's
//! token ranges and fold newly seen partition keys into the cache, the
//! ledger, and the chunked key store; then, when delete replication is on,
//! walk the stored chunks backwards against the source and evict
//! partitions that no longer exist.

use crate::cache::{
    chunk_flush_strategy, chunk_key, read_counter, total_chunks_key, ChunkBuffer, DiscoveryCache,
};
use crate::codec;
use crate::compress;
use crate::config::ReconcilerConfig;
use crate::error::{CacheError, ReconcilerError, Result};
use crate::ledger::LedgerStore;
use crate::model::{now_millis, ColumnSpec, PartitionKey, PartitionMetadata};
use crate::source::SourceStore;
use crate::tiler::{assign_ranges_to_tiles, split_range_into_batches, TokenRange};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Progress information during a discovery run
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    /// Token ranges fully scanned so far
    pub ranges_scanned: u64,
    /// Token ranges assigned to this tile
    pub ranges_assigned: u64,
    /// Rows pulled from the source
    pub rows_scanned: u64,
    /// Partition keys seen for the first time
    pub new_partitions: u64,
    /// Partition keys confirmed deleted
    pub deleted_partitions: u64,
    /// Elapsed time
    pub elapsed: Duration,
}

/// Final statistics from a discovery run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Token ranges assigned to this tile
    pub ranges_assigned: u64,
    /// Rows pulled from the source
    pub rows_scanned: u64,
    /// Partition keys seen for the first time
    pub new_partitions: u64,
    /// Partition keys confirmed deleted
    pub deleted_partitions: u64,
    /// Chunks written to the cache by this run
    pub chunks_flushed: u64,
    /// Cached keys for this tile after the run
    pub cache_size: u64,
    /// Total duration
    pub duration: Duration,
}

#[derive(Default)]
struct Counters {
    ranges_scanned: u64,
    ranges_assigned: u64,
    rows_scanned: u64,
    new_partitions: u64,
    deleted_partitions: u64,
}

impl Counters {
    fn snapshot(&self, start: Instant) -> RunProgress {
        RunProgress {
            ranges_scanned: self.ranges_scanned,
            ranges_assigned: self.ranges_assigned,
            rows_scanned: self.rows_scanned,
            new_partitions: self.new_partitions,
            deleted_partitions: self.deleted_partitions,
            elapsed: start.elapsed(),
        }
    }
}

/// Discovery orchestrator for a single tile
pub struct PartitionDiscoveryTask {
    config: ReconcilerConfig,
    source: Arc<dyn SourceStore>,
    cache: Arc<dyn DiscoveryCache>,
    ledger: Arc<dyn LedgerStore>,
    key_columns: Vec<ColumnSpec>,
    shutdown: Arc<AtomicBool>,
}

impl PartitionDiscoveryTask {
    /// Create a new discovery task.
    ///
    /// The declared partition-key columns are fetched once here and reused
    /// for every scan and existence probe of the run.
    pub async fn new(
        config: ReconcilerConfig,
        source: Arc<dyn SourceStore>,
        cache: Arc<dyn DiscoveryCache>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Result<Self> {
        let key_columns = source.partition_key_columns().await?;
        Ok(Self {
            config,
            source,
            cache,
            ledger,
            key_columns,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Flag checked between sub-batches; share it with a signal handler
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ReconcilerError::Interrupted);
        }
        Ok(())
    }

    /// Run one discovery cycle for this tile
    pub async fn run<F>(&self, progress_callback: F) -> Result<RunStats>
    where
        F: Fn(RunProgress) + Send + Sync + 'static,
    {
        let start = Instant::now();
        let progress: &dyn Fn(RunProgress) = &progress_callback;

        let ranges = self.source.token_ranges().await?;
        let total_ranges = ranges.len();
        let mut tiled = assign_ranges_to_tiles(&ranges, self.config.tiles);
        let tile_index = self.config.tile as usize;
        let tile_ranges = if tile_index < tiled.len() {
            std::mem::take(&mut tiled[tile_index])
        } else {
            Vec::new()
        };

        info!("The number of token ranges in the source: {}", total_ranges);
        info!("The number of ranges for the tile: {}", tile_ranges.len());
        info!("The number of tiles: {}", self.config.tiles);
        info!("The current tile: {}", self.config.tile);

        let mut counters = Counters {
            ranges_assigned: tile_ranges.len() as u64,
            ..Counters::default()
        };

        let chunks_flushed = self
            .scan_and_compare(&tile_ranges, &mut counters, start, progress)
            .await?;

        if self.config.replicate_deletes {
            self.scan_and_remove(&mut counters, start, progress).await?;
        }

        info!("Caching and comparing stage is completed");
        let cache_size = self.cache.size(self.config.tile).await?;
        info!(
            "The number of pre-loaded elements in the cache is {}",
            cache_size
        );

        Ok(RunStats {
            ranges_assigned: counters.ranges_assigned,
            rows_scanned: counters.rows_scanned,
            new_partitions: counters.new_partitions,
            deleted_partitions: counters.deleted_partitions,
            chunks_flushed,
            cache_size,
            duration: start.elapsed(),
        })
    }

    /// Scan assigned ranges and fold unseen partition keys into the cache,
    /// the ledger, and the chunk buffer. Returns chunks written.
    async fn scan_and_compare(
        &self,
        ranges: &[TokenRange],
        counters: &mut Counters,
        start: Instant,
        progress: &dyn Fn(RunProgress),
    ) -> Result<u64> {
        let counter_key = total_chunks_key(self.config.tile);
        if !self.cache.contains_key(&counter_key).await? {
            self.cache.put(&counter_key, b"0").await?;
        }
        let chunks_before = read_counter(self.cache.as_ref(), &counter_key).await?;

        let buffer = ChunkBuffer::new(
            self.config.flush_capacity,
            self.cache.clone(),
            chunk_flush_strategy(self.config.tile),
        );

        for range in ranges {
            self.check_shutdown()?;
            trace!("Processing a range: {} - {}", range.start, range.end);

            for batch in split_range_into_batches(range.start, range.end, self.config.read_batch_size)
            {
                self.check_shutdown()?;
                let rows = self
                    .source
                    .scan_partition_keys(&self.key_columns, batch)
                    .await?;

                for row in rows {
                    counters.rows_scanned += 1;
                    let key = row.partition_key(&self.key_columns)?;
                    if self.cache.contains_key(key.as_str()).await? {
                        continue;
                    }

                    self.cache
                        .add(self.config.tile, key.as_str(), now_millis())
                        .await?;
                    let pmd = PartitionMetadata::new(
                        self.config.tile,
                        &self.config.keyspace,
                        &self.config.table,
                        key.as_str(),
                    );
                    self.ledger.write_partition_metadata(&pmd)?;
                    buffer.put(key.as_str()).await?;
                    debug!("Syncing a new partition key: {}", key);
                    counters.new_partitions += 1;
                }

                progress(counters.snapshot(start));
            }
            counters.ranges_scanned += 1;
        }

        let remainder = buffer.len().await;
        if remainder > 0 {
            info!("Flushing remainders: {}", remainder);
            buffer.flush().await?;
        }

        let chunks_after = read_counter(self.cache.as_ref(), &counter_key).await?;
        Ok(chunks_after.saturating_sub(chunks_before) as u64)
    }

    /// Walk the stored chunks and evict partitions the source no longer has
    async fn scan_and_remove(
        &self,
        counters: &mut Counters,
        start: Instant,
        progress: &dyn Fn(RunProgress),
    ) -> Result<()> {
        info!("Syncing deleted partition keys");
        let counter_key = total_chunks_key(self.config.tile);
        let chunks = read_counter(self.cache.as_ref(), &counter_key).await?;

        for chunk in 0..chunks {
            self.check_shutdown()?;
            self.delete_partitions(chunk, counters).await?;
            progress(counters.snapshot(start));
        }
        Ok(())
    }

    /// Re-validate one chunk of previously discovered keys against the
    /// source, evicting vanished partitions everywhere they are recorded
    async fn delete_partitions(&self, chunk: i64, counters: &mut Counters) -> Result<()> {
        let key_of_chunk = chunk_key(self.config.tile, chunk);
        let compressed = self
            .cache
            .get(&key_of_chunk)
            .await?
            .ok_or_else(|| CacheError::Missing {
                key: key_of_chunk.clone(),
            })?;
        let encoded = compress::decompress_bytes(&compressed)?;
        let keys = codec::decode_key_list(&encoded)?;

        let mut remaining = keys.clone();
        for key in &keys {
            self.check_shutdown()?;
            debug!("Processing partition key: {}", key);

            let partition_key = PartitionKey::new(key.clone());
            let exists = self
                .source
                .partition_exists(&partition_key, &self.key_columns)
                .await?;
            if exists {
                continue;
            }

            debug!("Found deleted partition key {}", key);
            self.cache.remove(self.config.tile, key).await?;
            remaining.retain(|k| k != key);
            let pmd = PartitionMetadata::new(
                self.config.tile,
                &self.config.keyspace,
                &self.config.table,
                key.as_str(),
            );
            self.ledger.delete_partition_metadata(&pmd)?;
            counters.deleted_partitions += 1;
        }

        // Shrunk chunks are rewritten in place under the same key; emptied
        // chunks stay behind as tombstones and the counter drops by one.
        if remaining.len() < keys.len() {
            let encoded = codec::encode_key_list(&remaining)?;
            let compressed = compress::compress_bytes(&encoded)?;
            self.cache.put(&key_of_chunk, &compressed).await?;
        }
        if remaining.is_empty() {
            self.cache.decr_by_one(&total_chunks_key(self.config.tile)).await?;
        }
        Ok(())
    }
}
