//! Integration tests for tile-reconciler
//!
//! Full discovery cycles composed from the in-memory source, the in-memory
//! discovery cache, and RocksDB ledgers in temporary directories. No Redis
//! server or live source database is required.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::tempdir;
use tile_reconciler::cache::{
    chunk_key, read_counter, total_chunks_key, DiscoveryCache, InMemoryDiscoveryCache,
};
use tile_reconciler::codec;
use tile_reconciler::compress;
use tile_reconciler::config::ReconcilerConfig;
use tile_reconciler::ledger::{LedgerStore, RocksLedger};
use tile_reconciler::model::{
    ColumnSpec, ColumnValue, PartitionKey, PartitionMetadata, SourceRow,
};
use tile_reconciler::source::{load_fixture, InMemorySource};
use tile_reconciler::tiler::TokenRange;
use tile_reconciler::PartitionDiscoveryTask;

fn run_config(tile: u32, tiles: u32, replicate_deletes: bool, root: &Path) -> ReconcilerConfig {
    ReconcilerConfig {
        tile,
        tiles,
        read_batch_size: 1_000,
        flush_capacity: 100,
        keyspace: "media".to_string(),
        table: "assets".to_string(),
        source_path: root.join("rows.json"),
        storage_root: root.to_path_buf(),
        process_name: "pd".to_string(),
        replicate_deletes,
        redis_url: "redis://127.0.0.1:6379".to_string(),
        show_progress: false,
        verbose: false,
    }
}

fn id_columns() -> Vec<ColumnSpec> {
    vec![ColumnSpec::new("id", "text")]
}

fn id_row(id: &str) -> SourceRow {
    SourceRow::new(vec![("id".to_string(), ColumnValue::Text(id.to_string()))])
}

fn decode_chunk_blob(blob: &[u8]) -> Vec<String> {
    codec::decode_key_list(&compress::decompress_bytes(blob).unwrap()).unwrap()
}

#[tokio::test]
async fn test_full_cycle_from_fixture_file() {
    let dir = tempdir().unwrap();
    let fixture_path = dir.path().join("rows.json");
    std::fs::write(
        &fixture_path,
        r#"{
            "ranges": [{ "start": 0, "end": 999 }],
            "columns": [
                { "name": "region", "type_name": "text" },
                { "name": "bucket", "type_name": "bigint" }
            ],
            "rows": [
                { "token": 10, "values": { "region": "eu", "bucket": 7 } },
                { "token": 500, "values": { "region": "us", "bucket": 12 } }
            ]
        }"#,
    )
    .unwrap();

    let source = Arc::new(load_fixture(&fixture_path).await.unwrap());
    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());

    let task = PartitionDiscoveryTask::new(
        run_config(0, 1, false, dir.path()),
        source,
        cache.clone(),
        ledger.clone(),
    )
    .await
    .unwrap();

    let ticks = Arc::new(AtomicU64::new(0));
    let seen = ticks.clone();
    let stats = task
        .run(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        })
        .await
        .unwrap();

    assert_eq!(stats.rows_scanned, 2);
    assert_eq!(stats.new_partitions, 2);
    assert_eq!(stats.chunks_flushed, 1);
    assert_eq!(stats.cache_size, 2);

    // The progress callback fires at least once per scanned batch
    assert!(ticks.load(Ordering::Relaxed) >= 1);

    // The cache holds each typed key under its pipe-joined rendering
    assert!(cache.contains_key("eu|7").await.unwrap());
    assert!(cache.contains_key("us|12").await.unwrap());

    // Chunk 0 carries both keys in scan order
    let blob = cache.get(&chunk_key(0, 0)).await.unwrap().unwrap();
    assert_eq!(decode_chunk_blob(&blob), vec!["eu|7", "us|12"]);

    // The ledger records both partitions
    let pmd = PartitionMetadata::new(0, "media", "assets", "eu|7");
    assert!(ledger.read_partition_metadata(&pmd).unwrap().is_some());
}

#[tokio::test]
async fn test_second_run_discovers_nothing_new() {
    let dir = tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(
        id_columns(),
        vec![TokenRange::new(0, 100)],
    ));
    source.insert(1, id_row("alpha")).await;
    source.insert(2, id_row("beta")).await;

    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
    let task = PartitionDiscoveryTask::new(
        run_config(0, 1, false, dir.path()),
        source,
        cache.clone(),
        ledger,
    )
    .await
    .unwrap();

    let first = task.run(|_| {}).await.unwrap();
    assert_eq!(first.new_partitions, 2);
    assert_eq!(first.chunks_flushed, 1);

    // Every key is already cached, so nothing is re-recorded
    let second = task.run(|_| {}).await.unwrap();
    assert_eq!(second.rows_scanned, 2);
    assert_eq!(second.new_partitions, 0);
    assert_eq!(second.chunks_flushed, 0);
    assert_eq!(second.cache_size, 2);

    let chunks = read_counter(cache.as_ref(), &total_chunks_key(0))
        .await
        .unwrap();
    assert_eq!(chunks, 1);
}

#[tokio::test]
async fn test_partition_added_between_runs_lands_in_next_chunk() {
    let dir = tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(
        id_columns(),
        vec![TokenRange::new(0, 100)],
    ));
    source.insert(1, id_row("1")).await;
    source.insert(2, id_row("2")).await;
    source.insert(3, id_row("3")).await;

    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
    let task = PartitionDiscoveryTask::new(
        run_config(0, 1, false, dir.path()),
        source,
        cache.clone(),
        ledger.clone(),
    )
    .await
    .unwrap();
    task.run(|_| {}).await.unwrap();

    // A partition written after the first cycle is picked up by the next
    source.insert(42, id_row("42")).await;
    let second = task.run(|_| {}).await.unwrap();

    assert_eq!(second.rows_scanned, 4);
    assert_eq!(second.new_partitions, 1);
    assert_eq!(second.chunks_flushed, 1);
    assert_eq!(second.cache_size, 4);

    let chunks = read_counter(cache.as_ref(), &total_chunks_key(0))
        .await
        .unwrap();
    assert_eq!(chunks, 2);

    let blob = cache.get(&chunk_key(0, 1)).await.unwrap().unwrap();
    assert_eq!(decode_chunk_blob(&blob), vec!["42"]);

    let pmd = PartitionMetadata::new(0, "media", "assets", "42");
    assert!(ledger.read_partition_metadata(&pmd).unwrap().is_some());
}

#[tokio::test]
async fn test_deleted_partition_is_evicted_everywhere() {
    let dir = tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(
        id_columns(),
        vec![TokenRange::new(0, 100)],
    ));
    source.insert(1, id_row("alpha")).await;
    source.insert(2, id_row("beta")).await;
    source.insert(3, id_row("gamma")).await;

    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
    let task = PartitionDiscoveryTask::new(
        run_config(0, 1, true, dir.path()),
        source.clone(),
        cache.clone(),
        ledger.clone(),
    )
    .await
    .unwrap();

    let first = task.run(|_| {}).await.unwrap();
    assert_eq!(first.new_partitions, 3);
    assert_eq!(first.deleted_partitions, 0);

    let removed = source.remove_partition(&PartitionKey::new("beta")).await;
    assert_eq!(removed, 1);

    let second = task.run(|_| {}).await.unwrap();
    assert_eq!(second.new_partitions, 0);
    assert_eq!(second.deleted_partitions, 1);
    assert_eq!(second.cache_size, 2);

    assert!(!cache.contains_key("beta").await.unwrap());
    assert!(cache.contains_key("alpha").await.unwrap());

    // The shrunk chunk is rewritten in place under the same key
    let blob = cache.get(&chunk_key(0, 0)).await.unwrap().unwrap();
    assert_eq!(decode_chunk_blob(&blob), vec!["alpha", "gamma"]);
    let chunks = read_counter(cache.as_ref(), &total_chunks_key(0))
        .await
        .unwrap();
    assert_eq!(chunks, 1);

    let gone = PartitionMetadata::new(0, "media", "assets", "beta");
    assert!(ledger.read_partition_metadata(&gone).unwrap().is_none());
    let kept = PartitionMetadata::new(0, "media", "assets", "alpha");
    assert!(ledger.read_partition_metadata(&kept).unwrap().is_some());
}

#[tokio::test]
async fn test_emptied_chunk_decrements_counter() {
    let dir = tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(
        id_columns(),
        vec![TokenRange::new(0, 100)],
    ));
    source.insert(1, id_row("alpha")).await;
    source.insert(2, id_row("beta")).await;

    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
    let task = PartitionDiscoveryTask::new(
        run_config(0, 1, true, dir.path()),
        source.clone(),
        cache.clone(),
        ledger,
    )
    .await
    .unwrap();
    task.run(|_| {}).await.unwrap();

    source.remove_partition(&PartitionKey::new("alpha")).await;
    source.remove_partition(&PartitionKey::new("beta")).await;

    let second = task.run(|_| {}).await.unwrap();
    assert_eq!(second.rows_scanned, 0);
    assert_eq!(second.deleted_partitions, 2);
    assert_eq!(second.cache_size, 0);

    // The counter drops to zero; the emptied chunk stays behind and
    // readers are bounded by the counter, not by key presence
    let chunks = read_counter(cache.as_ref(), &total_chunks_key(0))
        .await
        .unwrap();
    assert_eq!(chunks, 0);
    let blob = cache.get(&chunk_key(0, 0)).await.unwrap().unwrap();
    assert!(decode_chunk_blob(&blob).is_empty());
}

#[tokio::test]
async fn test_sibling_tiles_scan_disjoint_ranges() {
    let dir = tempdir().unwrap();
    let ranges = vec![TokenRange::new(0, 99), TokenRange::new(100, 199)];
    let source = Arc::new(InMemorySource::new(id_columns(), ranges));
    source.insert(10, id_row("a0")).await;
    source.insert(20, id_row("a1")).await;
    source.insert(110, id_row("b0")).await;

    // Tiles share one cache but own separate ledgers
    let cache = Arc::new(InMemoryDiscoveryCache::new());
    let ledger0 = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
    let ledger1 = Arc::new(RocksLedger::open(dir.path(), 1, "pd").unwrap());

    let task0 = PartitionDiscoveryTask::new(
        run_config(0, 2, false, dir.path()),
        source.clone(),
        cache.clone(),
        ledger0,
    )
    .await
    .unwrap();
    let task1 = PartitionDiscoveryTask::new(
        run_config(1, 2, false, dir.path()),
        source.clone(),
        cache.clone(),
        ledger1,
    )
    .await
    .unwrap();

    let stats0 = task0.run(|_| {}).await.unwrap();
    let stats1 = task1.run(|_| {}).await.unwrap();

    // Round-robin assignment: [0,99] to tile 0, [100,199] to tile 1
    assert_eq!(stats0.ranges_assigned, 1);
    assert_eq!(stats0.new_partitions, 2);
    assert_eq!(stats1.ranges_assigned, 1);
    assert_eq!(stats1.new_partitions, 1);

    assert_eq!(cache.size(0).await.unwrap(), 2);
    assert_eq!(cache.size(1).await.unwrap(), 1);

    // Each tile numbers its chunks independently
    let chunks0 = read_counter(cache.as_ref(), &total_chunks_key(0))
        .await
        .unwrap();
    let chunks1 = read_counter(cache.as_ref(), &total_chunks_key(1))
        .await
        .unwrap();
    assert_eq!(chunks0, 1);
    assert_eq!(chunks1, 1);

    let blob = cache.get(&chunk_key(1, 0)).await.unwrap().unwrap();
    assert_eq!(decode_chunk_blob(&blob), vec!["b0"]);
}

#[tokio::test]
async fn test_discovered_partitions_survive_ledger_reopen() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(InMemoryDiscoveryCache::new());

    {
        let source = Arc::new(InMemorySource::new(
            id_columns(),
            vec![TokenRange::new(0, 10)],
        ));
        source.insert(1, id_row("alpha")).await;
        source.insert(2, id_row("beta")).await;

        let ledger = Arc::new(RocksLedger::open(dir.path(), 0, "pd").unwrap());
        let task = PartitionDiscoveryTask::new(
            run_config(0, 1, false, dir.path()),
            source,
            cache.clone(),
            ledger,
        )
        .await
        .unwrap();
        task.run(|_| {}).await.unwrap();
    }

    // All handles dropped; reopen the same ledger directory
    let ledger = RocksLedger::open(dir.path(), 0, "pd").unwrap();
    let partitions = ledger.read_partitions_metadata().unwrap();
    let keys: Vec<&str> = partitions
        .iter()
        .map(|p| p.partition_key.as_str())
        .collect();
    assert_eq!(keys, vec!["alpha", "beta"]);
}
