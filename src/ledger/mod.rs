//! Durable ledger storage
//!
//! Each tile keeps a local, crash-durable record of the partitions and rows
//! it has synchronized. The ledger is an embedded ordered KV store holding
//! three independent key spaces:
//!
//! - partition-identity records: `"{tile}|{partition_key}"` -> written-at
//!   timestamp (epoch micros)
//! - per-partition row sets: `partition_key` -> encoded clustering-key set
//! - per-row timing records: `"{partition_key}|{clustering_key}"` ->
//!   last_run/write_time pair
//!
//! Multi-key mutations go through a single atomic write batch, so the row
//! set and its timing records never diverge. Full scans run against a
//! point-in-time filesystem copy of the store so live writers are never
//! blocked.
//!
//! # Module Structure
//!
//! - `rocks`: RocksDB-backed implementation, snapshot scans, page cursors

pub mod rocks;

pub use rocks::{
    ledger_path, PartitionPages, PrimaryKeyPages, RocksLedger, DEFAULT_PAGE_SIZE,
};

use crate::error::LedgerResult;
use crate::model::{PartitionIdent, PartitionKey, PartitionMetadata, PrimaryKey, RowEntry, RowMetadata};

/// Storage seam for the reconciliation ledger.
///
/// All operations are idempotent at the key level: re-running a write or
/// delete after a partial failure converges to the same state. Absence is
/// a normal result, never an error.
pub trait LedgerStore: Send + Sync {
    /// Record a partition as known-synchronized, stamped with the current time
    fn write_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<()>;

    /// Read back a partition's written-at timestamp (epoch micros)
    fn read_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<Option<i64>>;

    /// Remove a partition-identity record; missing records are a no-op
    fn delete_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<()>;

    /// Record a synchronized row: adds the clustering key to the partition's
    /// set and writes its timing record in one atomic batch
    fn write_row_metadata(&self, row: &RowMetadata) -> LedgerResult<()>;

    /// All recorded rows of a partition with their timing records.
    ///
    /// An unknown partition yields an empty list. A clustering key without
    /// a timing record is ledger corruption and fails the whole read.
    fn read_row_metadata(&self, partition_key: &PartitionKey) -> LedgerResult<Vec<RowEntry>>;

    /// Forget a row: removes the clustering key, deletes its timing record,
    /// and drops the partition's set entry when it empties
    fn delete_row_metadata(&self, row: &RowMetadata) -> LedgerResult<()>;

    /// All partition-identity records, scanned from a point-in-time snapshot
    fn read_partitions_metadata(&self) -> LedgerResult<Vec<PartitionIdent>>;

    /// Lazy paginated scan of row-level primary keys over the live store
    fn paginated_primary_keys<'a>(
        &'a self,
    ) -> Box<dyn Iterator<Item = LedgerResult<Vec<PrimaryKey>>> + 'a>;

    /// Lazy paginated scan of partition-identity records over a snapshot
    fn paginated_partitions_metadata<'a>(
        &'a self,
    ) -> LedgerResult<Box<dyn Iterator<Item = LedgerResult<Vec<PartitionIdent>>> + 'a>>;
}
