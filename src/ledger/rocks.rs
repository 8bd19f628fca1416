//! RocksDB-backed reconciliation ledger
//!
//! One store directory per tile per process, named deterministically as
//! `ledger_v4_{tile}_{process}` under the storage root. Column families
//! keep the partition-identity, row-set, and row-timing key spaces
//! separate. Full scans never touch the live store: the directory is
//! copied, opened read-only, iterated, and the copy deleted again on both
//! success and error paths.

use crate::codec;
use crate::error::{CodecError, LedgerError, LedgerResult};
use crate::ledger::LedgerStore;
use crate::model::{
    decode_ident_key, decode_set_key, encode_ident_key, encode_row_key, encode_set_key,
    now_micros, PartitionIdent, PartitionKey, PartitionMetadata, PrimaryKey, RowEntry,
    RowMetadata, RowTimestamps,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Column family names
pub const CF_PARTITIONS: &str = "partitions";
pub const CF_ROW_SETS: &str = "row_sets";
pub const CF_ROW_TIMES: &str = "row_times";

/// Rows per page for paginated scans
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Deterministic ledger directory for a tile and process name
pub fn ledger_path(storage_root: &Path, tile: u32, process: &str) -> PathBuf {
    storage_root.join(format!("ledger_v4_{}_{}", tile, process))
}

/// Encode a written-at timestamp (big-endian for ordered values)
fn encode_timestamp(micros: i64) -> [u8; 8] {
    micros.to_be_bytes()
}

/// Decode a written-at timestamp
fn decode_timestamp(bytes: &[u8]) -> Result<i64, CodecError> {
    if bytes.len() != 8 {
        return Err(CodecError::Decode(format!(
            "timestamp value has {} bytes, expected 8",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buf))
}

/// Column family options for the ledger key spaces (point-lookup heavy)
fn ledger_cf_options() -> Options {
    let mut opts = Options::default();

    // Small write buffers; this is a bookkeeping store, not a bulk sink
    opts.set_write_buffer_size(16 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);

    // Bloom filter for point lookups (10 bits/key)
    let mut block_opts = rocksdb::BlockBasedOptions::default();
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);
    opts.set_block_based_table_factory(&block_opts);

    // Compression: LZ4 for speed
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

    opts
}

/// Database options. The WAL stays enabled: the ledger is the durable
/// record of what has been synchronized and must survive a crash.
fn ledger_db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts.set_max_background_jobs(2);
    opts
}

/// Open or create a ledger database with all column families
fn open_ledger_db<P: AsRef<Path>>(path: P) -> Result<DB, rocksdb::Error> {
    let cf_descriptors = vec![
        ColumnFamilyDescriptor::new(CF_PARTITIONS, ledger_cf_options()),
        ColumnFamilyDescriptor::new(CF_ROW_SETS, ledger_cf_options()),
        ColumnFamilyDescriptor::new(CF_ROW_TIMES, ledger_cf_options()),
    ];
    DB::open_cf_descriptors(&ledger_db_options(), path, cf_descriptors)
}

/// Open an existing ledger database for reading
fn open_ledger_db_readonly<P: AsRef<Path>>(path: P) -> Result<DB, rocksdb::Error> {
    let cf_names = vec![CF_PARTITIONS, CF_ROW_SETS, CF_ROW_TIMES];
    DB::open_cf_for_read_only(&ledger_db_options(), path, cf_names, false)
}

/// Recursive directory copy for snapshot preparation
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// A point-in-time copy of the ledger, opened read-only.
///
/// Deleting the copy is tied to drop so the cleanup happens on error and
/// early-return paths as well as normal completion.
struct SnapshotGuard {
    db: Option<DB>,
    path: PathBuf,
}

impl SnapshotGuard {
    fn db(&self) -> &DB {
        self.db.as_ref().expect("snapshot store open")
    }

    fn cf_partitions(&self) -> &ColumnFamily {
        self.db()
            .cf_handle(CF_PARTITIONS)
            .expect("partitions CF missing in snapshot")
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        // Close the store before removing its files
        self.db.take();
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(
                "Failed to delete ledger snapshot {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// RocksDB implementation of the reconciliation ledger
pub struct RocksLedger {
    db: DB,
    path: PathBuf,
    page_size: usize,
}

impl RocksLedger {
    /// Open or create the ledger for a tile under the storage root
    pub fn open(storage_root: &Path, tile: u32, process: &str) -> LedgerResult<Self> {
        Self::open_at(ledger_path(storage_root, tile, process))
    }

    /// Open or create the ledger at an explicit directory
    pub fn open_at<P: Into<PathBuf>>(path: P) -> LedgerResult<Self> {
        let path = path.into();
        let db = open_ledger_db(&path)?;
        Ok(Self {
            db,
            path,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the page size for paginated scans
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Ledger directory on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn cf_partitions(&self) -> &ColumnFamily {
        self.db.cf_handle(CF_PARTITIONS).expect("partitions CF missing")
    }

    fn cf_row_sets(&self) -> &ColumnFamily {
        self.db.cf_handle(CF_ROW_SETS).expect("row_sets CF missing")
    }

    fn cf_row_times(&self) -> &ColumnFamily {
        self.db.cf_handle(CF_ROW_TIMES).expect("row_times CF missing")
    }

    /// Copy the live store aside and open the copy read-only
    fn prepare_snapshot(&self) -> LedgerResult<SnapshotGuard> {
        let started = Instant::now();

        // Memtable contents must be visible in the file copy
        self.db.flush()?;

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ledger".to_string());
        let snap_path = self
            .path
            .with_file_name(format!("{}-snapshot-{}", name, Uuid::new_v4().simple()));

        copy_dir_recursive(&self.path, &snap_path).map_err(|e| LedgerError::SnapshotFailed {
            path: snap_path.clone(),
            reason: e.to_string(),
        })?;
        // The live store's lock file has no meaning in the copy
        let _ = std::fs::remove_file(snap_path.join("LOCK"));

        let db = match open_ledger_db_readonly(&snap_path) {
            Ok(db) => db,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&snap_path);
                return Err(LedgerError::Rocks(e));
            }
        };

        debug!(
            "Prepared ledger snapshot {} in {:?}",
            snap_path.display(),
            started.elapsed()
        );
        Ok(SnapshotGuard {
            db: Some(db),
            path: snap_path,
        })
    }
}

impl LedgerStore for RocksLedger {
    fn write_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<()> {
        let key = encode_ident_key(pmd.tile, &pmd.partition_key);
        let value = encode_timestamp(now_micros());
        self.db.put_cf(self.cf_partitions(), key, value)?;
        Ok(())
    }

    fn read_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<Option<i64>> {
        let key = encode_ident_key(pmd.tile, &pmd.partition_key);
        match self.db.get_cf(self.cf_partitions(), key)? {
            Some(bytes) => Ok(Some(decode_timestamp(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete_partition_metadata(&self, pmd: &PartitionMetadata) -> LedgerResult<()> {
        let key = encode_ident_key(pmd.tile, &pmd.partition_key);
        self.db.delete_cf(self.cf_partitions(), key)?;
        Ok(())
    }

    fn write_row_metadata(&self, row: &RowMetadata) -> LedgerResult<()> {
        let set_key = encode_set_key(&row.partition_key);

        // Read-before-write: fold the clustering key into the current set
        let mut keys = match self.db.get_cf(self.cf_row_sets(), &set_key)? {
            Some(bytes) => codec::decode_key_set(&bytes)?,
            None => BTreeSet::new(),
        };
        keys.insert(row.clustering_key.clone());

        let set_value = codec::encode_key_set(&keys)?;
        let time_value = row
            .timestamps()
            .to_bytes()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        let row_key = encode_row_key(&row.partition_key, &row.clustering_key);

        // Set update and timing record land together or not at all
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_row_sets(), &set_key, &set_value);
        batch.put_cf(self.cf_row_times(), &row_key, &time_value);
        self.db.write(batch)?;
        Ok(())
    }

    fn read_row_metadata(&self, partition_key: &PartitionKey) -> LedgerResult<Vec<RowEntry>> {
        let set_key = encode_set_key(partition_key);
        let bytes = match self.db.get_cf(self.cf_row_sets(), &set_key)? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };

        let keys = codec::decode_key_set(&bytes)?;
        let mut entries = Vec::with_capacity(keys.len());
        for clustering_key in keys {
            let row_key = encode_row_key(partition_key, &clustering_key);
            let value = self.db.get_cf(self.cf_row_times(), &row_key)?.ok_or_else(|| {
                LedgerError::MissingTimingRecord {
                    partition_key: partition_key.to_string(),
                    row_key: clustering_key.clone(),
                }
            })?;
            let ts = RowTimestamps::from_bytes(&value)
                .map_err(|e| CodecError::Decode(e.to_string()))?;
            entries.push(RowEntry::new(clustering_key, ts.last_run, ts.write_time));
        }
        Ok(entries)
    }

    fn delete_row_metadata(&self, row: &RowMetadata) -> LedgerResult<()> {
        let set_key = encode_set_key(&row.partition_key);
        let bytes = match self.db.get_cf(self.cf_row_sets(), &set_key)? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };

        let mut keys = codec::decode_key_set(&bytes)?;
        let mut batch = WriteBatch::default();
        if keys.is_empty() {
            // An empty set never persists
            batch.delete_cf(self.cf_row_sets(), &set_key);
        } else {
            keys.remove(&row.clustering_key);
            let row_key = encode_row_key(&row.partition_key, &row.clustering_key);
            batch.delete_cf(self.cf_row_times(), &row_key);
            if keys.is_empty() {
                batch.delete_cf(self.cf_row_sets(), &set_key);
            } else {
                batch.put_cf(self.cf_row_sets(), &set_key, codec::encode_key_set(&keys)?);
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn read_partitions_metadata(&self) -> LedgerResult<Vec<PartitionIdent>> {
        let started = Instant::now();
        let snapshot = self.prepare_snapshot()?;

        let mut idents = Vec::new();
        for item in snapshot
            .db()
            .iterator_cf(snapshot.cf_partitions(), IteratorMode::Start)
        {
            let (key, _) = item?;
            if let Some(ident) = decode_ident_key(&key) {
                idents.push(ident);
            }
        }

        debug!(
            "Scanned {} partition records from snapshot in {:?}",
            idents.len(),
            started.elapsed()
        );
        Ok(idents)
    }

    fn paginated_primary_keys<'a>(
        &'a self,
    ) -> Box<dyn Iterator<Item = LedgerResult<Vec<PrimaryKey>>> + 'a> {
        Box::new(PrimaryKeyPages {
            ledger: self,
            resume: None,
            done: false,
            page_size: self.page_size,
        })
    }

    fn paginated_partitions_metadata<'a>(
        &'a self,
    ) -> LedgerResult<Box<dyn Iterator<Item = LedgerResult<Vec<PartitionIdent>>> + 'a>> {
        let snapshot = self.prepare_snapshot()?;
        Ok(Box::new(PartitionPages {
            snapshot,
            resume: None,
            done: false,
            page_size: self.page_size,
        }))
    }
}

/// Resumable pages of row-level primary keys over the live store.
///
/// Each page expands whole partitions, so a page can overshoot the page
/// size by the last partition's row count. A page shorter than the page
/// size is the final one.
pub struct PrimaryKeyPages<'a> {
    ledger: &'a RocksLedger,
    resume: Option<Vec<u8>>,
    done: bool,
    page_size: usize,
}

impl PrimaryKeyPages<'_> {
    fn next_page(&mut self) -> LedgerResult<Vec<PrimaryKey>> {
        let resume = self.resume.clone();
        let mode = match resume.as_deref() {
            Some(key) => IteratorMode::From(key, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut page = Vec::new();
        let mut last_key: Option<Vec<u8>> = None;
        for item in self.ledger.db.iterator_cf(self.ledger.cf_row_sets(), mode) {
            let (key, value) = item?;
            // The cursor points at the last partition already returned
            if resume.as_deref() == Some(&key[..]) {
                continue;
            }

            let partition_key =
                decode_set_key(&key).map_err(|e| CodecError::Decode(e.to_string()))?;
            let clustering_keys = codec::decode_key_set(&value)?;
            for clustering_key in clustering_keys {
                page.push(PrimaryKey::new(partition_key.clone(), clustering_key));
            }

            last_key = Some(key.into_vec());
            if page.len() >= self.page_size {
                break;
            }
        }

        if last_key.is_some() {
            self.resume = last_key;
        }
        Ok(page)
    }
}

impl Iterator for PrimaryKeyPages<'_> {
    type Item = LedgerResult<Vec<PrimaryKey>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_page() {
            Ok(page) => {
                if page.is_empty() {
                    self.done = true;
                    return None;
                }
                if page.len() < self.page_size {
                    self.done = true;
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Resumable pages of partition-identity records over a snapshot copy.
///
/// The snapshot is deleted when the iterator is dropped, whether or not
/// it was drained.
pub struct PartitionPages {
    snapshot: SnapshotGuard,
    resume: Option<Vec<u8>>,
    done: bool,
    page_size: usize,
}

impl PartitionPages {
    fn next_page(&mut self) -> LedgerResult<Vec<PartitionIdent>> {
        let resume = self.resume.clone();
        let mode = match resume.as_deref() {
            Some(key) => IteratorMode::From(key, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut page = Vec::new();
        let mut last_key: Option<Vec<u8>> = None;
        for item in self
            .snapshot
            .db()
            .iterator_cf(self.snapshot.cf_partitions(), mode)
        {
            let (key, _) = item?;
            if resume.as_deref() == Some(&key[..]) {
                continue;
            }
            if let Some(ident) = decode_ident_key(&key) {
                page.push(ident);
            }
            last_key = Some(key.into_vec());
            if page.len() >= self.page_size {
                break;
            }
        }

        if last_key.is_some() {
            self.resume = last_key;
        }
        Ok(page)
    }
}

impl Iterator for PartitionPages {
    type Item = LedgerResult<Vec<PartitionIdent>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_page() {
            Ok(page) => {
                if page.is_empty() {
                    self.done = true;
                    return None;
                }
                if page.len() < self.page_size {
                    self.done = true;
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
