//! Configuration types for tile-reconciler
//!
//! Defines CLI arguments and the validated runtime configuration.

use crate::error::ConfigError;
use crate::ledger::ledger_path;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Default token batch size for range scans
pub const DEFAULT_BATCH_SIZE: i64 = 100_000;

/// Default buffered keys per chunk before a flush
pub const DEFAULT_FLUSH_CAPACITY: usize = 1_000;

/// Partition reconciliation engine for tiled token-range replication
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tile-reconciler",
    version,
    about = "Partition discovery and reconciliation for tiled token-range replication",
    long_about = "Keeps a durable per-tile ledger of synchronized partitions in step\n\
                  with a source database.\n\n\
                  Each run scans the tile's share of the token space, folds newly\n\
                  seen partition keys into a shared discovery cache and the local\n\
                  ledger, and optionally reconciles deletions by re-validating\n\
                  previously cached keys against the source.",
    after_help = "EXAMPLES:\n    \
        # Run one discovery cycle for tile 0 of 4\n    \
        tile-reconciler run --tile 0 --tiles 4 --keyspace ks --table orders\n\n    \
        # Reconcile deletions too\n    \
        tile-reconciler run --tile 0 --tiles 4 --keyspace ks --table orders --replicate-deletes\n\n    \
        # Inspect a tile's ledger from a snapshot\n    \
        tile-reconciler audit --tile 0 --format json\n\n    \
        # Check per-tile cache counters\n    \
        tile-reconciler status --tile 0"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Redis URL for the shared discovery cache
    #[arg(
        long,
        env = "REDIS_URL",
        default_value = "redis://127.0.0.1:6379",
        global = true
    )]
    pub redis: String,

    /// Directory holding the per-tile ledgers
    #[arg(
        long,
        env = "TR_STORAGE_ROOT",
        default_value = "/var/lib/tile-reconciler",
        global = true,
        value_name = "DIR"
    )]
    pub storage_root: PathBuf,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one partition discovery cycle for a tile
    Run {
        /// Tile handled by this process
        #[arg(long, env = "TR_TILE", value_name = "NUM")]
        tile: u32,

        /// Total number of tiles
        #[arg(long, env = "TR_TILES", default_value = "1", value_name = "NUM")]
        tiles: u32,

        /// Keyspace of the replicated table
        #[arg(long, env = "TR_KEYSPACE", value_name = "NAME")]
        keyspace: String,

        /// Replicated table name
        #[arg(long, env = "TR_TABLE", value_name = "NAME")]
        table: String,

        /// Source fixture file (token ranges, key columns, rows)
        #[arg(long, value_name = "FILE")]
        source: PathBuf,

        /// Token batch size for range scans
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_name = "NUM")]
        batch_size: i64,

        /// Buffered keys per chunk before a flush
        #[arg(long, default_value_t = DEFAULT_FLUSH_CAPACITY, value_name = "NUM")]
        flush_capacity: usize,

        /// Process name used in ledger directory names
        #[arg(long, default_value = "pd", value_name = "NAME")]
        process_name: String,

        /// Also reconcile deleted partitions
        #[arg(long)]
        replicate_deletes: bool,
    },

    /// List the ledger's partitions from a point-in-time snapshot
    Audit {
        /// Tile whose ledger to read
        #[arg(long, env = "TR_TILE", value_name = "NUM")]
        tile: u32,

        /// Process name used in ledger directory names
        #[arg(long, default_value = "pd", value_name = "NAME")]
        process_name: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_name = "FORMAT")]
        format: String,
    },

    /// Show per-tile cache counters
    Status {
        /// Tile to inspect
        #[arg(long, env = "TR_TILE", value_name = "NUM")]
        tile: u32,

        /// Watch mode - continuously update status
        #[arg(short, long)]
        watch: bool,

        /// Update interval for watch mode (seconds)
        #[arg(long, default_value = "2", value_name = "SECS")]
        interval: u64,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_name = "FORMAT")]
        format: String,
    },
}

/// Validated configuration for a discovery run
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Tile handled by this process
    pub tile: u32,
    /// Total number of tiles
    pub tiles: u32,
    /// Token batch size for range scans
    pub read_batch_size: i64,
    /// Buffered keys per chunk before a flush
    pub flush_capacity: usize,
    /// Keyspace of the replicated table
    pub keyspace: String,
    /// Replicated table name
    pub table: String,
    /// Source fixture file backing the run
    pub source_path: PathBuf,
    /// Directory holding the per-tile ledgers
    pub storage_root: PathBuf,
    /// Process name used in ledger directory names
    pub process_name: String,
    /// Reconcile deleted partitions after the scan
    pub replicate_deletes: bool,
    /// Redis URL for the shared discovery cache
    pub redis_url: String,
    /// Show progress
    pub show_progress: bool,
    /// Verbose logging
    pub verbose: bool,
}

impl ReconcilerConfig {
    /// Create from CLI args
    pub fn from_run_args(
        tile: u32,
        tiles: u32,
        keyspace: &str,
        table: &str,
        source: &Path,
        batch_size: i64,
        flush_capacity: usize,
        process_name: &str,
        replicate_deletes: bool,
        redis_url: &str,
        storage_root: &Path,
        quiet: bool,
        verbose: bool,
    ) -> Result<Self, ConfigError> {
        if tiles == 0 {
            return Err(ConfigError::InvalidTileCount(tiles));
        }
        if tile >= tiles {
            return Err(ConfigError::InvalidTile { tile, tiles });
        }
        if batch_size <= 0 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        if flush_capacity == 0 {
            return Err(ConfigError::InvalidFlushCapacity(flush_capacity));
        }
        if keyspace.trim().is_empty() {
            return Err(ConfigError::MissingRequired("keyspace".to_string()));
        }
        if table.trim().is_empty() {
            return Err(ConfigError::MissingRequired("table".to_string()));
        }
        if process_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("process name".to_string()));
        }
        if !redis_url.contains("://") {
            return Err(ConfigError::InvalidRedisUrl(redis_url.to_string()));
        }
        if storage_root.exists() && !storage_root.is_dir() {
            return Err(ConfigError::InvalidStorageRoot {
                path: storage_root.to_path_buf(),
                reason: "exists but is not a directory".to_string(),
            });
        }

        Ok(Self {
            tile,
            tiles,
            read_batch_size: batch_size,
            flush_capacity,
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            source_path: source.to_path_buf(),
            storage_root: storage_root.to_path_buf(),
            process_name: process_name.to_string(),
            replicate_deletes,
            redis_url: redis_url.to_string(),
            show_progress: !quiet,
            verbose,
        })
    }

    /// Ledger directory for this tile and process name
    pub fn ledger_dir(&self) -> PathBuf {
        ledger_path(&self.storage_root, self.tile, &self.process_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_args() -> ReconcilerConfig {
        ReconcilerConfig::from_run_args(
            1,
            4,
            "ks",
            "orders",
            Path::new("rows.json"),
            100_000,
            1_000,
            "pd",
            true,
            "redis://127.0.0.1:6379",
            Path::new("/tmp/ledgers"),
            false,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_from_run_args_valid() {
        let config = valid_args();
        assert_eq!(config.tile, 1);
        assert_eq!(config.tiles, 4);
        assert_eq!(config.read_batch_size, 100_000);
        assert!(config.replicate_deletes);
        assert!(config.show_progress);
    }

    #[test]
    fn test_tile_must_be_below_tile_count() {
        let result = ReconcilerConfig::from_run_args(
            4,
            4,
            "ks",
            "orders",
            Path::new("rows.json"),
            100,
            10,
            "pd",
            false,
            "redis://localhost",
            Path::new("/tmp"),
            false,
            false,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTile { tile: 4, tiles: 4 })
        ));
    }

    #[test]
    fn test_zero_tiles_rejected() {
        let result = ReconcilerConfig::from_run_args(
            0,
            0,
            "ks",
            "orders",
            Path::new("rows.json"),
            100,
            10,
            "pd",
            false,
            "redis://localhost",
            Path::new("/tmp"),
            false,
            false,
        );
        assert!(matches!(result, Err(ConfigError::InvalidTileCount(0))));
    }

    #[test]
    fn test_nonpositive_batch_size_rejected() {
        let result = ReconcilerConfig::from_run_args(
            0,
            1,
            "ks",
            "orders",
            Path::new("rows.json"),
            0,
            10,
            "pd",
            false,
            "redis://localhost",
            Path::new("/tmp"),
            false,
            false,
        );
        assert!(matches!(result, Err(ConfigError::InvalidBatchSize(0))));
    }

    #[test]
    fn test_bare_redis_host_rejected() {
        let result = ReconcilerConfig::from_run_args(
            0,
            1,
            "ks",
            "orders",
            Path::new("rows.json"),
            100,
            10,
            "pd",
            false,
            "localhost:6379",
            Path::new("/tmp"),
            false,
            false,
        );
        assert!(matches!(result, Err(ConfigError::InvalidRedisUrl(_))));
    }

    #[test]
    fn test_ledger_dir_naming() {
        let config = valid_args();
        assert_eq!(
            config.ledger_dir(),
            PathBuf::from("/tmp/ledgers/ledger_v4_1_pd")
        );
    }
}
